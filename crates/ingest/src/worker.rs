//! 큐 워커 -- 메시지를 정규화/영속화하고 성공한 뒤에만 오프셋을 커밋합니다.
//!
//! # 메시지별 정책
//! - 각 시도는 `message_timeout`으로 감싸며, 타임아웃도 실패한 시도로 셉니다.
//! - 입력 결함(포맷/파싱/스키마)은 `max_retries`번 시도 후 데드레터로 보내고 커밋합니다.
//! - 일시 장애(영속화/타임아웃)는 시도를 소진하면 커밋하지 않고 해제(nack)합니다.
//!   재전달이 `max_redeliveries`를 넘은 뒤에야 데드레터로 보냅니다.
//! - 데드레터 발행에 실패하면 커밋하지 않고 해제합니다.

use std::sync::Arc;
use std::time::Duration;

use graphwarden_core::config::QueueConfig;
use graphwarden_core::error::ErrorKind;
use graphwarden_core::event::EventRef;
use graphwarden_core::metrics as m;
use graphwarden_graph::{GraphStore, PersistenceAdapter};
use graphwarden_normalize::Normalizer;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broker::{DeadLetterSink, QueueConsumer};
use crate::error::IngestError;
use crate::message::{DeadLetterRecord, Delivery, QueueMessage};

/// 재시도 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 메시지당 로컬 시도 횟수 (최소 1)
    pub max_retries: u32,
    /// 일시 장애 메시지의 최대 재전달 횟수
    pub max_redeliveries: u32,
    /// 선형 백오프 기준값 (시도 횟수를 곱함)
    pub backoff: Duration,
    /// 시도당 처리 타임아웃
    pub message_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            max_redeliveries: config.max_redeliveries,
            backoff: config.retry_backoff(),
            message_timeout: config.message_timeout(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

/// 워커 처리 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    /// 영속화 후 커밋된 메시지
    pub processed: u64,
    /// 데드레터로 보낸 메시지
    pub dead_lettered: u64,
    /// 재전달을 위해 해제한 횟수
    pub redelivered: u64,
    /// 오프셋 커밋 실패 횟수
    pub commit_failures: u64,
}

impl WorkerStats {
    /// 처리된 전달 수 (커밋 실패는 별도)
    pub fn handled(&self) -> u64 {
        self.processed + self.dead_lettered + self.redelivered
    }

    pub fn merge(&mut self, other: &WorkerStats) {
        self.processed += other.processed;
        self.dead_lettered += other.dead_lettered;
        self.redelivered += other.redelivered;
        self.commit_failures += other.commit_failures;
    }
}

/// 단일 메시지 처리 결과
enum Disposition {
    Committed,
    DeadLettered,
    Released,
}

/// 큐 워커
pub struct QueueWorker<C, S, D>
where
    C: QueueConsumer,
    S: GraphStore,
    D: DeadLetterSink,
{
    name: String,
    consumer: C,
    normalizer: Arc<Normalizer>,
    adapter: PersistenceAdapter<S>,
    dead_letters: Arc<D>,
    policy: RetryPolicy,
    poll_interval: Duration,
    max_messages: Option<u64>,
    stats: WorkerStats,
}

impl<C, S, D> QueueWorker<C, S, D>
where
    C: QueueConsumer,
    S: GraphStore,
    D: DeadLetterSink,
{
    pub fn new(
        name: impl Into<String>,
        consumer: C,
        normalizer: Arc<Normalizer>,
        adapter: PersistenceAdapter<S>,
        dead_letters: Arc<D>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            consumer,
            normalizer,
            adapter,
            dead_letters,
            policy,
            poll_interval: Duration::from_millis(500),
            max_messages: None,
            stats: WorkerStats::default(),
        }
    }

    /// 빈 큐에서 한 번에 기다리는 시간
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// 처리할 최대 전달 수. 도달하면 `run`이 반환합니다.
    pub fn with_max_messages(mut self, max: u64) -> Self {
        self.max_messages = Some(max);
        self
    }

    /// 취소되거나 메시지 예산을 소진할 때까지 pull 루프를 실행합니다.
    pub async fn run(mut self, shutdown: CancellationToken) -> WorkerStats {
        info!(worker = %self.name, "queue worker started");

        loop {
            if self
                .max_messages
                .is_some_and(|max| self.stats.handled() >= max)
            {
                debug!(worker = %self.name, "message budget reached");
                break;
            }

            let polled = tokio::select! {
                _ = shutdown.cancelled() => break,
                polled = self.consumer.poll(self.poll_interval) => polled,
            };

            match polled {
                Ok(Some(delivery)) => self.handle(delivery).await,
                Ok(None) => continue,
                Err(e) => {
                    warn!(worker = %self.name, error = %e, "broker poll failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.policy.backoff) => {}
                    }
                }
            }
        }

        info!(
            worker = %self.name,
            processed = self.stats.processed,
            dead_lettered = self.stats.dead_lettered,
            redelivered = self.stats.redelivered,
            commit_failures = self.stats.commit_failures,
            "queue worker stopped"
        );
        self.stats
    }

    async fn handle(&mut self, delivery: Delivery) {
        let disposition = match delivery.message() {
            Ok(message) => self.process_with_retries(&delivery, &message).await,
            Err(e) => {
                warn!(
                    worker = %self.name,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    error = %e,
                    "undecodable queue message"
                );
                let record = DeadLetterRecord {
                    raw_payload: String::from_utf8_lossy(&delivery.body).into_owned(),
                    source_format_hint: None,
                    error_kind: ErrorKind::MalformedInput,
                    error_detail: e.to_string(),
                    attempts: 1,
                };
                self.dead_letter(&delivery, record).await
            }
        };

        let result = match disposition {
            Disposition::Committed => {
                self.stats.processed += 1;
                "committed"
            }
            Disposition::DeadLettered => {
                self.stats.dead_lettered += 1;
                "dead_lettered"
            }
            Disposition::Released => {
                self.stats.redelivered += 1;
                "redelivered"
            }
        };
        metrics::counter!(m::QUEUE_MESSAGES_TOTAL, m::LABEL_RESULT => result).increment(1);
    }

    async fn process_with_retries(
        &mut self,
        delivery: &Delivery,
        message: &QueueMessage,
    ) -> Disposition {
        let mut attempt = 0;
        let last_error = loop {
            attempt += 1;
            match self.attempt(message).await {
                Ok(event_ref) => {
                    debug!(
                        worker = %self.name,
                        partition = delivery.partition,
                        offset = delivery.offset,
                        event = %event_ref,
                        "message persisted"
                    );
                    return self.commit(delivery).await;
                }
                Err(e) if attempt >= self.policy.max_retries => break e,
                Err(e) => {
                    debug!(worker = %self.name, attempt, error = %e, "attempt failed, retrying");
                    tokio::time::sleep(self.policy.backoff * attempt).await;
                }
            }
        };

        let kind = last_error.kind();
        if kind.is_transient() && delivery.redelivery_count < self.policy.max_redeliveries {
            warn!(
                worker = %self.name,
                partition = delivery.partition,
                offset = delivery.offset,
                redelivery = delivery.redelivery_count,
                error = %last_error,
                "transient failure, releasing for redelivery"
            );
            return self.release(delivery).await;
        }

        let record = DeadLetterRecord {
            raw_payload: message.raw_payload.clone(),
            source_format_hint: message.source_format_hint.clone(),
            error_kind: kind,
            error_detail: last_error.to_string(),
            attempts: attempt,
        };
        self.dead_letter(delivery, record).await
    }

    async fn attempt(&self, message: &QueueMessage) -> Result<EventRef, IngestError> {
        let work = async {
            let mapped = self.normalizer.normalize(
                message.raw_payload.as_bytes(),
                message.source_format_hint.as_deref(),
            )?;
            Ok::<_, IngestError>(self.adapter.persist(&mapped.event).await?)
        };
        tokio::time::timeout(self.policy.message_timeout, work)
            .await
            .map_err(|_| IngestError::Timeout {
                timeout_ms: u64::try_from(self.policy.message_timeout.as_millis())
                    .unwrap_or(u64::MAX),
            })?
    }

    async fn dead_letter(&mut self, delivery: &Delivery, record: DeadLetterRecord) -> Disposition {
        let kind = record.error_kind;
        let attempts = record.attempts;
        match self.dead_letters.publish(record).await {
            Ok(()) => {
                metrics::counter!(m::DEAD_LETTER_TOTAL).increment(1);
                warn!(
                    worker = %self.name,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    error_kind = %kind,
                    attempts,
                    "message dead-lettered"
                );
                match self.commit(delivery).await {
                    Disposition::Committed => Disposition::DeadLettered,
                    other => other,
                }
            }
            Err(e) => {
                error!(worker = %self.name, error = %e, "dead-letter publish failed, releasing message");
                self.release(delivery).await
            }
        }
    }

    async fn commit(&mut self, delivery: &Delivery) -> Disposition {
        match self.consumer.commit(delivery).await {
            Ok(()) => Disposition::Committed,
            Err(e) => {
                self.stats.commit_failures += 1;
                error!(
                    worker = %self.name,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    error = %e,
                    "offset commit failed"
                );
                self.release(delivery).await
            }
        }
    }

    async fn release(&mut self, delivery: &Delivery) -> Disposition {
        if let Err(e) = self.consumer.nack(delivery).await {
            error!(worker = %self.name, error = %e, "failed to release message");
        }
        Disposition::Released
    }
}
