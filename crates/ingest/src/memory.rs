//! 인메모리 브로커와 데드레터 싱크
//!
//! [`MemoryBroker`]는 파티션 로그와 컨슈머 그룹별 커밋 오프셋을 가진
//! 단일 프로세스 브로커입니다. 같은 그룹의 컨슈머들은 서로 겹치지 않는
//! 파티션 집합을 할당받고, 커밋되지 않은 메시지는 새 컨슈머가 다시 받습니다.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use graphwarden_core::config::QueueConfig;
use graphwarden_core::error::BrokerError;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::broker::{DeadLetterSink, QueueConsumer, QueueProducer};
use crate::message::{BrokerHealth, DeadLetterRecord, Delivery, DeliveryReceipt, QueueMessage};

#[derive(Debug, Default)]
struct BrokerState {
    /// 파티션별 메시지 로그
    partitions: Vec<Vec<Bytes>>,
    /// 그룹 → 파티션별 다음 커밋 오프셋
    groups: HashMap<String, Vec<u64>>,
    next_partition: usize,
}

struct Shared {
    state: Mutex<BrokerState>,
    notify: Notify,
    available: AtomicBool,
    fail_commits: AtomicUsize,
}

/// 인메모리 파티션 브로커
#[derive(Clone)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    /// 파티션 수를 지정하여 브로커를 생성합니다. 최소 1개입니다.
    pub fn new(partitions: u32) -> Self {
        let count = usize::try_from(partitions.max(1)).unwrap_or(1);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BrokerState {
                    partitions: vec![Vec::new(); count],
                    ..Default::default()
                }),
                notify: Notify::new(),
                available: AtomicBool::new(true),
                fail_commits: AtomicUsize::new(0),
            }),
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.partitions)
    }

    pub async fn partition_count(&self) -> u32 {
        let state = self.shared.state.lock().await;
        u32::try_from(state.partitions.len()).unwrap_or(u32::MAX)
    }

    /// 연결 가능 여부를 바꿉니다. 불가 상태에서는 모든 브로커 호출이 실패합니다.
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
    }

    /// 다음 `count`번의 오프셋 커밋을 실패시킵니다.
    pub fn fail_next_commits(&self, count: usize) {
        self.shared.fail_commits.store(count, Ordering::SeqCst);
    }

    /// 그룹 컨슈머를 생성합니다. 읽기 위치는 그룹의 커밋 오프셋에서 시작합니다.
    ///
    /// 파티션 할당이 겹치지 않도록 하는 것은 호출자의 책임입니다.
    /// [`assign_partitions`]를 참고하세요.
    pub async fn consumer(
        &self,
        group: &str,
        partitions: impl IntoIterator<Item = u32>,
    ) -> Result<MemoryConsumer, BrokerError> {
        let mut state = self.shared.state.lock().await;
        let count = state.partitions.len();
        let committed = state
            .groups
            .entry(group.to_owned())
            .or_insert_with(|| vec![0; count])
            .clone();

        let mut assigned = Vec::new();
        let mut positions = HashMap::new();
        for partition in partitions {
            let index = partition_index(partition, count)?;
            if !assigned.contains(&partition) {
                assigned.push(partition);
                positions.insert(partition, committed[index]);
            }
        }
        if assigned.is_empty() {
            return Err(BrokerError::Unavailable(format!(
                "consumer for group '{group}' has no partitions"
            )));
        }

        debug!(group, partitions = ?assigned, "memory consumer created");
        Ok(MemoryConsumer {
            shared: Arc::clone(&self.shared),
            group: group.to_owned(),
            partitions: assigned,
            positions,
            redeliveries: HashMap::new(),
            cursor: 0,
        })
    }

    /// 본문을 그대로 기록합니다. 와이어 포맷이 아닌 메시지를 흉내낼 때 사용합니다.
    pub async fn publish_raw(&self, body: Bytes) -> Result<DeliveryReceipt, BrokerError> {
        self.ensure_available()?;
        let receipt = {
            let mut state = self.shared.state.lock().await;
            let index = state.next_partition % state.partitions.len();
            state.next_partition = state.next_partition.wrapping_add(1);
            let log = &mut state.partitions[index];
            log.push(body);
            DeliveryReceipt {
                partition: u32::try_from(index).unwrap_or(u32::MAX),
                offset: (log.len() - 1) as u64,
            }
        };
        self.shared.notify.notify_waiters();
        Ok(receipt)
    }

    /// 그룹이 커밋한 다음 오프셋
    pub async fn committed_offset(&self, group: &str, partition: u32) -> u64 {
        let state = self.shared.state.lock().await;
        let index = usize::try_from(partition).unwrap_or(usize::MAX);
        state
            .groups
            .get(group)
            .and_then(|offsets| offsets.get(index).copied())
            .unwrap_or(0)
    }

    /// 그룹이 아직 커밋하지 않은 메시지 수
    pub async fn lag(&self, group: &str) -> u64 {
        let state = self.shared.state.lock().await;
        state
            .partitions
            .iter()
            .enumerate()
            .map(|(i, log)| {
                let committed = state
                    .groups
                    .get(group)
                    .and_then(|offsets| offsets.get(i).copied())
                    .unwrap_or(0);
                (log.len() as u64).saturating_sub(committed)
            })
            .sum()
    }

    fn ensure_available(&self) -> Result<(), BrokerError> {
        ensure_available(&self.shared)
    }
}

impl QueueProducer for MemoryBroker {
    async fn enqueue(&self, message: QueueMessage) -> Result<DeliveryReceipt, BrokerError> {
        let body = message.encode()?;
        self.publish_raw(body).await
    }

    async fn health(&self) -> BrokerHealth {
        match self.ensure_available() {
            Ok(()) => BrokerHealth::Healthy,
            Err(e) => BrokerHealth::Unavailable(e.to_string()),
        }
    }
}

/// 인메모리 브로커의 그룹 컨슈머
pub struct MemoryConsumer {
    shared: Arc<Shared>,
    group: String,
    partitions: Vec<u32>,
    /// 파티션별 다음 읽기 위치
    positions: HashMap<u32, u64>,
    redeliveries: HashMap<(u32, u64), u32>,
    cursor: usize,
}

impl MemoryConsumer {
    pub fn partitions(&self) -> &[u32] {
        &self.partitions
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    async fn try_fetch(&mut self) -> Option<Delivery> {
        let state = self.shared.state.lock().await;
        for step in 0..self.partitions.len() {
            let slot = (self.cursor + step) % self.partitions.len();
            let partition = self.partitions[slot];
            let Some(log) = usize::try_from(partition)
                .ok()
                .and_then(|i| state.partitions.get(i))
            else {
                continue;
            };
            let position = self.positions.get(&partition).copied().unwrap_or(0);
            let Some(body) = usize::try_from(position).ok().and_then(|i| log.get(i)) else {
                continue;
            };

            self.positions.insert(partition, position + 1);
            self.cursor = slot + 1;
            return Some(Delivery {
                body: body.clone(),
                partition,
                offset: position,
                redelivery_count: self
                    .redeliveries
                    .get(&(partition, position))
                    .copied()
                    .unwrap_or(0),
            });
        }
        None
    }
}

impl QueueConsumer for MemoryConsumer {
    async fn poll(&mut self, wait: Duration) -> Result<Option<Delivery>, BrokerError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            ensure_available(&self.shared)?;
            let shared = Arc::clone(&self.shared);
            let notified = shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.try_fetch().await {
                return Ok(Some(delivery));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn commit(&mut self, delivery: &Delivery) -> Result<(), BrokerError> {
        ensure_available(&self.shared)?;
        if self
            .shared
            .fail_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(BrokerError::Commit("injected commit failure".to_owned()));
        }

        let mut state = self.shared.state.lock().await;
        let count = state.partitions.len();
        let index = partition_index(delivery.partition, count)?;
        let offsets = state
            .groups
            .entry(self.group.clone())
            .or_insert_with(|| vec![0; count]);
        offsets[index] = offsets[index].max(delivery.offset + 1);
        self.redeliveries
            .remove(&(delivery.partition, delivery.offset));
        Ok(())
    }

    async fn nack(&mut self, delivery: &Delivery) -> Result<(), BrokerError> {
        let position = self.positions.entry(delivery.partition).or_insert(0);
        *position = (*position).min(delivery.offset);
        *self
            .redeliveries
            .entry((delivery.partition, delivery.offset))
            .or_insert(0) += 1;
        Ok(())
    }
}

fn ensure_available(shared: &Shared) -> Result<(), BrokerError> {
    if shared.available.load(Ordering::SeqCst) {
        Ok(())
    } else {
        Err(BrokerError::Unavailable("memory broker is offline".to_owned()))
    }
}

fn partition_index(partition: u32, count: usize) -> Result<usize, BrokerError> {
    usize::try_from(partition)
        .ok()
        .filter(|i| *i < count)
        .ok_or_else(|| {
            BrokerError::Unavailable(format!(
                "partition {partition} does not exist ({count} partitions)"
            ))
        })
}

/// 파티션을 워커 수만큼 겹치지 않게 나눕니다. 파티션보다 많은 워커는 할당받지 못합니다.
pub fn assign_partitions(partitions: u32, workers: usize) -> Vec<Vec<u32>> {
    let workers = workers.clamp(1, usize::try_from(partitions.max(1)).unwrap_or(1));
    let mut assignment = vec![Vec::new(); workers];
    for partition in 0..partitions.max(1) {
        let slot = usize::try_from(partition).unwrap_or(0) % workers;
        assignment[slot].push(partition);
    }
    assignment
}

/// 인메모리 데드레터 싱크
#[derive(Default)]
pub struct MemoryDeadLetterSink {
    records: Mutex<Vec<DeadLetterRecord>>,
    unavailable: AtomicBool,
}

impl MemoryDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<DeadLetterRecord> {
        self.records.lock().await.clone()
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }
}

impl DeadLetterSink for MemoryDeadLetterSink {
    async fn publish(&self, record: DeadLetterRecord) -> Result<(), BrokerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable(
                "dead-letter sink is offline".to_owned(),
            ));
        }
        self.records.lock().await.push(record);
        Ok(())
    }
}
