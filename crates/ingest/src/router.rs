//! 수집 라우터 -- Direct 모드는 즉시 영속화, Queued 모드는 원시 입력을 큐에 넣습니다.
//!
//! 모드는 호출마다 명시하는 파라미터이며 라우터 상태가 아닙니다.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use graphwarden_core::error::ConfigError;
use graphwarden_core::event::EventRef;
use graphwarden_graph::{GraphStore, PersistenceAdapter};
use graphwarden_normalize::Normalizer;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::broker::QueueProducer;
use crate::error::IngestError;
use crate::message::{BrokerHealth, DeliveryReceipt, QueueMessage};

/// 수집 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionMode {
    /// detect → parse → map → persist를 호출자 태스크에서 동기 실행
    Direct,
    /// 파싱 없이 큐에 넣고 ack 반환
    Queued,
}

impl IngestionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Queued => "queued",
        }
    }
}

impl FromStr for IngestionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "queued" | "queue" => Ok(Self::Queued),
            other => Err(ConfigError::InvalidValue {
                field: "ingest.default_mode".to_owned(),
                reason: format!("unknown ingestion mode '{other}' (expected direct or queued)"),
            }),
        }
    }
}

impl fmt::Display for IngestionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queued 모드 응답
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueAck {
    /// 클라이언트에 보여주는 임시 ID (UUID v4)
    pub temp_id: String,
    pub receipt: DeliveryReceipt,
}

/// 수집 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum IngestOutcome {
    Persisted(EventRef),
    Enqueued(EnqueueAck),
}

impl fmt::Display for IngestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Persisted(event_ref) => write!(f, "persisted {event_ref}"),
            Self::Enqueued(ack) => write!(f, "enqueued {} at {}", ack.temp_id, ack.receipt),
        }
    }
}

/// 인바운드 제출 형태 `{event, source_format}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSubmission {
    /// 문자열이면 그 내용이, 객체면 직렬화한 JSON이 원시 입력입니다.
    pub event: serde_json::Value,
    /// `ocsf`, `syslog`, `cef`, `leef`, `raw`
    #[serde(default)]
    pub source_format: Option<String>,
}

impl EventSubmission {
    /// 원시 입력 바이트를 꺼냅니다.
    pub fn raw_payload(&self) -> Result<Vec<u8>, IngestError> {
        match &self.event {
            serde_json::Value::String(text) => Ok(text.as_bytes().to_vec()),
            serde_json::Value::Object(_) => serde_json::to_vec(&self.event)
                .map_err(|e| IngestError::InvalidSubmission(e.to_string())),
            other => Err(IngestError::InvalidSubmission(format!(
                "event must be a string or an object, got {}",
                json_type(other)
            ))),
        }
    }
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// 수집 라우터
pub struct IngestionRouter<S: GraphStore, P: QueueProducer> {
    normalizer: Arc<Normalizer>,
    adapter: PersistenceAdapter<S>,
    producer: Arc<P>,
}

impl<S: GraphStore, P: QueueProducer> Clone for IngestionRouter<S, P> {
    fn clone(&self) -> Self {
        Self {
            normalizer: Arc::clone(&self.normalizer),
            adapter: self.adapter.clone(),
            producer: Arc::clone(&self.producer),
        }
    }
}

impl<S: GraphStore, P: QueueProducer> IngestionRouter<S, P> {
    pub fn new(normalizer: Arc<Normalizer>, adapter: PersistenceAdapter<S>, producer: Arc<P>) -> Self {
        Self {
            normalizer,
            adapter,
            producer,
        }
    }

    /// 원시 입력을 수집합니다.
    ///
    /// Direct 모드의 실패는 아무것도 영속화하지 않고 타입이 지정된 에러를 반환합니다.
    pub async fn ingest(
        &self,
        raw: &[u8],
        hint: Option<&str>,
        mode: IngestionMode,
    ) -> Result<IngestOutcome, IngestError> {
        match mode {
            IngestionMode::Direct => {
                let mapped = self.normalizer.normalize(raw, hint)?;
                for warning in &mapped.warnings {
                    debug!(format = %mapped.format, warning = %warning, "mapping warning");
                }
                let event_ref = self.adapter.persist(&mapped.event).await?;
                Ok(IngestOutcome::Persisted(event_ref))
            }
            IngestionMode::Queued => {
                let receipt = self.producer.enqueue(QueueMessage::new(raw, hint)).await?;
                let ack = EnqueueAck {
                    temp_id: Uuid::new_v4().to_string(),
                    receipt,
                };
                info!(temp_id = %ack.temp_id, partition = receipt.partition, offset = receipt.offset, "event enqueued");
                Ok(IngestOutcome::Enqueued(ack))
            }
        }
    }

    /// `{event, source_format}` 제출을 수집합니다.
    pub async fn submit(
        &self,
        submission: EventSubmission,
        mode: IngestionMode,
    ) -> Result<IngestOutcome, IngestError> {
        let raw = submission.raw_payload()?;
        self.ingest(&raw, submission.source_format.as_deref(), mode)
            .await
    }

    pub async fn broker_health(&self) -> BrokerHealth {
        self.producer.health().await
    }

    pub fn adapter(&self) -> &PersistenceAdapter<S> {
        &self.adapter
    }
}
