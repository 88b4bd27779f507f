//! 큐 메시지 모델 -- 와이어 포맷, 전달 단위, 데드레터 레코드

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use graphwarden_core::error::{BrokerError, ErrorKind};
use serde::{Deserialize, Serialize};

/// 큐 와이어 메시지
///
/// JSON으로 직렬화됩니다. 지원 포맷이 모두 텍스트이므로 `raw_payload`는
/// UTF-8 문자열이며, 잘못된 바이트 시퀀스는 enqueue 시점에 U+FFFD로 대체됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub raw_payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_format_hint: Option<String>,
    pub enqueue_time: DateTime<Utc>,
}

impl QueueMessage {
    /// 원시 입력으로 메시지를 생성합니다.
    pub fn new(raw: &[u8], hint: Option<&str>) -> Self {
        Self {
            raw_payload: String::from_utf8_lossy(raw).into_owned(),
            source_format_hint: hint.map(str::to_owned),
            enqueue_time: Utc::now(),
        }
    }

    pub fn encode(&self) -> Result<Bytes, BrokerError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| BrokerError::Codec(e.to_string()))
    }

    pub fn decode(body: &[u8]) -> Result<Self, BrokerError> {
        serde_json::from_slice(body).map_err(|e| BrokerError::Codec(e.to_string()))
    }
}

/// 브로커가 메시지를 받아들인 위치
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub partition: u32,
    pub offset: u64,
}

impl fmt::Display for DeliveryReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "partition {} offset {}", self.partition, self.offset)
    }
}

/// 컨슈머가 받은 전달 단위
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// 인코딩된 메시지 본문
    pub body: Bytes,
    pub partition: u32,
    pub offset: u64,
    /// 이 메시지가 재전달된 횟수 (첫 전달은 0)
    pub redelivery_count: u32,
}

impl Delivery {
    /// 본문을 디코딩합니다. 실패는 `BrokerError::Codec`입니다.
    pub fn message(&self) -> Result<QueueMessage, BrokerError> {
        QueueMessage::decode(&self.body)
    }

    pub fn receipt(&self) -> DeliveryReceipt {
        DeliveryReceipt {
            partition: self.partition,
            offset: self.offset,
        }
    }
}

/// 데드레터 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub raw_payload: String,
    #[serde(default)]
    pub source_format_hint: Option<String>,
    pub error_kind: ErrorKind,
    pub error_detail: String,
    pub attempts: u32,
}

/// 브로커 연결 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum BrokerHealth {
    Healthy,
    Unavailable(String),
}

impl BrokerHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

impl fmt::Display for BrokerHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => f.write_str("healthy"),
            Self::Unavailable(reason) => write!(f, "unavailable: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_utf8_is_replaced_at_enqueue() {
        let message = QueueMessage::new(b"CEF:0|a|b|1|1|x|5|msg=\xff", Some("cef"));
        assert!(message.raw_payload.contains('\u{FFFD}'));
        assert_eq!(message.source_format_hint.as_deref(), Some("cef"));
    }

    #[test]
    fn wire_format_is_json() {
        let message = QueueMessage::new(b"<34>Jan 15 12:00:00 host app: hi", None);
        let body = message.encode().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json.get("raw_payload").is_some());
        assert!(json.get("enqueue_time").is_some());
        assert!(json.get("source_format_hint").is_none());
        assert_eq!(QueueMessage::decode(&body).unwrap(), message);
    }

    #[test]
    fn undecodable_body_is_codec_error() {
        let delivery = Delivery {
            body: Bytes::from_static(b"not json"),
            partition: 0,
            offset: 3,
            redelivery_count: 0,
        };
        let err = delivery.message().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
        assert_eq!(delivery.receipt().to_string(), "partition 0 offset 3");
    }

    #[test]
    fn dead_letter_kind_is_snake_case() {
        let record = DeadLetterRecord {
            raw_payload: "x".into(),
            source_format_hint: None,
            error_kind: ErrorKind::SchemaViolation,
            error_detail: "missing class_uid".into(),
            attempts: 3,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["error_kind"], "schema_violation");
    }
}
