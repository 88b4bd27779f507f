//! 수집 에러 타입
//!
//! [`IngestError`]는 정규화, 영속화, 브로커, 처리 타임아웃 실패를 묶습니다.
//! 컨슈머의 재시도/데드레터 정책은 [`IngestError::kind`]로 결정됩니다.

use graphwarden_core::error::{BrokerError, ErrorKind, GraphwardenError, StorageError};
use graphwarden_normalize::NormalizeError;

/// 수집 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// 감지/파싱/스키마 검증 실패
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    /// 그래프 영속화 실패
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// 브로커 실패
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// 메시지 처리 타임아웃
    #[error("message processing timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// 제출 형식 오류
    #[error("invalid submission: {0}")]
    InvalidSubmission(String),
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Normalize(e) => e.kind(),
            Self::Storage(e) => e.kind(),
            Self::Broker(e) => e.kind(),
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::InvalidSubmission(_) => ErrorKind::MalformedInput,
        }
    }
}

impl From<IngestError> for GraphwardenError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Normalize(e) => e.into(),
            IngestError::Storage(e) => GraphwardenError::Storage(e),
            IngestError::Broker(e) => GraphwardenError::Broker(e),
            IngestError::Timeout { timeout_ms } => GraphwardenError::Timeout {
                operation: "message processing".to_owned(),
                timeout_ms,
            },
            IngestError::InvalidSubmission(reason) => {
                GraphwardenError::Broker(BrokerError::Codec(reason))
            }
        }
    }
}
