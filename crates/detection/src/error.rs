//! 탐지 에러 타입
//!
//! [`DetectionError`]는 룰 관리와 저장소 실패를 표현합니다.
//! 룰 하나의 실행 실패는 에러가 아니라 [`DetectionReport`](crate::engine::DetectionReport)의
//! `errors`로 보고됩니다.

use graphwarden_core::error::{ErrorKind, GraphwardenError, RuleError, StorageError};

/// 탐지 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    /// 룰 조회/검증/로딩 실패
    #[error(transparent)]
    Rule(#[from] RuleError),

    /// 그래프 저장소 실패
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl DetectionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Rule(e) => e.kind(),
            Self::Storage(e) => e.kind(),
        }
    }
}

impl From<DetectionError> for GraphwardenError {
    fn from(err: DetectionError) -> Self {
        match err {
            DetectionError::Rule(e) => GraphwardenError::Rule(e),
            DetectionError::Storage(e) => GraphwardenError::Storage(e),
        }
    }
}
