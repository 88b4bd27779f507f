//! 정규화 에러 타입
//!
//! [`NormalizeError`]는 감지/파싱/매핑/검증 단계의 실패를 하나로 묶습니다.
//! `From<NormalizeError> for GraphwardenError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use graphwarden_core::error::{ErrorKind, GraphwardenError, ParseError, SchemaError};

/// 정규화 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// 포맷 감지 또는 파싱 실패
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// 스키마 검증 실패
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl NormalizeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse(e) => e.kind(),
            Self::Schema(e) => e.kind(),
        }
    }
}

impl From<NormalizeError> for GraphwardenError {
    fn from(err: NormalizeError) -> Self {
        match err {
            NormalizeError::Parse(e) => GraphwardenError::Parse(e),
            NormalizeError::Schema(e) => GraphwardenError::Schema(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_into_umbrella_error_with_same_kind() {
        let err = NormalizeError::from(ParseError::UnrecognizedFormat {
            preview: "hello".to_owned(),
        });
        assert_eq!(err.kind(), ErrorKind::UnrecognizedFormat);

        let umbrella: GraphwardenError = err.into();
        assert!(matches!(umbrella, GraphwardenError::Parse(_)));
        assert_eq!(umbrella.kind(), ErrorKind::UnrecognizedFormat);
    }
}
