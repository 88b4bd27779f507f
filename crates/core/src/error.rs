//! 에러 타입 -- 도메인별 에러 정의와 에러 분류
//!
//! 각 도메인 에러는 [`GraphwardenError`]로 변환되며,
//! [`ErrorKind`]는 데드레터 레코드와 재시도 정책이 사용하는 닫힌 분류입니다.

use std::fmt;

/// GraphWarden 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum GraphwardenError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 포맷 감지/파싱 에러
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// 스키마 검증 에러
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// 그래프 저장소 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// 메시지 브로커 에러
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// 탐지 룰 에러
    #[error("rule error: {0}")]
    Rule(#[from] RuleError),

    /// 처리 타임아웃
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GraphwardenError {
    /// 에러 분류를 반환합니다.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Parse(e) => e.kind(),
            Self::Schema(e) => e.kind(),
            Self::Storage(e) => e.kind(),
            Self::Broker(e) => e.kind(),
            Self::Rule(e) => e.kind(),
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

/// 에러 분류
///
/// 데드레터 레코드의 `error_kind`에 `snake_case`로 기록됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnrecognizedFormat,
    MalformedInput,
    SchemaViolation,
    PersistenceFailure,
    BrokerUnavailable,
    RuleQueryError,
    RuleTimeout,
    RuleNotFound,
    InvalidRule,
    /// 메시지 처리 타임아웃
    Timeout,
    Config,
    Io,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnrecognizedFormat => "unrecognized_format",
            Self::MalformedInput => "malformed_input",
            Self::SchemaViolation => "schema_violation",
            Self::PersistenceFailure => "persistence_failure",
            Self::BrokerUnavailable => "broker_unavailable",
            Self::RuleQueryError => "rule_query_error",
            Self::RuleTimeout => "rule_timeout",
            Self::RuleNotFound => "rule_not_found",
            Self::InvalidRule => "invalid_rule",
            Self::Timeout => "timeout",
            Self::Config => "config",
            Self::Io => "io",
        }
    }

    /// 일시적 장애로 간주되어 재전달(redelivery) 대상인지 여부
    ///
    /// 입력 자체의 결함(포맷/파싱/스키마)은 재시도해도 결과가 같으므로 `false`입니다.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::PersistenceFailure | Self::BrokerUnavailable | Self::Timeout | Self::Io
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 포맷 감지/파싱 에러
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// 어떤 포맷으로도 인식되지 않는 입력
    #[error("unrecognized format: '{preview}'")]
    UnrecognizedFormat {
        /// 입력 앞부분 (최대 64자)
        preview: String,
    },

    /// 포맷은 인식했으나 구조가 잘못된 입력
    #[error("malformed {format} input at offset {offset} near '{fragment}': {reason}")]
    MalformedInput {
        /// 파서 포맷 이름
        format: String,
        /// 실패 위치 (바이트 오프셋)
        offset: usize,
        /// 문제가 된 입력 조각
        fragment: String,
        /// 실패 사유
        reason: String,
    },
}

impl ParseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnrecognizedFormat { .. } => ErrorKind::UnrecognizedFormat,
            Self::MalformedInput { .. } => ErrorKind::MalformedInput,
        }
    }
}

/// 단일 필드 검증 실패
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldViolation {
    /// 필드 경로 (점 표기)
    pub field: String,
    /// 실패 사유
    pub reason: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}': {}", self.field, self.reason)
    }
}

/// 스키마 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// 필수 필드 누락 또는 타입/범위 위반
    #[error("schema violation ({schema}): {}", join_violations(.violations))]
    Violation {
        schema: String,
        violations: Vec<FieldViolation>,
    },

    /// 등록되지 않은 스키마
    #[error("unknown schema: {0}")]
    UnknownSchema(String),

    /// 스키마 정의 로딩 실패
    #[error("schema load error: {path}: {reason}")]
    Load { path: String, reason: String },
}

impl SchemaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Violation { .. } => ErrorKind::SchemaViolation,
            Self::UnknownSchema(_) | Self::Load { .. } => ErrorKind::Config,
        }
    }

    /// 위반 필드 목록 (Violation이 아니면 빈 슬라이스)
    pub fn violations(&self) -> &[FieldViolation] {
        match self {
            Self::Violation { violations, .. } => violations,
            _ => &[],
        }
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// 그래프 저장소 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 트랜잭션 중단 (전체 롤백됨)
    #[error("transaction aborted: {0}")]
    Transaction(String),

    /// 커넥션 풀 획득 타임아웃
    #[error("connection pool exhausted after {waited_ms}ms")]
    PoolTimeout { waited_ms: u64 },

    /// 저장소 연결 실패
    #[error("connection failed: {0}")]
    Connection(String),

    /// 쿼리 해석/실행 실패
    #[error("query failed: {0}")]
    Query(String),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Query(_) => ErrorKind::RuleQueryError,
            _ => ErrorKind::PersistenceFailure,
        }
    }
}

/// 메시지 브로커 에러
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// 브로커 연결 불가
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// 오프셋 커밋 실패
    #[error("offset commit failed: {0}")]
    Commit(String),

    /// 메시지 인코딩/디코딩 실패
    #[error("message codec error: {0}")]
    Codec(String),
}

impl BrokerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Codec(_) => ErrorKind::MalformedInput,
            _ => ErrorKind::BrokerUnavailable,
        }
    }
}

/// 탐지 룰 에러
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// 존재하지 않는 룰
    #[error("rule not found: {0}")]
    NotFound(String),

    /// 룰 유효성 검증 실패
    #[error("rule validation error: rule '{rule_id}': {reason}")]
    Validation { rule_id: String, reason: String },

    /// 룰 쿼리 실행 실패
    #[error("rule '{rule_id}' query failed: {reason}")]
    Query { rule_id: String, reason: String },

    /// 룰 실행 타임아웃
    #[error("rule '{rule_id}' timed out after {timeout_ms}ms")]
    Timeout { rule_id: String, timeout_ms: u64 },

    /// 룰 파일 로딩 실패
    #[error("rule load error: {path}: {reason}")]
    Load { path: String, reason: String },
}

impl RuleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::RuleNotFound,
            Self::Validation { .. } | Self::Load { .. } => ErrorKind::InvalidRule,
            Self::Query { .. } => ErrorKind::RuleQueryError,
            Self::Timeout { .. } => ErrorKind::RuleTimeout,
        }
    }
}
