//! # graphwarden-core
//!
//! GraphWarden의 공통 기반 크레이트입니다.
//!
//! - [`event`]: OCSF 형태의 정규 이벤트, 영속화 결과, 알림
//! - [`types`]: 필드 값 모델, 심각도, 입력 포맷 태그
//! - [`error`]: 도메인별 에러와 에러 분류
//! - [`config`]: `graphwarden.toml` 설정
//! - [`metrics`]: 메트릭 이름 상수

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{
    BrokerError, ConfigError, ErrorKind, FieldViolation, GraphwardenError, ParseError, RuleError,
    SchemaError, StorageError,
};

// 설정
pub use config::GraphwardenConfig;

// 이벤트
pub use event::{
    Alert, AlertEntity, CanonicalEvent, Endpoint, EventRef, MergeOutcome, Metadata, Principal,
    Product, Resource, RuleQuery,
};

// 도메인 타입
pub use types::{FieldMap, FieldValue, FormatTag, Severity};
