//! # graphwarden-normalize
//!
//! 이기종 보안 텔레메트리를 OCSF 정규 이벤트로 변환합니다.
//!
//! - [`detect`]: 힌트/내용 기반 포맷 감지
//! - [`parser`]: 네이티브 JSON, Syslog, CEF, LEEF 파서
//! - [`mapper`]: 포맷별 매핑 테이블과 심각도 정책
//! - [`schema`]: 스키마 레지스트리와 검증
//! - [`normalizer`]: detect → parse → map → validate 파사드
//!
//! # 사용 예시
//! ```ignore
//! use graphwarden_normalize::Normalizer;
//!
//! let normalizer = Normalizer::default();
//! let mapped = normalizer.normalize(b"CEF:0|acme|fw|1.0|100|Blocked|5|rt=1705320000000", None)?;
//! println!("{}", mapped.event.class_uid);
//! ```

pub mod detect;
pub mod error;
pub mod mapper;
pub mod normalizer;
pub mod parser;
pub mod schema;

pub use detect::FormatDetector;
pub use error::NormalizeError;
pub use mapper::{MappedEvent, OcsfMapper, SeverityPolicy};
pub use normalizer::Normalizer;
pub use parser::{FormatParser, ParserRegistry};
pub use schema::{CANONICAL_EVENT, FieldSpec, FieldType, SchemaDefinition, SchemaRegistry};
