//! # graphwarden-detection
//!
//! 그래프 탐지 엔진과 룰 관리를 제공합니다.
//!
//! # 구성
//! - [`rule`]: 룰 정의와 검증
//! - [`store`]: 룰 CRUD와 활성 룰 스냅샷 캐시
//! - [`loader`]: 디스크의 YAML/JSON 룰 파일 로딩
//! - [`engine`]: 동시 실행 제한과 룰별 타임아웃이 있는 탐지 엔진
//! - [`dedup`]: 알림 중복 억제 윈도우

pub mod dedup;
pub mod engine;
pub mod error;
pub mod loader;
pub mod rule;
pub mod store;

pub use dedup::DedupWindow;
pub use engine::{
    DetectionEngine, DetectionReport, RuleExecution, RuleFailure, RuleState, row_to_alert,
};
pub use error::DetectionError;
pub use loader::{LoadedRules, MAX_RULE_FILE_SIZE, MAX_RULES_COUNT, RuleLoader};
pub use rule::{MAX_RULE_ID_LEN, Rule, RuleDraft, RuleFilter};
pub use store::RuleStore;
