//! # graphwarden-graph
//!
//! 정규 이벤트를 보안 그래프에 영속화합니다.
//!
//! - [`model`]: 노드 레이블, 관계 타입, 쓰기 집합, 쿼리 결과 행
//! - [`store`]: [`GraphStore`] 저장소 경계 trait
//! - [`memory`]: 인메모리 저장소와 커넥션 풀
//! - [`pattern`]: 인메모리 저장소의 패턴 쿼리
//! - [`adapter`]: 식별 키 계산과 멱등 병합
//!
//! # 사용 예시
//! ```ignore
//! use std::sync::Arc;
//! use graphwarden_graph::{MemoryGraphStore, PersistenceAdapter};
//!
//! let adapter = PersistenceAdapter::new(Arc::new(MemoryGraphStore::default()));
//! let event_ref = adapter.persist(&event).await?;
//! ```

pub mod adapter;
pub mod memory;
pub mod model;
pub mod pattern;
pub mod store;

pub use adapter::{PersistenceAdapter, build_write_set, event_key};
pub use memory::MemoryGraphStore;
pub use model::{
    AlertFilter, GraphStats, Node, NodeKey, NodeLabel, QueryRow, RelKey, RelType, Relationship,
    RowValue, WriteSet,
};
pub use pattern::{PATTERN_LANGUAGE, PatternError, PatternQuery};
pub use store::GraphStore;
