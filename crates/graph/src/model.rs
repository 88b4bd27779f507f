//! 그래프 모델 -- 노드 레이블, 관계 타입, 쓰기 집합, 쿼리 결과 행

use std::collections::BTreeMap;
use std::fmt;

use graphwarden_core::types::{FieldMap, FieldValue, Severity};
use serde::{Deserialize, Serialize};

/// 노드 레이블
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeLabel {
    Event,
    #[serde(rename = "IP")]
    Ip,
    Host,
    User,
    Process,
    Resource,
}

impl NodeLabel {
    pub const ALL: [NodeLabel; 6] = [
        Self::Event,
        Self::Ip,
        Self::Host,
        Self::User,
        Self::Process,
        Self::Resource,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Event => "Event",
            Self::Ip => "IP",
            Self::Host => "Host",
            Self::User => "User",
            Self::Process => "Process",
            Self::Resource => "Resource",
        }
    }

    /// 레이블 이름에서 변환합니다. 대소문자를 구분하지 않습니다.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|label| label.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 관계 타입 (방향 고정)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelType {
    /// `(IP|Host)-[:GENERATED]->(Event)`
    Generated,
    /// `(User)-[:PERFORMED]->(Event)`
    Performed,
    /// `(Event)-[:TARGETS]->(Entity)`
    Targets,
}

impl RelType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generated => "GENERATED",
            Self::Performed => "PERFORMED",
            Self::Targets => "TARGETS",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Generated, Self::Performed, Self::Targets]
            .into_iter()
            .find(|rel| rel.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for RelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 레이블 범위의 노드 식별 키
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    pub label: NodeLabel,
    pub key: String,
}

impl NodeKey {
    pub fn new(label: NodeLabel, key: impl Into<String>) -> Self {
        Self {
            label,
            key: key.into(),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.label, self.key)
    }
}

/// 저장된 노드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeKey,
    pub properties: FieldMap,
}

/// 관계 식별 키 -- 같은 `(from, type, to)` 관계는 하나만 존재합니다.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelKey {
    pub from: NodeKey,
    pub rel: RelType,
    pub to: NodeKey,
}

/// 저장된 관계
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub key: RelKey,
    pub properties: FieldMap,
}

/// 한 이벤트의 영속화 단위
///
/// 저장소는 이 집합 전체를 하나의 트랜잭션으로 병합해야 합니다.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteSet {
    /// Event 노드
    pub event: Node,
    /// 관련 엔티티 노드
    pub entities: Vec<Node>,
    /// 관계
    pub relationships: Vec<Relationship>,
}

/// 쿼리 결과 셀
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowValue {
    Node(Node),
    Scalar(FieldValue),
}

/// 쿼리 결과 한 행 (컬럼 이름 → 값)
pub type QueryRow = BTreeMap<String, RowValue>;

/// 알림 조회 필터
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertFilter {
    pub rule_id: Option<String>,
    pub min_severity: Option<Severity>,
    /// 최대 개수 (기본 100, 최대 1000)
    pub limit: Option<usize>,
}

impl AlertFilter {
    /// 기본 조회 개수
    pub const DEFAULT_LIMIT: usize = 100;
    /// 최대 조회 개수
    pub const MAX_LIMIT: usize = 1000;

    /// 적용할 조회 개수
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}

/// 저장소 통계
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    /// 레이블별 노드 수
    pub nodes: BTreeMap<String, usize>,
    /// 관계 타입별 관계 수
    pub relationships: BTreeMap<String, usize>,
    pub alerts: usize,
}

impl GraphStats {
    pub fn node_count(&self, label: NodeLabel) -> usize {
        self.nodes.get(label.as_str()).copied().unwrap_or(0)
    }

    pub fn relationship_count(&self, rel: RelType) -> usize {
        self.relationships.get(rel.as_str()).copied().unwrap_or(0)
    }

    pub fn total_nodes(&self) -> usize {
        self.nodes.values().sum()
    }

    pub fn total_relationships(&self) -> usize {
        self.relationships.values().sum()
    }
}
