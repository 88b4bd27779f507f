//! 정규 이벤트 모델 -- OCSF 형태의 이벤트, 영속화 결과, 알림
//!
//! [`CanonicalEvent`]는 모든 입력 포맷이 매핑되는 공통 레코드이며,
//! 그래프 영속화와 탐지 엔진이 공유하는 유일한 이벤트 표현입니다.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{FieldMap, Severity};

/// 정규 이벤트 레코드 (OCSF 형태)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    /// 이벤트 클래스 ID
    pub class_uid: String,
    /// 카테고리 ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_uid: Option<String>,
    /// 이벤트 발생 시각
    pub time: DateTime<Utc>,
    /// 심각도 (0–10)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// 메시지
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// 메타데이터
    pub metadata: Metadata,
    /// 출발지 엔드포인트
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<Endpoint>,
    /// 목적지 엔드포인트
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst: Option<Endpoint>,
    /// 행위 주체
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
    /// 대상 리소스 (순서 유지)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<Resource>,
    /// 매핑되지 않은 원본 필드
    #[serde(default, skip_serializing_if = "FieldMap::is_empty")]
    pub extensions: FieldMap,
}

/// 이벤트 메타데이터
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// 스키마 버전
    pub version: String,
    /// 제품 정보
    pub product: Product,
    /// 벤더명
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_name: Option<String>,
    /// 이벤트 고유 ID (제공된 경우 이벤트 식별 키로 사용)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

/// 제품 정보
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// 제품명
    pub name: String,
    /// 제품 버전
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// 네트워크 엔드포인트
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Endpoint {
    /// 식별 가능한 필드가 하나도 없으면 `true`
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.ip.is_none() && self.hostname.is_none()
    }
}

/// 행위 주체 (사용자)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// 대상 리소스
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// 병합(upsert) 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    /// 새 노드 생성
    Created,
    /// 같은 키의 속성이 변경됨
    Updated,
    /// 동일한 키와 속성 -- 변경 없음
    Unchanged,
}

impl MergeOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }
}

/// 영속화된 이벤트 참조
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRef {
    /// Event 노드 식별 키
    pub id: String,
    /// 병합 결과
    pub outcome: MergeOutcome,
}

impl fmt::Display for EventRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.outcome.as_str())
    }
}

/// 알림에 포함된 엔티티
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEntity {
    /// 엔티티 식별 키
    pub id: String,
    /// 노드 레이블
    #[serde(rename = "type")]
    pub kind: String,
    /// 노드 속성
    #[serde(default)]
    pub properties: FieldMap,
}

/// 보안 알림
///
/// 탐지 룰의 쿼리 결과 한 행에서 생성됩니다. 생성 이후 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// 알림 ID (UUID v4)
    pub alert_id: String,
    /// 탐지 룰 ID
    pub rule_id: String,
    /// 탐지 룰 이름
    pub rule_name: String,
    /// 심각도
    pub severity: Severity,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
    /// 설명
    pub description: String,
    /// MITRE ATT&CK 기법 ID
    #[serde(default)]
    pub mitre_techniques: Vec<String>,
    /// 룰 태그
    #[serde(default)]
    pub tags: Vec<String>,
    /// 관련 엔티티
    #[serde(default)]
    pub entities: Vec<AlertEntity>,
    /// 결과 행의 스칼라 컬럼 (예: attempts)
    #[serde(default)]
    pub context: FieldMap,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} (rule: {}, entities: {})",
            self.severity,
            self.rule_name,
            self.rule_id,
            self.entities.len()
        )
    }
}

/// 룰 쿼리 -- 언어 태그가 붙은 불투명 쿼리 텍스트
///
/// 탐지 엔진은 텍스트를 해석하지 않고 그래프 저장소에 그대로 전달합니다.
/// 직렬화 형태는 `{language, text}`이며, 역직렬화 시 단순 문자열도 허용합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RuleQueryRepr")]
pub struct RuleQuery {
    /// 쿼리 언어 (기본값 `pattern`)
    pub language: String,
    /// 쿼리 본문
    pub text: String,
}

impl RuleQuery {
    /// 기본 쿼리 언어
    pub const DEFAULT_LANGUAGE: &'static str = "pattern";

    /// 기본 언어로 쿼리를 생성합니다.
    pub fn pattern(text: impl Into<String>) -> Self {
        Self {
            language: Self::DEFAULT_LANGUAGE.to_owned(),
            text: text.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RuleQueryRepr {
    Text(String),
    Tagged {
        #[serde(default = "default_language")]
        language: String,
        text: String,
    },
}

fn default_language() -> String {
    RuleQuery::DEFAULT_LANGUAGE.to_owned()
}

impl From<RuleQueryRepr> for RuleQuery {
    fn from(repr: RuleQueryRepr) -> Self {
        match repr {
            RuleQueryRepr::Text(text) => Self::pattern(text),
            RuleQueryRepr::Tagged { language, text } => Self { language, text },
        }
    }
}
