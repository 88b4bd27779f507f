//! 도메인 타입 -- 필드 값, 심각도, 입력 포맷 태그
//!
//! 파서가 만드는 중간 표현([`FieldMap`])과 정규 이벤트가 공유하는
//! 작은 닫힌 값 집합을 정의합니다.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 문자열 키 → [`FieldValue`] 순서 보장 맵
pub type FieldMap = BTreeMap<String, FieldValue>;

/// 필드 값
///
/// 동적 타입 대신 닫힌 variant 집합으로 확장 필드를 표현합니다.
/// JSON과는 `untagged` 형태로 자연스럽게 변환됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// 문자열
    String(String),
    /// 정수
    Integer(i64),
    /// 실수
    Float(f64),
    /// 불리언
    Bool(bool),
    /// 리스트
    List(Vec<FieldValue>),
    /// 중첩 맵
    Map(FieldMap),
}

impl FieldValue {
    /// 문자열 값이면 참조를 반환합니다.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// 정수 값을 반환합니다. 정수 형태의 문자열도 허용합니다.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            Self::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// 중첩 맵이면 참조를 반환합니다.
    pub fn as_map(&self) -> Option<&FieldMap> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// 스칼라 값을 문자열로 렌더링합니다. 리스트와 맵은 `None`.
    pub fn render(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Integer(n) => Some(n.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            Self::List(_) | Self::Map(_) => None,
        }
    }

    /// 값 종류 이름 (스키마 검증 메시지용)
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::List(_) => "list",
            Self::Map(_) => "object",
        }
    }

    /// JSON 값에서 변환합니다. `null`은 `None`이 되며 맵/리스트 내부의 `null`은 제거됩니다.
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(Self::Bool(b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Self::Integer(i)),
                None => n.as_f64().map(Self::Float),
            },
            serde_json::Value::String(s) => Some(Self::String(s)),
            serde_json::Value::Array(items) => Some(Self::List(
                items.into_iter().filter_map(Self::from_json).collect(),
            )),
            serde_json::Value::Object(obj) => Some(Self::Map(
                obj.into_iter()
                    .filter_map(|(k, v)| Self::from_json(v).map(|v| (k, v)))
                    .collect(),
            )),
        }
    }

    /// JSON 값으로 변환합니다.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Integer(n) => serde_json::Value::from(*n),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::List(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<FieldMap> for FieldValue {
    fn from(value: FieldMap) -> Self {
        Self::Map(value)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.render() {
            Some(s) => f.write_str(&s),
            None => write!(f, "{}", self.to_json()),
        }
    }
}

/// 점 표기 경로(`a.b.c`)로 중첩 필드를 조회합니다.
pub fn get_path<'a>(map: &'a FieldMap, path: &str) -> Option<&'a FieldValue> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = map.get(first)?;
    for segment in segments {
        current = current.as_map()?.get(segment)?;
    }
    Some(current)
}

/// 심각도 (0–10)
///
/// 0은 unknown, 10은 최고 심각도입니다.
/// 생성 시 범위를 강제하므로 값이 항상 0–10 사이에 있습니다.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "u8")]
pub struct Severity(u8);

impl Severity {
    /// 최소값
    pub const MIN: Severity = Severity(0);
    /// 최대값
    pub const MAX: Severity = Severity(10);

    /// 범위 내 값이면 `Some`을 반환합니다.
    pub fn new(value: i64) -> Option<Self> {
        if (0..=10).contains(&value) {
            Some(Self(value as u8))
        } else {
            None
        }
    }

    /// 범위 밖 값을 가장 가까운 경계로 보정합니다.
    ///
    /// 반환값의 `bool`은 보정이 일어났는지 여부입니다.
    pub fn clamped(value: i64) -> (Self, bool) {
        let bounded = value.clamp(0, 10);
        (Self(bounded as u8), bounded != value)
    }

    /// 레이블 문자열에서 심각도를 결정합니다. 대소문자 무시.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "unknown" => Some(Self(0)),
            "info" | "informational" => Some(Self(1)),
            "low" => Some(Self(3)),
            "medium" | "med" => Some(Self(5)),
            "high" => Some(Self(7)),
            "critical" | "crit" => Some(Self(9)),
            "fatal" => Some(Self(10)),
            _ => None,
        }
    }

    /// 숫자 값
    pub fn value(self) -> u8 {
        self.0
    }

    /// 사람이 읽을 수 있는 레이블
    pub fn label(self) -> &'static str {
        match self.0 {
            0 => "unknown",
            1..=2 => "info",
            3..=4 => "low",
            5..=6 => "medium",
            7..=8 => "high",
            _ => "critical",
        }
    }
}

impl TryFrom<i64> for Severity {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("severity {value} out of range 0-10"))
    }
}

impl From<Severity> for u8 {
    fn from(value: Severity) -> Self {
        value.0
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.label())
    }
}

/// 입력 포맷 태그
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatTag {
    /// 스키마 준수 JSON (OCSF)
    Native,
    /// Syslog (RFC 5424 / RFC 3164)
    Syslog,
    /// ArcSight Common Event Format
    Cef,
    /// IBM Log Event Extended Format
    Leef,
}

impl FormatTag {
    /// 지원하는 모든 포맷
    pub const ALL: [FormatTag; 4] = [Self::Native, Self::Syslog, Self::Cef, Self::Leef];

    /// 포맷 이름
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Syslog => "syslog",
            Self::Cef => "cef",
            Self::Leef => "leef",
        }
    }

    /// 소스 포맷 힌트를 해석합니다.
    ///
    /// `"raw"`, 빈 문자열, 알 수 없는 이름은 `None` (스니핑 필요)입니다.
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint.trim().to_lowercase().as_str() {
            "ocsf" | "native" => Some(Self::Native),
            "syslog" => Some(Self::Syslog),
            "cef" => Some(Self::Cef),
            "leef" => Some(Self::Leef),
            _ => None,
        }
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
