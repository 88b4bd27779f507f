//! OCSF 매퍼 -- 포맷별 [`FieldMap`]을 [`CanonicalEvent`]로 변환
//!
//! 포맷마다 정적 매핑 테이블을 가진 하위 모듈이 [`Draft`] 문서를 채우고,
//! 공통 마무리 단계에서 심각도 정책 적용 → 스키마 검증 → 타입 변환을 수행합니다.
//! 매핑되지 않은 원본 필드는 `extensions`에 그대로 보존됩니다.
//!
//! 같은 입력은 항상 같은 결과를 만듭니다. 단, 타임스탬프가 없는 Syslog 레코드는
//! 수집 시각을 사용하므로 `time`만 달라질 수 있습니다.

mod cef;
mod leef;
mod native;
mod syslog;
mod time;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use graphwarden_core::error::{ConfigError, FieldViolation, SchemaError};
use graphwarden_core::event::CanonicalEvent;
use graphwarden_core::types::{FieldMap, FieldValue, FormatTag, Severity};
use serde_json::{Map, Value};

use crate::schema::{CANONICAL_EVENT, SchemaRegistry};

pub(crate) use time::parse_time;

/// 범위 밖 심각도 처리 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SeverityPolicy {
    /// 가장 가까운 경계로 보정하고 경고를 남김
    #[default]
    Clamp,
    /// 스키마 위반으로 거부
    Reject,
}

impl SeverityPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clamp => "clamp",
            Self::Reject => "reject",
        }
    }
}

impl FromStr for SeverityPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "clamp" => Ok(Self::Clamp),
            "reject" => Ok(Self::Reject),
            other => Err(ConfigError::InvalidValue {
                field: "schema.severity_policy".to_owned(),
                reason: format!("unknown policy '{other}', expected clamp or reject"),
            }),
        }
    }
}

impl fmt::Display for SeverityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 매핑 결과
#[derive(Debug, Clone, PartialEq)]
pub struct MappedEvent {
    /// 검증을 통과한 정규 이벤트
    pub event: CanonicalEvent,
    /// 원본 포맷
    pub format: FormatTag,
    /// 치명적이지 않은 경고 (심각도 보정, 잘못된 IP 등)
    pub warnings: Vec<String>,
}

/// OCSF 매퍼
#[derive(Debug, Clone)]
pub struct OcsfMapper {
    registry: SchemaRegistry,
    policy: SeverityPolicy,
}

impl OcsfMapper {
    pub fn new(registry: SchemaRegistry, policy: SeverityPolicy) -> Self {
        Self { registry, policy }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn policy(&self) -> SeverityPolicy {
        self.policy
    }

    /// 필드 맵을 정규 이벤트로 변환하고 검증합니다.
    ///
    /// 필수 필드 누락, 타입 불일치, (Reject 정책에서) 범위 밖 심각도는
    /// 위반 필드를 모두 담은 [`SchemaError::Violation`]이 됩니다.
    pub fn map(&self, fields: FieldMap, format: FormatTag) -> Result<MappedEvent, SchemaError> {
        let mut draft = Draft::default();
        match format {
            FormatTag::Native => native::map(fields, &mut draft),
            FormatTag::Syslog => syslog::map(fields, &mut draft),
            FormatTag::Cef => cef::map(fields, &mut draft),
            FormatTag::Leef => leef::map(fields, &mut draft),
        }
        if format != FormatTag::Native {
            draft.set("metadata.version", self.registry.version());
        }
        let (event, warnings) = draft.finish(&self.registry, self.policy)?;

        for warning in &warnings {
            tracing::debug!(format = %format, warning = %warning, "mapping warning");
        }

        Ok(MappedEvent {
            event,
            format,
            warnings,
        })
    }
}

/// 매핑 중인 정규 이벤트 초안
///
/// 검증 전 단계이므로 값은 JSON 그대로 보관합니다.
/// 타입이 맞지 않는 값도 넣어 두고 스키마 검증이 위반으로 보고하게 합니다.
#[derive(Debug, Default)]
pub(crate) struct Draft {
    doc: Map<String, Value>,
    extensions: FieldMap,
    severity: Option<FieldValue>,
    resources: Vec<Value>,
    warnings: Vec<String>,
}

impl Draft {
    /// 점 표기 경로에 값을 설정합니다. 중간 객체는 필요하면 생성합니다.
    pub(crate) fn set(&mut self, path: &str, value: impl Into<Value>) {
        let mut segments = path.split('.').peekable();
        let mut current = &mut self.doc;
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                current.insert(segment.to_owned(), value.into());
                return;
            }
            let entry = current
                .entry(segment.to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Value::Object(next) = entry else {
                return;
            };
            current = next;
        }
    }

    pub(crate) fn has(&self, path: &str) -> bool {
        let mut current = &self.doc;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            match current.get(segment) {
                Some(Value::Object(next)) if segments.peek().is_some() => current = next,
                Some(_) if segments.peek().is_none() => return true,
                _ => return false,
            }
        }
        false
    }

    /// 스칼라 값을 문자열로 설정하고, 설정했는지 반환합니다.
    ///
    /// 빈 문자열이나 구조화된 값은 경고와 함께 `extensions[key]`에 보존합니다.
    pub(crate) fn set_text(&mut self, path: &str, key: &str, value: Option<FieldValue>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match value.render().filter(|text| !text.trim().is_empty()) {
            Some(text) => {
                self.set(path, text);
                true
            }
            None => {
                self.warn(format!(
                    "'{key}' has no usable {} value, kept in extensions",
                    value.type_name()
                ));
                self.extensions.insert(key.to_owned(), value);
                false
            }
        }
    }

    /// 여러 후보 키 중 처음 존재하는 값을 문자열로 설정합니다.
    pub(crate) fn set_text_first(&mut self, path: &str, fields: &mut FieldMap, keys: &[&str]) -> bool {
        match take_first_entry(fields, keys) {
            Some((key, value)) => self.set_text(path, key, Some(value)),
            None => false,
        }
    }

    /// 원본 값을 그대로 설정합니다 (네이티브 매핑용).
    pub(crate) fn set_raw(&mut self, path: &str, value: FieldValue) {
        self.set(path, value.to_json());
    }

    /// 시각 필드를 RFC 3339로 설정합니다.
    ///
    /// 해석할 수 없는 값은 원문 그대로 넣어 스키마 검증이 보고하게 합니다.
    pub(crate) fn set_time(&mut self, value: Option<FieldValue>, java_format: Option<&str>) {
        let Some(value) = value else {
            return;
        };
        match parse_time(&value, java_format) {
            Some(time) => self.set("time", format_time(time)),
            None => self.set_raw("time", value),
        }
    }

    /// IP 주소를 설정합니다. 주소가 아니면 경고와 함께 `extensions`에 보존합니다.
    pub(crate) fn set_ip(&mut self, path: &str, key: &str, value: Option<FieldValue>) {
        let Some(value) = value else {
            return;
        };
        let parsed = value
            .as_str()
            .and_then(|s| s.trim().parse::<std::net::IpAddr>().ok());
        match parsed {
            Some(ip) => self.set(path, ip.to_string()),
            None => {
                self.warn(format!("'{key}' is not an IP address, kept in extensions"));
                self.extensions.insert(key.to_owned(), value);
            }
        }
    }

    /// 포트를 설정합니다. 0–65535 정수가 아니면 경고와 함께 `extensions`에 보존합니다.
    pub(crate) fn set_port(&mut self, path: &str, key: &str, value: Option<FieldValue>) {
        let Some(value) = value else {
            return;
        };
        match value.as_i64().and_then(|n| u16::try_from(n).ok()) {
            Some(port) => self.set(path, port),
            None => {
                self.warn(format!("'{key}' is not a valid port, kept in extensions"));
                self.extensions.insert(key.to_owned(), value);
            }
        }
    }

    /// 심각도 원본 값을 기록합니다. 정책은 마무리 단계에서 적용됩니다.
    pub(crate) fn set_severity(&mut self, value: Option<FieldValue>) {
        if value.is_some() {
            self.severity = value;
        }
    }

    /// 리소스를 추가합니다. 빈 속성은 생략합니다.
    pub(crate) fn push_resource(&mut self, kind: &str, name: Option<String>, path: Option<String>) {
        let mut resource = Map::new();
        resource.insert("type".to_owned(), Value::from(kind));
        if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
            resource.insert("name".to_owned(), Value::from(name));
        }
        if let Some(path) = path.filter(|p| !p.trim().is_empty()) {
            resource.insert("path".to_owned(), Value::from(path));
        }
        if resource.len() > 1 {
            self.resources.push(Value::Object(resource));
        }
    }

    /// 원본 리소스 목록을 그대로 추가합니다.
    pub(crate) fn push_raw_resources(&mut self, value: FieldValue) {
        match value {
            FieldValue::List(items) => self
                .resources
                .extend(items.iter().map(FieldValue::to_json)),
            other => self.set_raw("resources", other),
        }
    }

    pub(crate) fn extend(&mut self, fields: FieldMap) {
        self.extensions.extend(fields);
    }

    pub(crate) fn extension(&mut self, key: &str, value: FieldValue) {
        self.extensions.insert(key.to_owned(), value);
    }

    pub(crate) fn warn(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// 심각도 정책 적용, 스키마 검증, 정규 이벤트 변환
    fn finish(
        mut self,
        registry: &SchemaRegistry,
        policy: SeverityPolicy,
    ) -> Result<(CanonicalEvent, Vec<String>), SchemaError> {
        if let Some(raw) = self.severity.take() {
            let resolved = self.resolve_severity(raw, policy);
            self.set("severity", resolved);
        }
        if !self.resources.is_empty() && !self.doc.contains_key("resources") {
            let resources = std::mem::take(&mut self.resources);
            self.doc.insert("resources".to_owned(), Value::Array(resources));
        }
        if !self.extensions.is_empty() {
            let extensions = FieldValue::Map(std::mem::take(&mut self.extensions)).to_json();
            self.doc.insert("extensions".to_owned(), extensions);
        }

        let doc = Value::Object(self.doc);
        registry.validate(CANONICAL_EVENT, &doc)?;

        let event = serde_json::from_value::<CanonicalEvent>(doc).map_err(|e| {
            SchemaError::Violation {
                schema: CANONICAL_EVENT.to_owned(),
                violations: vec![FieldViolation {
                    field: "event".to_owned(),
                    reason: e.to_string(),
                }],
            }
        })?;
        Ok((event, self.warnings))
    }

    /// 숫자/레이블 심각도를 정책에 따라 결정합니다.
    ///
    /// 해석할 수 없는 값은 원본 그대로 반환하여 스키마 검증에서 타입 위반이 되게 합니다.
    fn resolve_severity(&mut self, raw: FieldValue, policy: SeverityPolicy) -> Value {
        let numeric = raw.as_i64().or_else(|| {
            raw.as_str()
                .and_then(Severity::from_label)
                .map(|s| i64::from(s.value()))
        });
        let Some(value) = numeric else {
            return raw.to_json();
        };
        match policy {
            SeverityPolicy::Clamp => {
                let (severity, adjusted) = Severity::clamped(value);
                if adjusted {
                    self.warn(format!(
                        "severity {value} out of range 0-10, clamped to {}",
                        severity.value()
                    ));
                }
                Value::from(severity.value())
            }
            SeverityPolicy::Reject => Value::from(value),
        }
    }
}

/// UTC 시각을 RFC 3339 문자열로 변환합니다.
pub(crate) fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// 여러 후보 키 중 처음 존재하는 값을 꺼냅니다.
pub(crate) fn take_first(fields: &mut FieldMap, keys: &[&str]) -> Option<FieldValue> {
    take_first_entry(fields, keys).map(|(_, value)| value)
}

/// 여러 후보 키 중 처음 존재하는 키와 값을 꺼냅니다.
pub(crate) fn take_first_entry<'k>(
    fields: &mut FieldMap,
    keys: &[&'k str],
) -> Option<(&'k str, FieldValue)> {
    keys.iter()
        .find_map(|key| fields.remove(*key).map(|value| (*key, value)))
}

/// 값을 비어 있지 않은 문자열로 꺼냅니다.
///
/// 빈 문자열이나 구조화된 값은 그대로 남겨 `extensions`로 가게 합니다.
pub(crate) fn take_text(fields: &mut FieldMap, key: &str) -> Option<String> {
    let value = fields.remove(key)?;
    match value.render().filter(|text| !text.trim().is_empty()) {
        Some(text) => Some(text),
        None => {
            fields.insert(key.to_owned(), value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper(policy: SeverityPolicy) -> OcsfMapper {
        OcsfMapper::new(SchemaRegistry::new("1.0.0"), policy)
    }

    fn native(json: serde_json::Value) -> FieldMap {
        match FieldValue::from_json(json) {
            Some(FieldValue::Map(map)) => map,
            _ => panic!("expected object"),
        }
    }

    fn base() -> serde_json::Value {
        serde_json::json!({
            "class_uid": "3002",
            "time": "2024-01-15T12:00:00Z",
            "metadata": {"version": "1.0.0", "product": {"name": "okta"}}
        })
    }

    #[test]
    fn severity_policy_from_str() {
        assert_eq!("clamp".parse::<SeverityPolicy>().unwrap(), SeverityPolicy::Clamp);
        assert_eq!("REJECT".parse::<SeverityPolicy>().unwrap(), SeverityPolicy::Reject);
        assert!("ignore".parse::<SeverityPolicy>().is_err());
        assert_eq!(SeverityPolicy::default(), SeverityPolicy::Clamp);
    }

    #[test]
    fn clamp_policy_bounds_severity_with_warning() {
        let mut json = base();
        json["severity"] = 42.into();
        let mapped = mapper(SeverityPolicy::Clamp)
            .map(native(json), FormatTag::Native)
            .unwrap();
        assert_eq!(mapped.event.severity, Severity::new(10));
        assert_eq!(mapped.warnings.len(), 1);
        assert!(mapped.warnings[0].contains("clamped"));
    }

    #[test]
    fn reject_policy_reports_severity_violation() {
        let mut json = base();
        json["severity"] = (-3).into();
        let err = mapper(SeverityPolicy::Reject)
            .map(native(json), FormatTag::Native)
            .unwrap_err();
        assert_eq!(err.violations().len(), 1);
        assert_eq!(err.violations()[0].field, "severity");
    }

    #[test]
    fn severity_labels_are_recognized() {
        let mut json = base();
        json["severity"] = "High".into();
        let mapped = mapper(SeverityPolicy::Reject)
            .map(native(json), FormatTag::Native)
            .unwrap();
        assert_eq!(mapped.event.severity, Severity::new(7));
    }

    #[test]
    fn non_numeric_severity_is_a_violation_under_both_policies() {
        for policy in [SeverityPolicy::Clamp, SeverityPolicy::Reject] {
            let mut json = base();
            json["severity"] = "urgent".into();
            let err = mapper(policy).map(native(json), FormatTag::Native).unwrap_err();
            assert_eq!(err.violations()[0].field, "severity", "policy {policy}");
        }
    }

    #[test]
    fn missing_required_fields_are_all_reported() {
        let fields = native(serde_json::json!({"message": "hello"}));
        let err = mapper(SeverityPolicy::Clamp)
            .map(fields, FormatTag::Native)
            .unwrap_err();
        let fields: Vec<&str> = err.violations().iter().map(|v| v.field.as_str()).collect();
        assert!(fields.contains(&"class_uid"));
        assert!(fields.contains(&"time"));
        assert!(fields.contains(&"metadata"));
        assert!(fields.contains(&"metadata.product.name"));
    }

    #[test]
    fn draft_set_creates_nested_objects() {
        let mut draft = Draft::default();
        draft.set("metadata.product.name", "sshd");
        draft.set("metadata.version", "1.0.0");
        assert!(draft.has("metadata.product.name"));
        assert!(draft.has("metadata.product"));
        assert!(!draft.has("metadata.vendor_name"));
        assert_eq!(draft.doc["metadata"]["product"]["name"], "sshd");
    }

    #[test]
    fn invalid_ip_and_port_move_to_extensions() {
        let mut draft = Draft::default();
        draft.set_ip("src.ip", "src", Some("not-an-ip".into()));
        draft.set_port("src.port", "spt", Some(FieldValue::Integer(70000)));
        draft.set_ip("dst.ip", "dst", Some("::1".into()));
        assert_eq!(draft.warnings.len(), 2);
        assert_eq!(draft.extensions["src"].as_str(), Some("not-an-ip"));
        assert_eq!(draft.extensions["spt"], FieldValue::Integer(70000));
        assert_eq!(draft.doc["dst"]["ip"], "::1");
    }

    #[test]
    fn take_text_keeps_structured_values() {
        let mut fields = FieldMap::new();
        fields.insert("a".into(), FieldValue::Integer(5));
        fields.insert("b".into(), FieldValue::List(vec![]));
        assert_eq!(take_text(&mut fields, "a").as_deref(), Some("5"));
        assert_eq!(take_text(&mut fields, "b"), None);
        assert!(fields.contains_key("b"));
        fields.insert("c".into(), "  ".into());
        assert_eq!(take_text(&mut fields, "c"), None);
        assert!(fields.contains_key("c"));
    }

    #[test]
    fn set_text_keeps_unusable_values_in_extensions() {
        let mut draft = Draft::default();
        assert!(draft.set_text("principal.name", "suser", Some("alice".into())));
        assert!(!draft.set_text("src.hostname", "shost", Some("".into())));
        assert!(!draft.set_text("message", "msg", Some(FieldValue::List(vec!["x".into()]))));
        assert!(!draft.set_text("dst.hostname", "dhost", None));

        assert_eq!(draft.doc["principal"]["name"], "alice");
        assert!(!draft.has("src.hostname"));
        assert!(!draft.has("message"));
        assert_eq!(draft.extensions["shost"].as_str(), Some(""));
        assert_eq!(draft.extensions["msg"], FieldValue::List(vec!["x".into()]));
        assert_eq!(draft.warnings.len(), 2);
        assert!(!draft.extensions.contains_key("dhost"));
    }

    #[test]
    fn set_text_first_reports_the_matched_key() {
        let mut fields = FieldMap::new();
        fields.insert("message".into(), FieldValue::Map(FieldMap::new()));
        let mut draft = Draft::default();
        assert!(!draft.set_text_first("message", &mut fields, &["msg", "message"]));
        assert!(draft.extensions.contains_key("message"));
        assert!(fields.is_empty());
    }
}
