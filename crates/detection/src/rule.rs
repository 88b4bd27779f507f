//! 탐지 룰 데이터 타입
//!
//! 룰 파일과 룰 저장소 API에서 쓰이는 구조체들을 정의합니다.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use graphwarden_core::error::RuleError;
use graphwarden_core::event::RuleQuery;
use graphwarden_core::types::Severity;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// 룰 ID 최대 길이
pub const MAX_RULE_ID_LEN: usize = 256;

static LANGUAGE_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_-]+$"));

static TECHNIQUE_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^T\d{4}(\.\d{3})?$"));

fn matches(pattern: &LazyLock<Result<Regex, regex::Error>>, value: &str) -> bool {
    pattern.as_ref().is_ok_and(|re| re.is_match(value))
}

/// 탐지 룰
///
/// # 파일 형식
/// ```yaml
/// rule_id: RULE-BRUTE-01
/// name: Brute force from single IP
/// severity: 8
/// query:
///   language: pattern
///   text: |
///     match:
///       start: { alias: ip, label: IP }
///       rel: GENERATED
///       end: { alias: e, label: Event, where: { class_uid: "3002" } }
///     count_gt: 5
///     within_secs: 3600
/// tags: [authentication]
/// mitre_techniques: [T1110]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub rule_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub severity: Severity,
    /// 그래프 저장소에 그대로 전달되는 쿼리
    pub query: RuleQuery,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub mitre_techniques: BTreeSet<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Rule {
    /// 룰의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.rule_id.trim().is_empty() {
            return Err(invalid("(empty)", "rule id must not be empty"));
        }

        if self.rule_id.len() > MAX_RULE_ID_LEN {
            return Err(invalid(
                &self.rule_id,
                format!("rule id must not exceed {MAX_RULE_ID_LEN} characters"),
            ));
        }

        if self.name.trim().is_empty() {
            return Err(invalid(&self.rule_id, "rule name must not be empty"));
        }

        if self.query.text.trim().is_empty() {
            return Err(invalid(&self.rule_id, "query text must not be empty"));
        }

        if !matches(&LANGUAGE_PATTERN, &self.query.language) {
            return Err(invalid(
                &self.rule_id,
                format!("invalid query language '{}'", self.query.language),
            ));
        }

        if let Some(technique) = self
            .mitre_techniques
            .iter()
            .find(|t| !matches(&TECHNIQUE_PATTERN, t))
        {
            return Err(invalid(
                &self.rule_id,
                format!("invalid MITRE technique id '{technique}'"),
            ));
        }

        Ok(())
    }

    /// 태그 포함 여부
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

fn invalid(rule_id: &str, reason: impl Into<String>) -> RuleError {
    RuleError::Validation {
        rule_id: rule_id.to_owned(),
        reason: reason.into(),
    }
}

/// ID가 없는 룰 입력 (생성/수정 요청)
///
/// 심각도는 검증 전의 정수로 받습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub severity: i64,
    pub query: RuleQuery,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub mitre_techniques: BTreeSet<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl RuleDraft {
    /// 주어진 ID로 검증된 룰을 만듭니다.
    pub fn into_rule(self, rule_id: impl Into<String>) -> Result<Rule, RuleError> {
        let rule_id = rule_id.into();
        let severity = Severity::new(self.severity).ok_or_else(|| {
            invalid(
                &rule_id,
                format!("severity must be within 0-10, got {}", self.severity),
            )
        })?;
        let rule = Rule {
            rule_id,
            name: self.name,
            description: self.description,
            severity,
            query: self.query,
            tags: self.tags,
            mitre_techniques: self.mitre_techniques,
            enabled: self.enabled,
        };
        rule.validate()?;
        Ok(rule)
    }
}

impl From<Rule> for RuleDraft {
    fn from(rule: Rule) -> Self {
        Self {
            name: rule.name,
            description: rule.description,
            severity: i64::from(rule.severity.value()),
            query: rule.query,
            tags: rule.tags,
            mitre_techniques: rule.mitre_techniques,
            enabled: rule.enabled,
        }
    }
}

/// 룰 파일의 한 항목
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RuleRecord {
    pub rule_id: String,
    #[serde(flatten)]
    pub draft: RuleDraft,
}

impl RuleRecord {
    pub fn into_rule(self) -> Result<Rule, RuleError> {
        self.draft.into_rule(self.rule_id)
    }
}

/// 룰 목록 필터
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleFilter {
    pub enabled: Option<bool>,
    pub tag: Option<String>,
}

impl RuleFilter {
    pub fn matches(&self, rule: &Rule) -> bool {
        self.enabled.is_none_or(|enabled| rule.enabled == enabled)
            && self.tag.as_deref().is_none_or(|tag| rule.has_tag(tag))
    }
}

#[cfg(test)]
mod tests {
    use graphwarden_core::error::ErrorKind;

    use super::*;

    fn draft() -> RuleDraft {
        RuleDraft {
            name: "Brute force".to_owned(),
            description: String::new(),
            severity: 8,
            query: RuleQuery::pattern("match: {}"),
            tags: BTreeSet::from(["authentication".to_owned()]),
            mitre_techniques: BTreeSet::from(["T1110".to_owned(), "T1110.001".to_owned()]),
            enabled: true,
        }
    }

    #[test]
    fn valid_draft_becomes_rule() {
        let rule = draft().into_rule("RULE-1").unwrap();
        assert_eq!(rule.severity.value(), 8);
        assert!(rule.has_tag("authentication"));
    }

    #[test]
    fn severity_out_of_range_is_invalid() {
        let mut d = draft();
        d.severity = 11;
        let err = d.into_rule("RULE-1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRule);
    }

    #[test]
    fn empty_id_and_name_are_rejected() {
        assert!(draft().into_rule("  ").is_err());
        let mut d = draft();
        d.name = String::new();
        assert!(d.into_rule("RULE-1").is_err());
    }

    #[test]
    fn long_id_is_rejected() {
        assert!(draft().into_rule("R".repeat(MAX_RULE_ID_LEN + 1)).is_err());
    }

    #[test]
    fn query_language_must_be_identifier() {
        let mut d = draft();
        d.query.language = "Cypher Query".to_owned();
        assert!(d.into_rule("RULE-1").is_err());

        let mut d = draft();
        d.query.language = "cypher".to_owned();
        assert!(d.into_rule("RULE-1").is_ok());
    }

    #[test]
    fn empty_query_is_rejected() {
        let mut d = draft();
        d.query = RuleQuery::pattern("   ");
        assert!(d.into_rule("RULE-1").is_err());
    }

    #[test]
    fn technique_ids_are_checked() {
        for bad in ["T111", "t1110", "T1110.1", "TA0001"] {
            let mut d = draft();
            d.mitre_techniques = BTreeSet::from([bad.to_owned()]);
            assert!(d.into_rule("RULE-1").is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn record_deserializes_bare_query_string() {
        let record: RuleRecord = serde_json::from_str(
            r#"{"rule_id": "RULE-2", "name": "n", "severity": 3, "query": "match: {}"}"#,
        )
        .unwrap();
        let rule = record.into_rule().unwrap();
        assert!(rule.enabled);
        assert_eq!(rule.query.language, "pattern");
    }

    #[test]
    fn filter_by_enabled_and_tag() {
        let rule = draft().into_rule("RULE-1").unwrap();
        assert!(RuleFilter::default().matches(&rule));
        assert!(
            RuleFilter {
                enabled: Some(true),
                tag: Some("authentication".to_owned())
            }
            .matches(&rule)
        );
        assert!(
            !RuleFilter {
                enabled: Some(false),
                tag: None
            }
            .matches(&rule)
        );
        assert!(
            !RuleFilter {
                enabled: None,
                tag: Some("network".to_owned())
            }
            .matches(&rule)
        );
    }
}
