//! 패턴 쿼리 -- 인메모리 저장소가 실행하는 고정 형태 집계 쿼리
//!
//! 시작 노드 -[관계]-> 끝 노드 매칭, 그룹 기준 노드별 카운트, 임계값, 시간 창으로 구성됩니다.
//! 쿼리 텍스트는 YAML 또는 JSON입니다.
//!
//! ```yaml
//! match:
//!   start: { alias: ip, label: IP }
//!   rel: GENERATED
//!   end: { alias: e, label: Event, where: { class_uid: "3002" } }
//! group_by: ip
//! count_gt: 5
//! within_secs: 3600
//! count_as: attempts
//! ```

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use graphwarden_core::types::{FieldMap, FieldValue};
use serde::{Deserialize, Deserializer};

use crate::model::{Node, NodeKey, NodeLabel, QueryRow, RelKey, RelType, RowValue};

/// 패턴 쿼리 언어 태그
pub const PATTERN_LANGUAGE: &str = "pattern";

/// 패턴 쿼리 해석 에러
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    /// YAML/JSON 구문 또는 필드 오류
    #[error("invalid pattern query: {0}")]
    Syntax(String),

    /// 별칭 규칙 위반
    #[error("invalid alias: {0}")]
    Alias(String),
}

/// 노드 패턴
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodePattern {
    pub alias: String,
    #[serde(deserialize_with = "label_by_name")]
    pub label: NodeLabel,
    /// 속성 동등 조건
    #[serde(default, rename = "where")]
    pub filter: FieldMap,
}

/// `start -[rel]-> end` 매칭 절
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchClause {
    pub start: NodePattern,
    #[serde(deserialize_with = "rel_by_name")]
    pub rel: RelType,
    pub end: NodePattern,
}

/// 패턴 쿼리
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternQuery {
    #[serde(rename = "match")]
    pub pattern: MatchClause,
    /// 그룹 기준 별칭 (기본: 시작 노드)
    #[serde(default)]
    pub group_by: Option<String>,
    /// 매칭 수가 이 값보다 큰 그룹만 반환
    #[serde(default)]
    pub count_gt: u64,
    /// 관계 `time` 기준 시간 창
    #[serde(default)]
    pub within_secs: Option<u64>,
    #[serde(default)]
    pub limit: Option<usize>,
    /// 카운트 컬럼 이름
    #[serde(default = "default_count_as")]
    pub count_as: String,
}

fn default_count_as() -> String {
    "count".to_owned()
}

/// 레이블 이름을 해석합니다. 알 수 없는 이름은 쿼리 오류입니다.
fn label_by_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NodeLabel, D::Error> {
    let name = String::deserialize(deserializer)?;
    NodeLabel::from_name(&name)
        .ok_or_else(|| serde::de::Error::custom(format!("unknown node label '{name}'")))
}

fn rel_by_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RelType, D::Error> {
    let name = String::deserialize(deserializer)?;
    RelType::from_name(&name)
        .ok_or_else(|| serde::de::Error::custom(format!("unknown relationship type '{name}'")))
}

impl PatternQuery {
    /// 쿼리 텍스트를 해석하고 별칭 규칙을 검증합니다.
    pub fn parse(text: &str) -> Result<Self, PatternError> {
        let query: Self =
            serde_yaml::from_str(text).map_err(|e| PatternError::Syntax(e.to_string()))?;
        query.validate()?;
        Ok(query)
    }

    fn validate(&self) -> Result<(), PatternError> {
        let start = self.pattern.start.alias.trim();
        let end = self.pattern.end.alias.trim();
        if start.is_empty() || end.is_empty() {
            return Err(PatternError::Alias("aliases must not be empty".to_owned()));
        }
        if start == end {
            return Err(PatternError::Alias(format!(
                "start and end share alias '{start}'"
            )));
        }
        if let Some(group) = &self.group_by {
            if group != start && group != end {
                return Err(PatternError::Alias(format!(
                    "group_by '{group}' is not a matched alias"
                )));
            }
        }
        let count_as = self.count_as.trim();
        if count_as.is_empty() || count_as == start || count_as == end {
            return Err(PatternError::Alias(format!(
                "count_as '{count_as}' must be a fresh column name"
            )));
        }
        Ok(())
    }

    fn group_alias(&self) -> &str {
        self.group_by
            .as_deref()
            .unwrap_or(&self.pattern.start.alias)
    }

    /// 그래프 스냅샷에 대해 쿼리를 실행합니다.
    pub(crate) fn execute<'a>(
        &self,
        nodes: &HashMap<NodeKey, FieldMap>,
        relationships: impl Iterator<Item = (&'a RelKey, &'a FieldMap)>,
        now: DateTime<Utc>,
    ) -> Vec<QueryRow> {
        let (start_label, rel, end_label) = (
            self.pattern.start.label,
            self.pattern.rel,
            self.pattern.end.label,
        );
        let group_on_start = self.group_alias() == self.pattern.start.alias;
        let horizon = self
            .within_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .map(|secs| now - Duration::seconds(secs));

        let mut counts: BTreeMap<&NodeKey, u64> = BTreeMap::new();
        for (key, props) in relationships {
            if key.rel != rel || key.from.label != start_label || key.to.label != end_label {
                continue;
            }
            if let Some(horizon) = horizon {
                if !relationship_time(props).is_some_and(|t| t >= horizon) {
                    continue;
                }
            }
            let (Some(from), Some(to)) = (nodes.get(&key.from), nodes.get(&key.to)) else {
                continue;
            };
            if !matches(from, &self.pattern.start.filter) || !matches(to, &self.pattern.end.filter) {
                continue;
            }
            let group = if group_on_start { &key.from } else { &key.to };
            *counts.entry(group).or_default() += 1;
        }

        let mut groups: Vec<(&NodeKey, u64)> = counts
            .into_iter()
            .filter(|(_, count)| *count > self.count_gt)
            .collect();
        groups.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        if let Some(limit) = self.limit {
            groups.truncate(limit);
        }

        let alias = self.group_alias();
        groups
            .into_iter()
            .map(|(key, count)| {
                let node = Node {
                    id: key.clone(),
                    properties: nodes.get(key).cloned().unwrap_or_default(),
                };
                let mut row = QueryRow::new();
                row.insert(alias.to_owned(), RowValue::Node(node));
                row.insert(
                    self.count_as.clone(),
                    RowValue::Scalar(FieldValue::Integer(i64::try_from(count).unwrap_or(i64::MAX))),
                );
                row
            })
            .collect()
    }
}

fn relationship_time(props: &FieldMap) -> Option<DateTime<Utc>> {
    props
        .get("time")
        .and_then(FieldValue::as_str)
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// 노드 속성이 모든 조건과 같은지 확인합니다. 스칼라는 문자열 표현으로 비교합니다.
fn matches(props: &FieldMap, filter: &FieldMap) -> bool {
    filter.iter().all(|(key, expected)| {
        props.get(key).is_some_and(|actual| {
            match (actual.render(), expected.render()) {
                (Some(a), Some(e)) => a == e,
                _ => actual == expected,
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAILED_AUTH: &str = r#"
match:
  start: { alias: ip, label: IP }
  rel: GENERATED
  end: { alias: e, label: Event, where: { class_uid: "3002" } }
count_gt: 1
count_as: attempts
"#;

    fn graph() -> (HashMap<NodeKey, FieldMap>, BTreeMap<RelKey, FieldMap>) {
        let mut nodes = HashMap::new();
        let mut rels = BTreeMap::new();
        let attacker = NodeKey::new(NodeLabel::Ip, "192.168.1.100");
        let other = NodeKey::new(NodeLabel::Ip, "10.0.0.9");
        nodes.insert(attacker.clone(), FieldMap::new());
        nodes.insert(other.clone(), FieldMap::new());

        for (i, src) in [&attacker, &attacker, &attacker, &other].into_iter().enumerate() {
            let event = NodeKey::new(NodeLabel::Event, format!("e{i}"));
            let mut props = FieldMap::new();
            props.insert("class_uid".into(), "3002".into());
            nodes.insert(event.clone(), props);
            let mut rel_props = FieldMap::new();
            rel_props.insert("time".into(), "2024-01-15T12:00:00Z".into());
            rels.insert(
                RelKey {
                    from: src.clone(),
                    rel: RelType::Generated,
                    to: event,
                },
                rel_props,
            );
        }
        (nodes, rels)
    }

    fn now() -> DateTime<Utc> {
        "2024-01-15T12:30:00Z".parse().unwrap()
    }

    #[test]
    fn groups_and_thresholds() {
        let (nodes, rels) = graph();
        let query = PatternQuery::parse(FAILED_AUTH).unwrap();
        let rows = query.execute(&nodes, rels.iter(), now());
        assert_eq!(rows.len(), 1);
        match &rows[0]["ip"] {
            RowValue::Node(node) => assert_eq!(node.id.key, "192.168.1.100"),
            other => panic!("unexpected cell: {other:?}"),
        }
        assert_eq!(rows[0]["attempts"], RowValue::Scalar(FieldValue::Integer(3)));
    }

    #[test]
    fn time_window_excludes_old_relationships() {
        let (nodes, rels) = graph();
        let text = format!("{FAILED_AUTH}within_secs: 600\n");
        let query = PatternQuery::parse(&text).unwrap();
        assert!(query.execute(&nodes, rels.iter(), now()).is_empty());

        let text = format!("{FAILED_AUTH}within_secs: 3600\n");
        let query = PatternQuery::parse(&text).unwrap();
        assert_eq!(query.execute(&nodes, rels.iter(), now()).len(), 1);
    }

    #[test]
    fn json_syntax_is_accepted() {
        let query = PatternQuery::parse(
            r#"{"match": {"start": {"alias": "ip", "label": "IP"}, "rel": "GENERATED", "end": {"alias": "e", "label": "Event"}}, "group_by": "e"}"#,
        )
        .unwrap();
        assert_eq!(query.group_alias(), "e");
        assert_eq!(query.count_as, "count");
        let (nodes, rels) = graph();
        assert_eq!(query.execute(&nodes, rels.iter(), now()).len(), 4);
    }

    #[test]
    fn unknown_label_or_relationship_is_rejected() {
        let err = PatternQuery::parse(&FAILED_AUTH.replace("label: IP", "label: Container"))
            .unwrap_err();
        assert!(matches!(err, PatternError::Syntax(_)));
        assert!(err.to_string().contains("unknown node label 'Container'"));

        let err = PatternQuery::parse(&FAILED_AUTH.replace("GENERATED", "GENERATD")).unwrap_err();
        assert!(err.to_string().contains("unknown relationship type 'GENERATD'"));

        // 이름은 대소문자를 구분하지 않는다
        let query = PatternQuery::parse(&FAILED_AUTH.replace("label: IP", "label: ip")).unwrap();
        assert_eq!(query.pattern.start.label, NodeLabel::Ip);
    }

    #[test]
    fn invalid_queries_are_rejected() {
        assert!(matches!(
            PatternQuery::parse("MATCH (n) RETURN n"),
            Err(PatternError::Syntax(_))
        ));
        assert!(matches!(
            PatternQuery::parse(&FAILED_AUTH.replace("alias: e", "alias: ip")),
            Err(PatternError::Alias(_))
        ));
        assert!(matches!(
            PatternQuery::parse(&format!("{FAILED_AUTH}group_by: user\n")),
            Err(PatternError::Alias(_))
        ));
        assert!(matches!(
            PatternQuery::parse(&format!("{FAILED_AUTH}bogus: 1\n")),
            Err(PatternError::Syntax(_))
        ));
    }

    #[test]
    fn where_compares_rendered_scalars() {
        let mut props = FieldMap::new();
        props.insert("class_uid".into(), "3002".into());
        let mut filter = FieldMap::new();
        filter.insert("class_uid".into(), FieldValue::Integer(3002));
        assert!(matches(&props, &filter));
        filter.insert("missing".into(), "x".into());
        assert!(!matches(&props, &filter));
    }
}
