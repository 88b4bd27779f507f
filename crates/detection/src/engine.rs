//! 탐지 엔진 -- 활성 룰을 그래프에 질의하고 결과 행을 알림으로 만듭니다.
//!
//! # 실행 모델
//! - `run_all`은 `max_concurrent_rules` 크기의 세마포어로 동시 실행 수를 제한합니다.
//! - 룰마다 `rule_timeout`이 적용되며 만료되면 해당 룰만 실패합니다.
//! - 룰 하나의 실패는 배치를 중단하지 않고 [`DetectionReport::errors`]에 기록됩니다.
//!
//! # 룰 상태
//! `Idle -> Running -> {Completed, Failed} -> Idle`
//!
//! ```ignore
//! let engine = DetectionEngine::from_config(store, rules, &config.detection);
//! let report = engine.run_all().await;
//! for alert in &report.alerts {
//!     println!("{alert}");
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use graphwarden_core::config::DetectionConfig;
use graphwarden_core::error::{ErrorKind, RuleError, StorageError};
use graphwarden_core::event::{Alert, AlertEntity};
use graphwarden_core::metrics as m;
use graphwarden_core::types::FieldMap;
use graphwarden_graph::{AlertFilter, GraphStore, QueryRow, RowValue};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::dedup::DedupWindow;
use crate::rule::Rule;
use crate::store::RuleStore;

/// 룰 실행 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl RuleState {
    fn can_transition_to(self, next: RuleState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Completed, Self::Idle)
                | (Self::Failed, Self::Idle)
        )
    }
}

/// 룰별 실행 기록
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuleExecution {
    pub state: RuleState,
    /// 완료/실패로 끝난 실행 횟수
    pub runs: u64,
    /// 마지막 실행에서 저장된 알림 수
    pub last_alerts: usize,
    pub last_error: Option<String>,
    pub last_finished_at: Option<DateTime<Utc>>,
}

impl RuleExecution {
    /// 현재 상태를 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            RuleState::Idle => "idle",
            RuleState::Running => "running",
            RuleState::Completed => "completed",
            RuleState::Failed => "failed",
        }
    }

    fn transition(&mut self, next: RuleState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        true
    }
}

/// 룰 하나의 실패
#[derive(Debug)]
pub struct RuleFailure {
    pub rule_id: String,
    pub error: RuleError,
}

impl RuleFailure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

impl Serialize for RuleFailure {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        let mut state = serializer.serialize_struct("RuleFailure", 3)?;
        state.serialize_field("rule_id", &self.rule_id)?;
        state.serialize_field("kind", &self.error.kind())?;
        state.serialize_field("error", &self.error.to_string())?;
        state.end()
    }
}

/// 탐지 실행 결과
#[derive(Debug, Default, Serialize)]
pub struct DetectionReport {
    /// 저장된 알림
    pub alerts: Vec<Alert>,
    /// 룰별 실패
    pub errors: Vec<RuleFailure>,
    /// 실행한 룰 수 (실패 포함)
    pub rules_evaluated: usize,
    /// 중복 윈도우로 억제된 알림 수
    pub suppressed: usize,
}

impl DetectionReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

type Evaluation = (Rule, Result<Vec<Alert>, RuleError>, Duration);

/// 그래프 탐지 엔진
pub struct DetectionEngine<S: GraphStore> {
    store: Arc<S>,
    rules: Arc<RuleStore>,
    limiter: Arc<Semaphore>,
    rule_timeout: Duration,
    states: Mutex<HashMap<String, RuleExecution>>,
    dedup: Mutex<DedupWindow>,
}

impl<S: GraphStore> DetectionEngine<S> {
    pub fn new(
        store: Arc<S>,
        rules: Arc<RuleStore>,
        max_concurrent_rules: usize,
        rule_timeout: Duration,
        dedup_window: Duration,
    ) -> Self {
        Self {
            store,
            rules,
            limiter: Arc::new(Semaphore::new(max_concurrent_rules.max(1))),
            rule_timeout,
            states: Mutex::new(HashMap::new()),
            dedup: Mutex::new(DedupWindow::new(dedup_window)),
        }
    }

    pub fn from_config(store: Arc<S>, rules: Arc<RuleStore>, config: &DetectionConfig) -> Self {
        Self::new(
            store,
            rules,
            config.max_concurrent_rules,
            config.rule_timeout(),
            Duration::from_secs(config.dedup_window_secs),
        )
    }

    pub fn rules(&self) -> &Arc<RuleStore> {
        &self.rules
    }

    /// 모든 활성 룰을 실행합니다.
    pub async fn run_all(&self) -> DetectionReport {
        let snapshot = self.rules.enabled_snapshot().await;
        info!(rules = snapshot.len(), "detection run started");
        let report = self.execute(snapshot.iter().cloned().collect()).await;
        info!(
            rules = report.rules_evaluated,
            alerts = report.alerts.len(),
            errors = report.errors.len(),
            suppressed = report.suppressed,
            "detection run finished"
        );
        report
    }

    /// 룰 하나를 실행합니다.
    ///
    /// 비활성 룰은 빈 보고서를 반환합니다. 쿼리 실패는 `Err`가 아니라 보고서에 담깁니다.
    ///
    /// # Errors
    /// 존재하지 않는 룰이면 `RuleError::NotFound`
    pub async fn run(&self, rule_id: &str) -> Result<DetectionReport, RuleError> {
        let rule = self.rules.get(rule_id).await?;
        if !rule.enabled {
            debug!(rule_id, "rule disabled, skipping");
            return Ok(DetectionReport::default());
        }
        Ok(self.execute(vec![rule]).await)
    }

    /// 룰 실행 기록을 반환합니다. 한 번도 실행되지 않았으면 `None`.
    pub async fn rule_state(&self, rule_id: &str) -> Option<RuleExecution> {
        self.states.lock().await.get(rule_id).cloned()
    }

    /// 저장된 알림을 최신순으로 조회합니다.
    pub async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>, StorageError> {
        self.store.list_alerts(filter).await
    }

    async fn execute(&self, rules: Vec<Rule>) -> DetectionReport {
        self.dedup.lock().await.purge();

        let mut report = DetectionReport::default();
        let mut tasks: JoinSet<Evaluation> = JoinSet::new();

        for rule in rules {
            if !self.begin(&rule.rule_id).await {
                debug!(rule_id = %rule.rule_id, "rule already running, skipping");
                continue;
            }

            let store = Arc::clone(&self.store);
            let limiter = Arc::clone(&self.limiter);
            let timeout = self.rule_timeout;
            tasks.spawn(async move {
                // 허가 대기 시간은 룰 타임아웃에 포함하지 않음
                let _permit = match limiter.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        let error = RuleError::Query {
                            rule_id: rule.rule_id.clone(),
                            reason: format!("rule limiter closed: {e}"),
                        };
                        return (rule, Err(error), Duration::ZERO);
                    }
                };
                let started = Instant::now();
                let outcome = evaluate(store.as_ref(), &rule, timeout).await;
                (rule, outcome, started.elapsed())
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((rule, outcome, elapsed)) => {
                    self.finish(rule, outcome, elapsed, &mut report).await;
                }
                Err(e) => {
                    // panic = "abort"이므로 취소된 경우만 해당
                    error!(error = %e, "rule task did not complete");
                    report.errors.push(RuleFailure {
                        rule_id: "<unknown>".to_owned(),
                        error: RuleError::Query {
                            rule_id: "<unknown>".to_owned(),
                            reason: e.to_string(),
                        },
                    });
                }
            }
        }
        report
    }

    async fn begin(&self, rule_id: &str) -> bool {
        let mut states = self.states.lock().await;
        states
            .entry(rule_id.to_owned())
            .or_default()
            .transition(RuleState::Running)
    }

    async fn finish(
        &self,
        rule: Rule,
        outcome: Result<Vec<Alert>, RuleError>,
        elapsed: Duration,
        report: &mut DetectionReport,
    ) {
        metrics::histogram!(m::RULE_DURATION_SECONDS).record(elapsed.as_secs_f64());
        report.rules_evaluated += 1;

        let outcome = match outcome {
            Ok(alerts) => self.persist_alerts(&rule, alerts, report).await,
            Err(e) => Err(e),
        };

        let mut states = self.states.lock().await;
        let execution = states.entry(rule.rule_id.clone()).or_default();
        execution.runs += 1;
        execution.last_finished_at = Some(Utc::now());

        match outcome {
            Ok(created) => {
                metrics::counter!(m::RULES_EVALUATED_TOTAL, m::LABEL_RESULT => "completed")
                    .increment(1);
                execution.transition(RuleState::Completed);
                execution.last_alerts = created;
                execution.last_error = None;
                debug!(
                    rule_id = %rule.rule_id,
                    alerts = created,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "rule completed"
                );
            }
            Err(error) => {
                metrics::counter!(m::RULES_EVALUATED_TOTAL, m::LABEL_RESULT => "failed")
                    .increment(1);
                execution.transition(RuleState::Failed);
                execution.last_alerts = 0;
                execution.last_error = Some(error.to_string());
                warn!(rule_id = %rule.rule_id, error = %error, "rule failed");
                report.errors.push(RuleFailure {
                    rule_id: rule.rule_id.clone(),
                    error,
                });
            }
        }
        execution.transition(RuleState::Idle);
    }

    /// 중복 윈도우를 통과한 알림을 한 번에 저장합니다. 저장된 수를 반환합니다.
    ///
    /// 저장이 실패하면 어떤 알림도 보고되지 않고 중복 윈도우에도 기록되지 않습니다.
    async fn persist_alerts(
        &self,
        rule: &Rule,
        alerts: Vec<Alert>,
        report: &mut DetectionReport,
    ) -> Result<usize, RuleError> {
        let (suppressed, fresh): (Vec<Alert>, Vec<Alert>) = {
            let dedup = self.dedup.lock().await;
            alerts
                .into_iter()
                .partition(|alert| dedup.is_suppressed(alert))
        };

        if !fresh.is_empty() {
            self.store
                .append_alerts(fresh.clone())
                .await
                .map_err(|e| RuleError::Query {
                    rule_id: rule.rule_id.clone(),
                    reason: format!("alert append failed: {e}"),
                })?;
        }

        if !suppressed.is_empty() {
            metrics::counter!(m::ALERTS_SUPPRESSED_TOTAL)
                .increment(u64::try_from(suppressed.len()).unwrap_or(u64::MAX));
            debug!(
                rule_id = %rule.rule_id,
                suppressed = suppressed.len(),
                "alerts suppressed by dedup window"
            );
            report.suppressed += suppressed.len();
        }

        let mut dedup = self.dedup.lock().await;
        for alert in &fresh {
            dedup.record(alert);
            metrics::counter!(m::ALERTS_CREATED_TOTAL).increment(1);
            info!(
                alert_id = %alert.alert_id,
                rule_id = %alert.rule_id,
                severity = %alert.severity,
                entities = alert.entities.len(),
                "alert created"
            );
        }
        drop(dedup);

        let created = fresh.len();
        report.alerts.extend(fresh);
        Ok(created)
    }
}

async fn evaluate<S: GraphStore>(
    store: &S,
    rule: &Rule,
    limit: Duration,
) -> Result<Vec<Alert>, RuleError> {
    let rows = match tokio::time::timeout(limit, store.query(&rule.query)).await {
        Err(_) => {
            return Err(RuleError::Timeout {
                rule_id: rule.rule_id.clone(),
                timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            });
        }
        Ok(Err(e)) => {
            return Err(RuleError::Query {
                rule_id: rule.rule_id.clone(),
                reason: e.to_string(),
            });
        }
        Ok(Ok(rows)) => rows,
    };
    Ok(rows.into_iter().map(|row| row_to_alert(rule, row)).collect())
}

/// 결과 행 하나를 알림으로 변환합니다.
///
/// 노드 컬럼은 엔티티가 되고 스칼라 컬럼은 `context`로 들어갑니다.
pub fn row_to_alert(rule: &Rule, row: QueryRow) -> Alert {
    let mut entities = Vec::new();
    let mut context = FieldMap::new();
    for (column, value) in row {
        match value {
            RowValue::Node(node) => entities.push(AlertEntity {
                id: node.id.key,
                kind: node.id.label.as_str().to_owned(),
                properties: node.properties,
            }),
            RowValue::Scalar(value) => {
                context.insert(column, value);
            }
        }
    }

    Alert {
        alert_id: Uuid::new_v4().to_string(),
        rule_id: rule.rule_id.clone(),
        rule_name: rule.name.clone(),
        severity: rule.severity,
        created_at: Utc::now(),
        description: rule.description.clone(),
        mitre_techniques: rule.mitre_techniques.iter().cloned().collect(),
        tags: rule.tags.iter().cloned().collect(),
        entities,
        context,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use graphwarden_core::event::RuleQuery;
    use graphwarden_core::types::FieldValue;
    use graphwarden_graph::{MemoryGraphStore, Node, NodeKey, NodeLabel};

    use super::*;
    use crate::rule::RuleDraft;

    fn rule(query: RuleQuery) -> Rule {
        RuleDraft {
            name: "test rule".to_owned(),
            description: "desc".to_owned(),
            severity: 7,
            query,
            tags: BTreeSet::from(["auth".to_owned()]),
            mitre_techniques: BTreeSet::from(["T1110".to_owned()]),
            enabled: true,
        }
        .into_rule("RULE-T")
        .unwrap()
    }

    fn engine(rules: Arc<RuleStore>) -> DetectionEngine<MemoryGraphStore> {
        DetectionEngine::new(
            Arc::new(MemoryGraphStore::default()),
            rules,
            4,
            Duration::from_secs(5),
            Duration::ZERO,
        )
    }

    #[test]
    fn state_transitions() {
        assert!(RuleState::Idle.can_transition_to(RuleState::Running));
        assert!(RuleState::Running.can_transition_to(RuleState::Failed));
        assert!(RuleState::Failed.can_transition_to(RuleState::Idle));
        assert!(!RuleState::Idle.can_transition_to(RuleState::Completed));
        assert!(!RuleState::Running.can_transition_to(RuleState::Running));
    }

    #[test]
    fn row_splits_nodes_and_scalars() {
        let mut row = QueryRow::new();
        row.insert(
            "ip".to_owned(),
            RowValue::Node(Node {
                id: NodeKey::new(NodeLabel::Ip, "10.0.0.1"),
                properties: FieldMap::new(),
            }),
        );
        row.insert(
            "attempts".to_owned(),
            RowValue::Scalar(FieldValue::Integer(6)),
        );

        let alert = row_to_alert(&rule(RuleQuery::pattern("x")), row);
        assert_eq!(alert.entities.len(), 1);
        assert_eq!(alert.entities[0].id, "10.0.0.1");
        assert_eq!(alert.entities[0].kind, "IP");
        assert_eq!(alert.context.get("attempts"), Some(&FieldValue::Integer(6)));
        assert_eq!(alert.mitre_techniques, vec!["T1110".to_owned()]);
        assert_eq!(alert.tags, vec!["auth".to_owned()]);
    }

    #[tokio::test]
    async fn unknown_rule_is_not_found() {
        let engine = engine(Arc::new(RuleStore::default()));
        let err = engine.run("RULE-nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RuleNotFound);
    }

    #[tokio::test]
    async fn disabled_rule_returns_empty_report() {
        let rules = Arc::new(RuleStore::default());
        let mut disabled = rule(RuleQuery::pattern("not: valid"));
        disabled.enabled = false;
        rules.upsert(disabled).await.unwrap();

        let engine = engine(Arc::clone(&rules));
        let report = engine.run("RULE-T").await.unwrap();
        assert_eq!(report.rules_evaluated, 0);
        assert!(!report.has_errors());
        assert!(engine.rule_state("RULE-T").await.is_none());
    }

    #[tokio::test]
    async fn query_error_is_reported_not_returned() {
        let rules = Arc::new(RuleStore::default());
        rules
            .upsert(rule(RuleQuery {
                language: "cypher".to_owned(),
                text: "MATCH (n) RETURN n".to_owned(),
            }))
            .await
            .unwrap();

        let engine = engine(rules);
        let report = engine.run("RULE-T").await.unwrap();
        assert_eq!(report.rules_evaluated, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind(), ErrorKind::RuleQueryError);

        let state = engine.rule_state("RULE-T").await.unwrap();
        assert_eq!(state.state_name(), "idle");
        assert_eq!(state.runs, 1);
        assert!(state.last_error.is_some());
    }

    #[test]
    fn failure_serializes_kind_and_message() {
        let failure = RuleFailure {
            rule_id: "RULE-T".to_owned(),
            error: RuleError::Timeout {
                rule_id: "RULE-T".to_owned(),
                timeout_ms: 30_000,
            },
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "rule_timeout");
        assert_eq!(json["rule_id"], "RULE-T");
    }
}
