//! 인메모리 그래프 저장소
//!
//! [`MemoryGraphStore`]는 [`GraphStore`]의 인프로세스 구현입니다.
//! 세마포어 기반 커넥션 풀로 동시 접근 수를 제한하고, 병합은 스테이징 후
//! 한 번에 적용하여 실패 시 아무것도 기록되지 않도록 합니다.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use graphwarden_core::config::GraphConfig;
use graphwarden_core::error::StorageError;
use graphwarden_core::event::{Alert, MergeOutcome, RuleQuery};
use graphwarden_core::types::FieldMap;
use tokio::sync::{RwLock, Semaphore, SemaphorePermit};
use tracing::debug;

use crate::model::{AlertFilter, GraphStats, Node, NodeKey, NodeLabel, QueryRow, RelKey, WriteSet};
use crate::pattern::{PATTERN_LANGUAGE, PatternQuery};
use crate::store::GraphStore;

#[derive(Debug, Default)]
struct GraphState {
    nodes: HashMap<NodeKey, FieldMap>,
    relationships: BTreeMap<RelKey, FieldMap>,
    alerts: Vec<Alert>,
}

/// 인메모리 그래프 저장소
pub struct MemoryGraphStore {
    state: RwLock<GraphState>,
    pool: Arc<Semaphore>,
    acquire_timeout: Duration,
    fail_next_writes: AtomicUsize,
}

impl MemoryGraphStore {
    /// 커넥션 풀 크기와 획득 타임아웃으로 저장소를 생성합니다.
    pub fn new(max_connections: usize, acquire_timeout: Duration) -> Self {
        Self {
            state: RwLock::new(GraphState::default()),
            pool: Arc::new(Semaphore::new(max_connections.max(1))),
            acquire_timeout,
            fail_next_writes: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &GraphConfig) -> Self {
        Self::new(config.max_connections, config.acquire_timeout())
    }

    /// 풀에서 커넥션을 획득합니다. 반환된 permit이 drop되면 반납됩니다.
    pub async fn connection(&self) -> Result<SemaphorePermit<'_>, StorageError> {
        match tokio::time::timeout(self.acquire_timeout, self.pool.acquire()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(StorageError::Connection("connection pool closed".to_owned())),
            Err(_) => Err(StorageError::PoolTimeout {
                waited_ms: u64::try_from(self.acquire_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// 다음 `count`번의 병합을 트랜잭션 중단으로 실패시킵니다.
    pub fn fail_next_writes(&self, count: usize) {
        self.fail_next_writes.store(count, Ordering::SeqCst);
    }

    /// 노드를 조회합니다.
    pub async fn get_node(&self, key: &NodeKey) -> Result<Option<Node>, StorageError> {
        let _conn = self.connection().await?;
        let state = self.state.read().await;
        Ok(state.nodes.get(key).map(|properties| Node {
            id: key.clone(),
            properties: properties.clone(),
        }))
    }

    fn take_injected_failure(&self) -> bool {
        self.fail_next_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::from_config(&GraphConfig::default())
    }
}

impl GraphStore for MemoryGraphStore {
    async fn merge(&self, writes: WriteSet) -> Result<MergeOutcome, StorageError> {
        let _conn = self.connection().await?;
        let mut state = self.state.write().await;

        let event_key = writes.event.id.clone();

        // 엔티티 속성은 기존 값 위에 덮어씁니다.
        let mut staged_nodes: Vec<(NodeKey, FieldMap)> = Vec::with_capacity(writes.entities.len() + 1);
        let mut entities_changed = false;
        for entity in writes.entities {
            let existing = state.nodes.get(&entity.id);
            let mut properties = existing.cloned().unwrap_or_default();
            properties.extend(entity.properties);
            entities_changed |= existing != Some(&properties);
            staged_nodes.push((entity.id, properties));
        }

        for rel in &writes.relationships {
            let known = |key: &NodeKey| {
                *key == event_key
                    || state.nodes.contains_key(key)
                    || staged_nodes.iter().any(|(k, _)| k == key)
            };
            if !known(&rel.key.from) || !known(&rel.key.to) {
                return Err(StorageError::Transaction(format!(
                    "relationship {} -[{}]-> {} references a missing node",
                    rel.key.from, rel.key.rel, rel.key.to
                )));
            }
        }

        // 이벤트의 관계 집합은 새 쓰기 집합으로 교체됩니다.
        let previous: BTreeMap<RelKey, FieldMap> = state
            .relationships
            .iter()
            .filter(|(key, _)| key.from == event_key || key.to == event_key)
            .map(|(key, properties)| (key.clone(), properties.clone()))
            .collect();
        let next: BTreeMap<RelKey, FieldMap> = writes
            .relationships
            .into_iter()
            .map(|rel| (rel.key, rel.properties))
            .collect();

        let outcome = match state.nodes.get(&event_key) {
            None => MergeOutcome::Created,
            Some(existing)
                if *existing == writes.event.properties && previous == next && !entities_changed =>
            {
                MergeOutcome::Unchanged
            }
            Some(_) => MergeOutcome::Updated,
        };

        if self.take_injected_failure() {
            return Err(StorageError::Transaction("injected failure".to_owned()));
        }

        for (key, properties) in staged_nodes {
            state.nodes.insert(key, properties);
        }
        state.nodes.insert(event_key.clone(), writes.event.properties);
        let stale: Vec<RelKey> = previous
            .into_keys()
            .filter(|key| !next.contains_key(key))
            .collect();
        for key in &stale {
            state.relationships.remove(key);
        }
        state.relationships.extend(next);

        debug!(
            event = %event_key,
            outcome = outcome.as_str(),
            removed_relationships = stale.len(),
            "graph merge committed"
        );
        Ok(outcome)
    }

    async fn get_event(&self, id: &str) -> Result<Option<Node>, StorageError> {
        self.get_node(&NodeKey::new(NodeLabel::Event, id)).await
    }

    async fn query(&self, query: &RuleQuery) -> Result<Vec<QueryRow>, StorageError> {
        if query.language != PATTERN_LANGUAGE {
            return Err(StorageError::Query(format!(
                "unsupported query language '{}'",
                query.language
            )));
        }
        let pattern =
            PatternQuery::parse(&query.text).map_err(|e| StorageError::Query(e.to_string()))?;

        let _conn = self.connection().await?;
        let state = self.state.read().await;
        Ok(pattern.execute(&state.nodes, state.relationships.iter(), Utc::now()))
    }

    async fn append_alerts(&self, alerts: Vec<Alert>) -> Result<(), StorageError> {
        let _conn = self.connection().await?;
        self.state.write().await.alerts.extend(alerts);
        Ok(())
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>, StorageError> {
        let _conn = self.connection().await?;
        let state = self.state.read().await;
        Ok(state
            .alerts
            .iter()
            .rev()
            .filter(|a| filter.rule_id.as_deref().is_none_or(|id| a.rule_id == id))
            .filter(|a| filter.min_severity.is_none_or(|min| a.severity >= min))
            .take(filter.effective_limit())
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<GraphStats, StorageError> {
        let _conn = self.connection().await?;
        let state = self.state.read().await;
        let mut stats = GraphStats {
            alerts: state.alerts.len(),
            ..Default::default()
        };
        for key in state.nodes.keys() {
            *stats.nodes.entry(key.label.as_str().to_owned()).or_default() += 1;
        }
        for key in state.relationships.keys() {
            *stats
                .relationships
                .entry(key.rel.as_str().to_owned())
                .or_default() += 1;
        }
        Ok(stats)
    }
}
