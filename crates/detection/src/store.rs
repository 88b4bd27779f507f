//! 룰 저장소
//!
//! 룰 정의를 보관하고 CRUD를 제공합니다. 탐지 엔진은 [`RuleStore::enabled_snapshot`]으로
//! 활성 룰을 읽기만 합니다. 스냅샷은 `refresh_interval` 동안 캐시되며
//! 쓰기가 일어나면 즉시 무효화됩니다.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use graphwarden_core::config::DetectionConfig;
use graphwarden_core::error::RuleError;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::rule::{Rule, RuleDraft, RuleFilter};

type Snapshot = (Instant, Arc<Vec<Rule>>);

/// 룰 저장소
pub struct RuleStore {
    rules: RwLock<BTreeMap<String, Rule>>,
    snapshot: Mutex<Option<Snapshot>>,
    refresh_interval: Duration,
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl RuleStore {
    pub fn new(refresh_interval: Duration) -> Self {
        Self {
            rules: RwLock::new(BTreeMap::new()),
            snapshot: Mutex::new(None),
            refresh_interval,
        }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(config.refresh_interval())
    }

    /// 새 룰을 생성합니다. ID는 `RULE-` 뒤에 UUID 앞 8자리를 붙여 만듭니다.
    pub async fn create(&self, draft: RuleDraft) -> Result<Rule, RuleError> {
        let mut rules = self.rules.write().await;
        let rule_id = loop {
            let candidate = generate_rule_id();
            if !rules.contains_key(&candidate) {
                break candidate;
            }
        };
        let rule = draft.into_rule(rule_id)?;
        rules.insert(rule.rule_id.clone(), rule.clone());
        drop(rules);
        self.invalidate().await;
        info!(rule_id = %rule.rule_id, name = %rule.name, "rule created");
        Ok(rule)
    }

    /// 기존 룰을 교체합니다.
    pub async fn update(&self, rule_id: &str, draft: RuleDraft) -> Result<Rule, RuleError> {
        let mut rules = self.rules.write().await;
        if !rules.contains_key(rule_id) {
            return Err(RuleError::NotFound(rule_id.to_owned()));
        }
        let rule = draft.into_rule(rule_id)?;
        rules.insert(rule.rule_id.clone(), rule.clone());
        drop(rules);
        self.invalidate().await;
        info!(rule_id = %rule.rule_id, "rule updated");
        Ok(rule)
    }

    pub async fn delete(&self, rule_id: &str) -> Result<Rule, RuleError> {
        let removed = self
            .rules
            .write()
            .await
            .remove(rule_id)
            .ok_or_else(|| RuleError::NotFound(rule_id.to_owned()))?;
        self.invalidate().await;
        info!(rule_id, "rule deleted");
        Ok(removed)
    }

    pub async fn get(&self, rule_id: &str) -> Result<Rule, RuleError> {
        self.rules
            .read()
            .await
            .get(rule_id)
            .cloned()
            .ok_or_else(|| RuleError::NotFound(rule_id.to_owned()))
    }

    /// ID 순으로 필터에 맞는 룰을 반환합니다.
    pub async fn list(&self, filter: &RuleFilter) -> Vec<Rule> {
        self.rules
            .read()
            .await
            .values()
            .filter(|rule| filter.matches(rule))
            .cloned()
            .collect()
    }

    pub async fn set_enabled(&self, rule_id: &str, enabled: bool) -> Result<Rule, RuleError> {
        let mut rules = self.rules.write().await;
        let rule = rules
            .get_mut(rule_id)
            .ok_or_else(|| RuleError::NotFound(rule_id.to_owned()))?;
        rule.enabled = enabled;
        let updated = rule.clone();
        drop(rules);
        self.invalidate().await;
        info!(rule_id, enabled, "rule toggled");
        Ok(updated)
    }

    /// 검증 후 ID 기준으로 삽입하거나 교체합니다.
    pub async fn upsert(&self, rule: Rule) -> Result<(), RuleError> {
        rule.validate()?;
        self.rules.write().await.insert(rule.rule_id.clone(), rule);
        self.invalidate().await;
        Ok(())
    }

    /// 로더가 읽은 룰을 한꺼번에 넣습니다. 넣은 개수를 반환합니다.
    pub async fn load(&self, loaded: Vec<Rule>) -> Result<usize, RuleError> {
        for rule in &loaded {
            rule.validate()?;
        }
        let count = loaded.len();
        {
            let mut rules = self.rules.write().await;
            for rule in loaded {
                rules.insert(rule.rule_id.clone(), rule);
            }
        }
        self.invalidate().await;
        info!(count, "rules loaded into store");
        Ok(count)
    }

    pub async fn len(&self) -> usize {
        self.rules.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rules.read().await.is_empty()
    }

    /// 활성 룰 스냅샷
    pub async fn enabled_snapshot(&self) -> Arc<Vec<Rule>> {
        let mut snapshot = self.snapshot.lock().await;
        if let Some((taken_at, rules)) = snapshot.as_ref() {
            if taken_at.elapsed() < self.refresh_interval {
                return Arc::clone(rules);
            }
        }

        let enabled: Vec<Rule> = self
            .rules
            .read()
            .await
            .values()
            .filter(|rule| rule.enabled)
            .cloned()
            .collect();
        debug!(count = enabled.len(), "rule snapshot refreshed");
        let enabled = Arc::new(enabled);
        *snapshot = Some((Instant::now(), Arc::clone(&enabled)));
        enabled
    }

    async fn invalidate(&self) {
        *self.snapshot.lock().await = None;
    }
}

fn generate_rule_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("RULE-{}", &uuid[..8])
}
