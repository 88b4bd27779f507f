//! 알림 중복 억제 윈도우
//!
//! 같은 룰이 같은 엔티티 집합에 대해 윈도우 안에서 다시 알림을 만들면 억제합니다.
//! 키는 `(rule_id, 정렬된 엔티티 ID)`입니다.

use std::collections::HashMap;
use std::time::Duration;

use graphwarden_core::event::Alert;
use tokio::time::Instant;

type DedupKey = (String, Vec<String>);

/// 중복 억제 윈도우. 윈도우가 0이면 비활성입니다.
#[derive(Debug)]
pub struct DedupWindow {
    window: Duration,
    seen: HashMap<DedupKey, Instant>,
}

impl DedupWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.window.is_zero()
    }

    /// 윈도우 안에 같은 키의 알림이 이미 기록되어 있는지 확인합니다. 상태는 바꾸지 않습니다.
    pub fn is_suppressed(&self, alert: &Alert) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.seen
            .get(&dedup_key(alert))
            .is_some_and(|last| last.elapsed() < self.window)
    }

    /// 저장된 알림의 키를 기록합니다.
    pub fn record(&mut self, alert: &Alert) {
        if self.is_enabled() {
            self.seen.insert(dedup_key(alert), Instant::now());
        }
    }

    /// 알림을 내보내야 하면 `true`를 반환하고 키를 기록합니다.
    pub fn admit(&mut self, alert: &Alert) -> bool {
        if self.is_suppressed(alert) {
            return false;
        }
        self.record(alert);
        true
    }

    /// 만료된 키를 제거합니다.
    pub fn purge(&mut self) {
        let window = self.window;
        let now = Instant::now();
        self.seen
            .retain(|_, last| now.duration_since(*last) < window);
    }

    pub fn tracked(&self) -> usize {
        self.seen.len()
    }
}

fn dedup_key(alert: &Alert) -> DedupKey {
    let mut entities: Vec<String> = alert
        .entities
        .iter()
        .map(|entity| format!("{}:{}", entity.kind, entity.id))
        .collect();
    entities.sort();
    (alert.rule_id.clone(), entities)
}

#[cfg(test)]
mod tests {
    use graphwarden_core::event::AlertEntity;
    use graphwarden_core::types::{FieldMap, Severity};

    use super::*;

    fn alert(rule_id: &str, entities: &[&str]) -> Alert {
        Alert {
            alert_id: uuid::Uuid::new_v4().to_string(),
            rule_id: rule_id.to_owned(),
            rule_name: "test".to_owned(),
            severity: Severity::MAX,
            created_at: chrono::Utc::now(),
            description: String::new(),
            mitre_techniques: Vec::new(),
            tags: Vec::new(),
            entities: entities
                .iter()
                .map(|id| AlertEntity {
                    id: (*id).to_owned(),
                    kind: "IP".to_owned(),
                    properties: FieldMap::new(),
                })
                .collect(),
            context: FieldMap::new(),
        }
    }

    #[test]
    fn zero_window_admits_everything() {
        let mut dedup = DedupWindow::new(Duration::ZERO);
        assert!(dedup.admit(&alert("r", &["1.1.1.1"])));
        assert!(dedup.admit(&alert("r", &["1.1.1.1"])));
        assert_eq!(dedup.tracked(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn repeat_within_window_is_suppressed() {
        let mut dedup = DedupWindow::new(Duration::from_secs(60));
        assert!(dedup.admit(&alert("r", &["a", "b"])));
        // 엔티티 순서는 키에 영향을 주지 않음
        assert!(!dedup.admit(&alert("r", &["b", "a"])));
        // 다른 룰은 별개
        assert!(dedup.admit(&alert("other", &["a", "b"])));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(dedup.admit(&alert("r", &["a", "b"])));
    }

    #[tokio::test(start_paused = true)]
    async fn check_does_not_record() {
        let mut dedup = DedupWindow::new(Duration::from_secs(60));
        let first = alert("r", &["a"]);
        assert!(!dedup.is_suppressed(&first));
        assert!(!dedup.is_suppressed(&first));
        assert_eq!(dedup.tracked(), 0);

        dedup.record(&first);
        assert!(dedup.is_suppressed(&alert("r", &["a"])));
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!dedup.is_suppressed(&first));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_expired_keys() {
        let mut dedup = DedupWindow::new(Duration::from_secs(10));
        dedup.admit(&alert("r", &["a"]));
        tokio::time::advance(Duration::from_secs(5)).await;
        dedup.admit(&alert("r", &["b"]));
        tokio::time::advance(Duration::from_secs(6)).await;
        dedup.purge();
        assert_eq!(dedup.tracked(), 1);
    }
}
