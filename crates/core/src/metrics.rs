//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 크레이트는 이 상수를 사용하여 `metrics::counter!()`, `metrics::histogram!()`
//! 매크로를 호출합니다. 익스포터는 포함하지 않으며, 레코더가 설치되지 않으면
//! 모든 호출은 no-op입니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `graphwarden_`
//! - 접미어: `_total` (counter), `_seconds` (histogram)
//!
//! # 사용 예시
//!
//! ```ignore
//! use graphwarden_core::metrics as m;
//!
//! metrics::counter!(m::EVENTS_NORMALIZED_TOTAL, m::LABEL_FORMAT => "cef").increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 입력 포맷 레이블 키 (native, syslog, cef, leef)
pub const LABEL_FORMAT: &str = "format";

/// 에러 분류 레이블 키 (`ErrorKind::as_str`)
pub const LABEL_KIND: &str = "kind";

/// 병합 결과 레이블 키 (created, updated, unchanged)
pub const LABEL_OUTCOME: &str = "outcome";

/// 처리 결과 레이블 키
pub const LABEL_RESULT: &str = "result";

// ─── Normalize ─────────────────────────────────────────────────────

/// 정규화 성공 이벤트 수 (counter, label: format)
pub const EVENTS_NORMALIZED_TOTAL: &str = "graphwarden_events_normalized_total";

/// 정규화 실패 수 (counter, label: kind)
pub const NORMALIZE_ERRORS_TOTAL: &str = "graphwarden_normalize_errors_total";

// ─── Graph ─────────────────────────────────────────────────────────

/// 영속화된 이벤트 수 (counter, label: outcome)
pub const EVENTS_PERSISTED_TOTAL: &str = "graphwarden_events_persisted_total";

// ─── Queue ─────────────────────────────────────────────────────────

/// 컨슈머가 처리한 메시지 수 (counter, label: result)
///
/// result: committed, dead_lettered, redelivered
pub const QUEUE_MESSAGES_TOTAL: &str = "graphwarden_queue_messages_total";

/// 데드레터로 보낸 메시지 수 (counter)
pub const DEAD_LETTER_TOTAL: &str = "graphwarden_dead_letter_total";

// ─── Detection ─────────────────────────────────────────────────────

/// 평가된 룰 수 (counter, label: result)
///
/// result: completed, failed
pub const RULES_EVALUATED_TOTAL: &str = "graphwarden_rules_evaluated_total";

/// 생성된 알림 수 (counter)
pub const ALERTS_CREATED_TOTAL: &str = "graphwarden_alerts_created_total";

/// 중복 제거된 알림 수 (counter)
pub const ALERTS_SUPPRESSED_TOTAL: &str = "graphwarden_alerts_suppressed_total";

/// 룰 실행 시간 (histogram, 초)
pub const RULE_DURATION_SECONDS: &str = "graphwarden_rule_duration_seconds";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 룰 실행 시간 히스토그램 버킷 (초)
///
/// 1ms ~ 60s 범위
pub const RULE_DURATION_BUCKETS: [f64; 10] =
    [0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 60.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!(
        EVENTS_NORMALIZED_TOTAL,
        "Total number of raw events normalized into canonical events"
    );
    describe_counter!(
        NORMALIZE_ERRORS_TOTAL,
        "Total number of normalization failures by error kind"
    );
    describe_counter!(
        EVENTS_PERSISTED_TOTAL,
        "Total number of events merged into the graph by outcome"
    );
    describe_counter!(
        QUEUE_MESSAGES_TOTAL,
        "Total number of queue messages handled by consumers"
    );
    describe_counter!(
        DEAD_LETTER_TOTAL,
        "Total number of messages routed to the dead-letter sink"
    );
    describe_counter!(
        RULES_EVALUATED_TOTAL,
        "Total number of detection rule executions"
    );
    describe_counter!(ALERTS_CREATED_TOTAL, "Total number of alerts persisted");
    describe_counter!(
        ALERTS_SUPPRESSED_TOTAL,
        "Total number of alerts dropped by the dedup window"
    );
    describe_histogram!(
        RULE_DURATION_SECONDS,
        "Time to execute a single detection rule in seconds"
    );
}
