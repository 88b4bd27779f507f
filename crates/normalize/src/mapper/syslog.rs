//! Syslog 매핑

use chrono::Utc;
use graphwarden_core::types::{FieldMap, FieldValue};
use sha2::{Digest, Sha256};

use super::{Draft, format_time, take_text};

/// Syslog 심각도(0–7) → 정규 심각도(0–10)
const SEVERITY_TABLE: [i64; 8] = [10, 9, 8, 7, 6, 5, 4, 3];

/// 테이블에 없는 Syslog 심각도의 기본값
const DEFAULT_SEVERITY: i64 = 5;

pub(super) fn map(mut fields: FieldMap, draft: &mut Draft) {
    draft.set("class_uid", "0001");
    draft.set("category_uid", "0002");
    draft.set("metadata.product.name", "Syslog");

    match fields.remove("timestamp") {
        Some(timestamp) => draft.set_time(Some(timestamp), None),
        None => {
            // 재전달 시에도 같은 Event 키가 나오도록 원본 필드로 uid를 고정
            draft.set("metadata.uid", payload_digest(&fields));
            draft.set("time", format_time(Utc::now()));
            draft.warn("syslog record has no timestamp, using ingestion time".to_owned());
        }
    }

    let severity = match fields.remove("severity") {
        Some(raw) => match syslog_severity(&raw) {
            Some(severity) => severity,
            None => {
                draft.warn(format!(
                    "syslog severity {raw} is outside 0-7, \
                     kept in extensions and defaulted to {DEFAULT_SEVERITY}"
                ));
                draft.extension("severity", raw);
                DEFAULT_SEVERITY
            }
        },
        None => DEFAULT_SEVERITY,
    };
    draft.set_severity(Some(FieldValue::Integer(severity)));

    if let Some(hostname) = take_text(&mut fields, "hostname") {
        draft.set("src.hostname", hostname.as_str());
        draft.set("src.type", "Host");
        draft.set("metadata.vendor_name", hostname);
    }

    draft.set_text("message", "message", fields.remove("message"));

    if let Some(app_name) = take_text(&mut fields, "app_name") {
        draft.push_resource("Process", Some(app_name), None);
    }

    draft.extend(fields);
}

fn syslog_severity(raw: &FieldValue) -> Option<i64> {
    let level = usize::try_from(raw.as_i64()?).ok()?;
    SEVERITY_TABLE.get(level).copied()
}

/// 필드 맵의 정규 JSON(SHA-256, hex)
fn payload_digest(fields: &FieldMap) -> String {
    let canonical = serde_json::to_string(fields).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}
