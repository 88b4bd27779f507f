//! CEF 매핑

use graphwarden_core::types::{FieldMap, FieldValue};

use super::{Draft, take_first, take_text};

pub(super) fn map(mut fields: FieldMap, draft: &mut Draft) {
    draft.set("class_uid", "0001");
    draft.set("category_uid", "0002");

    draft.set_time(
        take_first(&mut fields, &["rt", "deviceReceiptTime", "end", "start"]),
        None,
    );

    draft.set_ip("src.ip", "src", fields.remove("src"));
    draft.set_port("src.port", "spt", fields.remove("spt"));
    draft.set_text("src.hostname", "shost", fields.remove("shost"));
    draft.set_ip("dst.ip", "dst", fields.remove("dst"));
    draft.set_port("dst.port", "dpt", fields.remove("dpt"));
    draft.set_text("dst.hostname", "dhost", fields.remove("dhost"));

    draft.set_text("principal.name", "suser", fields.remove("suser"));
    draft.set_text("principal.domain", "sntdom", fields.remove("sntdom"));

    draft.push_resource("User", take_text(&mut fields, "duser"), None);
    draft.push_resource("Process", take_text(&mut fields, "dproc"), None);
    draft.push_resource(
        "Resource",
        take_text(&mut fields, "fname"),
        take_text(&mut fields, "filePath"),
    );

    if !draft.set_text_first("message", &mut fields, &["msg", "message"]) {
        draft.set_text("message", "name", fields.remove("name"));
    }

    draft.set_severity(fields.remove("severity").map(normalize_severity));

    for (path, key) in [
        ("metadata.product.name", "deviceProduct"),
        ("metadata.vendor_name", "deviceVendor"),
        ("metadata.product.version", "deviceVersion"),
    ] {
        draft.set_text(path, key, fields.remove(key));
    }

    draft.extend(fields);
}

/// CEF 고유 레이블(`Very-High`)을 정규 레이블로 바꿉니다.
fn normalize_severity(value: FieldValue) -> FieldValue {
    match value.as_str().map(|s| s.trim().to_lowercase()) {
        Some(label) if label == "very-high" || label == "very high" => FieldValue::Integer(9),
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use graphwarden_core::types::{FormatTag, Severity};

    use crate::mapper::{MappedEvent, OcsfMapper, SeverityPolicy};
    use crate::parser::{CefParser, FormatParser};
    use crate::schema::SchemaRegistry;

    use super::*;

    fn map_line(line: &str) -> Result<MappedEvent, graphwarden_core::error::SchemaError> {
        let fields = CefParser.parse(line.as_bytes()).unwrap();
        OcsfMapper::new(SchemaRegistry::new("1.0.0"), SeverityPolicy::Clamp)
            .map(fields, FormatTag::Cef)
    }

    #[test]
    fn full_record_is_mapped() {
        let event = map_line(
            "CEF:0|Acme|Firewall|2.1|100|Blocked connection|7|rt=1705320000000 src=10.0.0.1 spt=51000 \
             dst=10.0.0.2 dpt=443 dhost=db-01 suser=alice sntdom=CORP dproc=nginx fname=passwd \
             filePath=/etc/passwd act=blocked",
        )
        .unwrap()
        .event;
        assert_eq!(event.class_uid, "0001");
        assert_eq!(event.time.timestamp_millis(), 1_705_320_000_000);
        assert_eq!(event.severity, Severity::new(7));
        assert_eq!(event.message.as_deref(), Some("Blocked connection"));
        assert_eq!(event.metadata.product.name, "Firewall");
        assert_eq!(event.metadata.vendor_name.as_deref(), Some("Acme"));
        assert_eq!(event.metadata.product.version.as_deref(), Some("2.1"));

        let src = event.src.unwrap();
        assert_eq!(src.ip, Some("10.0.0.1".parse().unwrap()));
        assert_eq!(src.port, Some(51000));
        let dst = event.dst.unwrap();
        assert_eq!(dst.port, Some(443));
        assert_eq!(dst.hostname.as_deref(), Some("db-01"));

        let principal = event.principal.unwrap();
        assert_eq!(principal.name.as_deref(), Some("alice"));
        assert_eq!(principal.domain.as_deref(), Some("CORP"));

        let kinds: Vec<_> = event
            .resources
            .iter()
            .map(|r| r.kind.as_deref().unwrap())
            .collect();
        assert_eq!(kinds, vec!["Process", "Resource"]);
        assert_eq!(event.resources[1].path.as_deref(), Some("/etc/passwd"));

        assert_eq!(event.extensions["act"].as_str(), Some("blocked"));
        assert_eq!(event.extensions["signatureId"].as_str(), Some("100"));
        assert!(!event.extensions.contains_key("name"));
    }

    #[test]
    fn msg_wins_over_header_name() {
        let event = map_line("CEF:0|a|fw|1|1|header name|5|rt=Jan 15 2024 12:00:00 msg=detailed text")
            .unwrap()
            .event;
        assert_eq!(event.message.as_deref(), Some("detailed text"));
        assert_eq!(event.extensions["name"].as_str(), Some("header name"));
    }

    #[test]
    fn end_and_start_are_time_fallbacks() {
        let event = map_line("CEF:0|a|fw|1|1|x|5|start=1705320000000 end=1705320060000")
            .unwrap()
            .event;
        assert_eq!(event.time.timestamp_millis(), 1_705_320_060_000);
        assert_eq!(event.extensions["start"].as_str(), Some("1705320000000"));
    }

    #[test]
    fn missing_time_is_a_violation() {
        let err = map_line("CEF:0|a|fw|1|1|x|5|src=10.0.0.1").unwrap_err();
        assert_eq!(err.violations()[0].field, "time");
    }

    #[test]
    fn severity_labels() {
        let event = map_line("CEF:0|a|fw|1|1|x|Very-High|rt=1705320000000")
            .unwrap()
            .event;
        assert_eq!(event.severity, Severity::new(9));
        let event = map_line("CEF:0|a|fw|1|1|x|Low|rt=1705320000000")
            .unwrap()
            .event;
        assert_eq!(event.severity, Severity::new(3));
    }

    #[test]
    fn invalid_source_ip_is_kept_with_warning() {
        let mapped = map_line("CEF:0|a|fw|1|1|x|5|rt=1705320000000 src=bogus").unwrap();
        assert!(mapped.event.src.is_none());
        assert_eq!(mapped.warnings.len(), 1);
        assert_eq!(mapped.event.extensions["src"].as_str(), Some("bogus"));
    }

    #[test]
    fn empty_and_structured_values_are_not_dropped() {
        let mapped = map_line("CEF:0|a|fw|1|1|x|5|rt=1705320000000 suser= src=10.0.0.1").unwrap();
        assert!(mapped.event.principal.is_none());
        assert_eq!(mapped.event.extensions["suser"].as_str(), Some(""));
        assert_eq!(mapped.warnings.len(), 1);

        let mut fields = FieldMap::new();
        fields.insert("deviceProduct".into(), "fw".into());
        fields.insert("rt".into(), "1705320000000".into());
        let mut shost = FieldMap::new();
        shost.insert("fqdn".into(), "a.b".into());
        fields.insert("shost".into(), FieldValue::Map(shost.clone()));
        fields.insert("msg".into(), FieldValue::List(vec!["x".into(), "y".into()]));
        fields.insert("name".into(), "header name".into());
        let mapped = OcsfMapper::new(SchemaRegistry::new("1.0.0"), SeverityPolicy::Clamp)
            .map(fields, FormatTag::Cef)
            .unwrap();
        let event = mapped.event;
        assert!(event.src.is_none());
        assert_eq!(event.extensions["shost"], FieldValue::Map(shost));
        assert_eq!(
            event.extensions["msg"],
            FieldValue::List(vec!["x".into(), "y".into()])
        );
        // msg를 쓸 수 없으면 헤더 name으로 대체
        assert_eq!(event.message.as_deref(), Some("header name"));
        assert_eq!(mapped.warnings.len(), 2);
    }

    #[test]
    fn duser_becomes_user_resource() {
        let event = map_line("CEF:0|a|fw|1|1|x|5|rt=1705320000000 duser=bob")
            .unwrap()
            .event;
        assert_eq!(event.resources[0].kind.as_deref(), Some("User"));
        assert_eq!(event.resources[0].name.as_deref(), Some("bob"));
        assert_eq!(
            normalize_severity(FieldValue::from("very high")),
            FieldValue::Integer(9)
        );
    }
}
