//! 통합 테스트 -- 감지부터 검증까지 정규화 전체 흐름
//!
//! 포맷별 대표 입력, 힌트 처리, 스키마 디렉토리 로딩,
//! 그리고 임의 입력에 대한 무패닉 속성을 검증합니다.

use graphwarden_core::config::SchemaConfig;
use graphwarden_core::error::{ErrorKind, ParseError};
use graphwarden_core::types::{FieldValue, FormatTag, Severity};
use graphwarden_normalize::{NormalizeError, Normalizer, SchemaRegistry};

const OKTA_FAILED_AUTH: &[u8] = br#"{
    "class_uid": 3002,
    "category_uid": 3,
    "time": "2024-01-15T12:00:00Z",
    "severity": "medium",
    "message": "User login failed",
    "metadata": {"version": "1.0.0", "product": {"name": "Okta", "vendor_name": "Okta"}},
    "src_endpoint": {"ip": "192.168.1.100"},
    "actor": {"user": {"name": "alice", "domain": "corp.example"}},
    "status": "Failure"
}"#;

const SSHD_5424: &[u8] =
    b"<38>1 2024-01-15T12:00:05Z bastion-01 sshd 2211 - - Failed password for root from 192.168.1.100";

const FIREWALL_CEF: &[u8] = b"<134>Jan 15 12:00:10 fw01 CEF:0|Palo Alto|PAN-OS|10.1|THREAT|Port scan|Very-High|rt=Jan 15 2024 12:00:10 src=192.168.1.100 dst=10.0.0.5 dpt=22 act=deny";

const QRADAR_LEEF: &[u8] = b"LEEF:2.0|IBM|QRadar|7.5|4625|x09|devTime=1705320015000\tsrc=192.168.1.100\tusrName=alice\tsev=4";

/// 네이티브 JSON → 정규 이벤트
#[test]
fn test_native_event_flow() {
    let mapped = Normalizer::default().normalize(OKTA_FAILED_AUTH, None).unwrap();
    let event = mapped.event;

    assert_eq!(mapped.format, FormatTag::Native);
    assert_eq!(event.class_uid, "3002");
    assert_eq!(event.category_uid.as_deref(), Some("3"));
    assert_eq!(event.severity, Severity::new(5));
    assert_eq!(event.src.unwrap().ip, Some("192.168.1.100".parse().unwrap()));
    let principal = event.principal.unwrap();
    assert_eq!(principal.name.as_deref(), Some("alice"));
    assert_eq!(principal.domain.as_deref(), Some("corp.example"));
    assert_eq!(event.extensions["status"].as_str(), Some("Failure"));
}

/// 네 가지 포맷이 같은 공격자 IP를 같은 정규 위치로 매핑하는지 확인
#[test]
fn test_formats_converge_on_canonical_fields() {
    let normalizer = Normalizer::default();

    let cef = normalizer.normalize(FIREWALL_CEF, None).unwrap();
    assert_eq!(cef.format, FormatTag::Cef);
    assert_eq!(cef.event.severity, Severity::new(9));
    assert_eq!(cef.event.metadata.vendor_name.as_deref(), Some("Palo Alto"));
    assert_eq!(
        cef.event.src.as_ref().unwrap().ip,
        Some("192.168.1.100".parse().unwrap())
    );

    let leef = normalizer.normalize(QRADAR_LEEF, None).unwrap();
    assert_eq!(leef.format, FormatTag::Leef);
    assert_eq!(
        leef.event.src.as_ref().unwrap().ip,
        Some("192.168.1.100".parse().unwrap())
    );
    assert_eq!(leef.event.extensions["event_id"].as_str(), Some("4625"));

    let syslog = normalizer.normalize(SSHD_5424, None).unwrap();
    assert_eq!(syslog.format, FormatTag::Syslog);
    // PRI 38 → severity 6 (informational) → 4
    assert_eq!(syslog.event.severity, Severity::new(4));
    assert_eq!(
        syslog.event.src.as_ref().unwrap().hostname.as_deref(),
        Some("bastion-01")
    );
}

/// 같은 입력은 항상 같은 정규 이벤트가 됩니다.
#[test]
fn test_mapping_is_deterministic() {
    let normalizer = Normalizer::default();
    for raw in [OKTA_FAILED_AUTH, SSHD_5424, FIREWALL_CEF, QRADAR_LEEF] {
        let first = normalizer.normalize(raw, None).unwrap();
        let second = normalizer.normalize(raw, None).unwrap();
        assert_eq!(first, second);
    }
}

/// 잘못된 입력은 부분 결과 없이 타입이 지정된 에러를 반환합니다.
#[test]
fn test_error_taxonomy() {
    let normalizer = Normalizer::default();

    let err = normalizer.normalize(b"CEF:0|acme|fw|1.0", None).unwrap_err();
    match err {
        NormalizeError::Parse(ParseError::MalformedInput { format, .. }) => {
            assert_eq!(format, "cef");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let err = normalizer
        .normalize(br#"{"class_uid": "1", "time": "not a time"}"#, None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaViolation);
    let NormalizeError::Schema(schema_err) = err else {
        panic!("expected schema error");
    };
    let fields: Vec<&str> = schema_err
        .violations()
        .iter()
        .map(|v| v.field.as_str())
        .collect();
    assert!(fields.contains(&"time"));
    assert!(fields.contains(&"metadata"));

    let err = normalizer.normalize(b"\x00\x01\x02", Some("xml")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnrecognizedFormat);
}

/// 최대 입력 크기 초과는 오프셋 0의 MalformedInput
#[tokio::test]
async fn test_oversized_input_is_rejected() {
    let config = SchemaConfig {
        max_input_size: 128,
        ..Default::default()
    };
    let normalizer = Normalizer::from_config(&config).await.unwrap();
    let mut raw = b"CEF:0|a|b|c|d|e|5|msg=".to_vec();
    raw.extend(std::iter::repeat_n(b'x', 256));

    let err = normalizer.normalize(&raw, None).unwrap_err();
    assert!(matches!(
        err,
        NormalizeError::Parse(ParseError::MalformedInput { offset: 0, .. })
    ));
}

/// 스키마 디렉토리에서 추가 정의 로딩
#[tokio::test]
async fn test_schema_directory_loading() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(
        dir.path().join("auth_event.yaml"),
        "version: \"1.0.0\"\nfields:\n  - path: principal.name\n    type: string\n    required: true\n",
    )
    .await
    .unwrap();
    tokio::fs::write(dir.path().join("broken.json"), "{ not json")
        .await
        .unwrap();

    let config = SchemaConfig {
        schema_path: dir.path().to_string_lossy().into_owned(),
        ..Default::default()
    };
    let normalizer = Normalizer::from_config(&config).await.unwrap();
    let registry = normalizer.mapper().registry();
    assert_eq!(registry.names(), vec!["auth_event", "canonical_event"]);

    let event = normalizer.normalize(OKTA_FAILED_AUTH, None).unwrap().event;
    let doc = serde_json::to_value(&event).unwrap();
    assert!(registry.validate("auth_event", &doc).is_ok());

    let empty = SchemaRegistry::new("1.0.0");
    assert!(empty.validate("auth_event", &doc).is_err());
}

/// 구조화 페이로드 (이미 디코딩된 객체)
#[test]
fn test_structured_payload_with_hint() {
    let raw = br#"{"hostname": "web-01", "timestamp": "2024-01-15T12:00:00Z", "message": "disk full", "severity": 3}"#;
    let mapped = Normalizer::default().normalize(raw, Some("syslog")).unwrap();
    assert_eq!(mapped.format, FormatTag::Syslog);
    assert_eq!(mapped.event.severity, Severity::new(7));
    assert_eq!(mapped.event.message.as_deref(), Some("disk full"));
    assert_eq!(
        mapped.event.metadata.vendor_name.as_deref(),
        Some("web-01")
    );
    assert!(!mapped.event.extensions.contains_key("hostname"));
    assert_eq!(
        mapped.event.extensions.get("facility"),
        None::<&FieldValue>
    );
}

/// 매핑할 수 없는 값(빈 값, 구조화 값, 잘못된 심각도)은 경고와 함께 extensions에 남는다
#[test]
fn test_unusable_values_are_preserved() {
    let normalizer = Normalizer::default();

    let cef = normalizer
        .normalize(b"CEF:0|acme|fw|1.0|100|blocked|5|rt=1705320000000 suser= src=10.0.0.1", None)
        .unwrap();
    assert!(cef.event.principal.is_none());
    assert_eq!(cef.event.extensions["suser"].as_str(), Some(""));
    assert!(cef.warnings.iter().any(|w| w.contains("suser")));

    let structured = br#"{"deviceVendor": "acme", "deviceProduct": "fw", "rt": 1705320000000,
        "shost": {"fqdn": "a.b"}, "msg": ["x", "y"]}"#;
    let cef = normalizer.normalize(structured, Some("cef")).unwrap();
    let shost = match &cef.event.extensions["shost"] {
        FieldValue::Map(map) => map.clone(),
        other => panic!("shost should stay structured, got {other:?}"),
    };
    assert_eq!(shost["fqdn"].as_str(), Some("a.b"));
    assert_eq!(
        cef.event.extensions["msg"],
        FieldValue::List(vec!["x".into(), "y".into()])
    );
    assert!(cef.event.message.is_none());

    let raw = br#"{"hostname": "web-01", "timestamp": "2024-01-15T12:00:00Z", "severity": "bogus"}"#;
    let syslog = normalizer.normalize(raw, Some("syslog")).unwrap();
    assert_eq!(syslog.event.severity, Severity::new(5));
    assert_eq!(syslog.event.extensions["severity"].as_str(), Some("bogus"));
    assert!(syslog.warnings.iter().any(|w| w.contains("bogus")));
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn normalize_arbitrary_bytes_does_not_panic(bytes in prop::collection::vec(any::<u8>(), 0..2048)) {
            let _ = Normalizer::default().normalize(&bytes, None);
        }

        #[test]
        fn normalize_with_any_hint_does_not_panic(
            bytes in prop::collection::vec(any::<u8>(), 0..512),
            hint in prop::sample::select(vec!["native", "syslog", "cef", "leef", "raw", "bogus"]),
        ) {
            let _ = Normalizer::default().normalize(&bytes, Some(hint));
        }

        #[test]
        fn cef_extension_values_survive_mapping(value in "[a-zA-Z0-9 ./_-]{1,40}") {
            let value = value.trim().to_owned();
            prop_assume!(!value.is_empty());
            let raw = format!("CEF:0|acme|fw|1.0|1|x|5|rt=1705320000000 cs1={value}");
            let event = Normalizer::default().normalize(raw.as_bytes(), None).unwrap().event;
            prop_assert_eq!(event.extensions["cs1"].as_str(), Some(value.as_str()));
        }

        #[test]
        fn severity_is_always_in_range_under_clamp(severity in -1000i64..1000) {
            let raw = format!(
                r#"{{"class_uid": "1", "time": "2024-01-15T12:00:00Z", "severity": {severity}, "metadata": {{"version": "1.0.0", "product": {{"name": "p"}}}}}}"#
            );
            let event = Normalizer::default().normalize(raw.as_bytes(), None).unwrap().event;
            let value = event.severity.unwrap().value();
            prop_assert!(value <= 10);
        }
    }
}
