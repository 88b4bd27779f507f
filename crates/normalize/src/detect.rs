//! 포맷 감지기 -- 힌트 또는 내용 스니핑으로 입력 포맷을 결정
//!
//! 힌트가 등록된 파서의 포맷을 가리키면 스니핑 없이 신뢰합니다.
//! 그렇지 않으면 다음 순서로 판별합니다.
//!
//! 1. `class_uid` 키를 가진 JSON 객체 → Native
//! 2. `<PRI>`로 시작 → Syslog (단, 뒤에 CEF/LEEF 본문이 오면 해당 포맷)
//! 3. `CEF:` 접두어 → CEF
//! 4. `LEEF:` 접두어 → LEEF
//! 5. 그 외 → `UnrecognizedFormat`
//!
//! `class_uid`가 없는 JSON 객체는 키 이름으로 구조화 페이로드의 포맷을 추정합니다.

use graphwarden_core::error::ParseError;
use graphwarden_core::types::FormatTag;

use crate::parser::cef::locate_body;
use crate::parser::strip_preamble;

/// 미리보기 최대 길이 (문자 수)
const PREVIEW_LEN: usize = 64;

const CEF_KEYS: [&str; 3] = ["deviceVendor", "deviceProduct", "deviceVersion"];
const LEEF_KEYS: [&str; 3] = ["devname", "devtime", "devtype"];
const SYSLOG_KEYS: [&str; 3] = ["facility", "timestamp", "hostname"];

/// 포맷 감지기
#[derive(Debug, Clone)]
pub struct FormatDetector {
    supported: Vec<FormatTag>,
}

impl FormatDetector {
    /// 지정된 포맷만 힌트로 신뢰하는 감지기를 생성합니다.
    pub fn new(supported: Vec<FormatTag>) -> Self {
        Self { supported }
    }

    /// 입력 포맷을 결정합니다.
    pub fn detect(&self, raw: &[u8], hint: Option<&str>) -> Result<FormatTag, ParseError> {
        if let Some(tag) = hint
            .and_then(FormatTag::from_hint)
            .filter(|tag| self.supported.contains(tag))
        {
            return Ok(tag);
        }
        if let Some(hint) = hint.filter(|h| !h.trim().is_empty() && !h.eq_ignore_ascii_case("raw"))
        {
            tracing::debug!(hint, "unknown format hint, sniffing instead");
        }
        sniff(raw).ok_or_else(|| ParseError::UnrecognizedFormat {
            preview: preview(raw),
        })
    }
}

impl Default for FormatDetector {
    fn default() -> Self {
        Self::new(FormatTag::ALL.to_vec())
    }
}

/// 내용으로 포맷을 추정합니다.
fn sniff(raw: &[u8]) -> Option<FormatTag> {
    let body = strip_preamble(raw);
    match body.first()? {
        b'{' => sniff_json(body),
        b'<' if has_pri(body) => {
            // 잘못된 UTF-8 뒤쪽은 보지 않는다. 파서가 해당 오프셋으로 거부한다.
            let text = match std::str::from_utf8(body) {
                Ok(text) => text,
                Err(e) => {
                    tracing::debug!(offset = e.valid_up_to(), "invalid UTF-8 while sniffing");
                    std::str::from_utf8(&body[..e.valid_up_to()]).unwrap_or_default()
                }
            };
            if locate_body(text, "CEF:").is_some() {
                Some(FormatTag::Cef)
            } else if locate_body(text, "LEEF:").is_some() {
                Some(FormatTag::Leef)
            } else {
                Some(FormatTag::Syslog)
            }
        }
        _ if body.starts_with(b"CEF:") => Some(FormatTag::Cef),
        _ if body.starts_with(b"LEEF:") => Some(FormatTag::Leef),
        _ => None,
    }
}

fn sniff_json(body: &[u8]) -> Option<FormatTag> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let object = value.as_object()?;
    let has_any = |keys: &[&str]| keys.iter().any(|k| object.contains_key(*k));

    if object.contains_key("class_uid") {
        Some(FormatTag::Native)
    } else if has_any(&CEF_KEYS) {
        Some(FormatTag::Cef)
    } else if has_any(&LEEF_KEYS) {
        Some(FormatTag::Leef)
    } else if has_any(&SYSLOG_KEYS) {
        Some(FormatTag::Syslog)
    } else {
        None
    }
}

/// `<` 뒤에 1–3자리 숫자와 `>`가 오는지 확인합니다.
fn has_pri(body: &[u8]) -> bool {
    let digits = body[1..]
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();
    (1..=3).contains(&digits) && body.get(1 + digits) == Some(&b'>')
}

fn preview(raw: &[u8]) -> String {
    String::from_utf8_lossy(strip_preamble(raw))
        .chars()
        .take(PREVIEW_LEN)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(raw: &str, hint: Option<&str>) -> Result<FormatTag, ParseError> {
        FormatDetector::default().detect(raw.as_bytes(), hint)
    }

    #[test]
    fn sniffs_each_format() {
        assert_eq!(
            detect(r#"{"class_uid": 3002, "time": "2024-01-15T12:00:00Z"}"#, None).unwrap(),
            FormatTag::Native
        );
        assert_eq!(
            detect("<34>1 2024-01-15T12:00:00Z host sshd - - - msg", None).unwrap(),
            FormatTag::Syslog
        );
        assert_eq!(
            detect("CEF:0|acme|fw|1.0|1|blocked|5|src=1.2.3.4", None).unwrap(),
            FormatTag::Cef
        );
        assert_eq!(
            detect("LEEF:1.0|acme|ids|1.0|77|src=1.2.3.4", None).unwrap(),
            FormatTag::Leef
        );
    }

    #[test]
    fn hint_is_trusted_without_sniffing() {
        assert_eq!(
            detect("whatever", Some("cef")).unwrap(),
            FormatTag::Cef
        );
        assert_eq!(
            detect("whatever", Some("OCSF")).unwrap(),
            FormatTag::Native
        );
    }

    #[test]
    fn raw_empty_and_unknown_hints_fall_back_to_sniffing() {
        for hint in [Some("raw"), Some(""), Some("xml"), None] {
            assert_eq!(
                detect("CEF:0|a|b|c|d|e|1|", hint).unwrap(),
                FormatTag::Cef,
                "hint {hint:?}"
            );
        }
    }

    #[test]
    fn hint_for_unsupported_parser_is_not_trusted() {
        let detector = FormatDetector::new(vec![FormatTag::Syslog]);
        assert_eq!(
            detector.detect(b"CEF:0|a|b|c|d|e|1|", Some("cef")).unwrap(),
            FormatTag::Cef
        );
    }

    #[test]
    fn syslog_framed_payload_format_wins() {
        assert_eq!(
            detect("<134>Feb 14 19:04:54 fw01 CEF:0|acme|fw|1.0|1|x|5|", None).unwrap(),
            FormatTag::Cef
        );
        assert_eq!(
            detect("<134>1 2024-01-15T12:00:00Z fw01 qradar - - - LEEF:2.0|a|b|c|d|", None)
                .unwrap(),
            FormatTag::Leef
        );
    }

    #[test]
    fn syslog_message_mentioning_cef_stays_syslog() {
        assert_eq!(
            detect("<13>Jan 1 00:00:00 h app: parsing CEF:x failed", None).unwrap(),
            FormatTag::Syslog
        );
    }

    #[test]
    fn bom_and_whitespace_are_ignored() {
        assert_eq!(
            detect("\u{feff}  \n<13>1 - - - - - -", None).unwrap(),
            FormatTag::Syslog
        );
    }

    #[test]
    fn structured_json_payloads_are_recognized() {
        assert_eq!(
            detect(r#"{"deviceVendor": "acme", "src": "1.2.3.4"}"#, None).unwrap(),
            FormatTag::Cef
        );
        assert_eq!(
            detect(r#"{"devname": "fw", "devtime": "x"}"#, None).unwrap(),
            FormatTag::Leef
        );
        assert_eq!(
            detect(r#"{"hostname": "web-01", "message": "hi"}"#, None).unwrap(),
            FormatTag::Syslog
        );
    }

    #[test]
    fn invalid_utf8_still_sniffs_the_valid_prefix() {
        let detector = FormatDetector::default();
        assert_eq!(
            detector
                .detect(b"<134>Feb 14 19:04:54 fw01 CEF:0|acme|fw|1.0|1|x|5|msg=\xff", None)
                .unwrap(),
            FormatTag::Cef
        );
        assert_eq!(
            detector.detect(b"<13>Jan 1 00:00:00 h \xffCEF:0|a", None).unwrap(),
            FormatTag::Syslog
        );
    }

    #[test]
    fn unrecognized_input_reports_preview() {
        let err = detect("hello world", None).unwrap_err();
        match err {
            ParseError::UnrecognizedFormat { preview } => assert_eq!(preview, "hello world"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(detect(r#"{"foo": 1}"#, None).is_err());
        assert!(detect("<html>", None).is_err());
        assert!(detect("", None).is_err());
    }
}
