//! 시각 값 해석
//!
//! 지원 형식: epoch 밀리초 (정수 또는 숫자 문자열), RFC 3339,
//! `MMM dd yyyy HH:mm:ss[.SSS]`, 그리고 Java 스타일 포맷 문자열(LEEF `devTimeFormat`).

use chrono::{DateTime, NaiveDateTime, Utc};
use graphwarden_core::types::FieldValue;

/// 타임존 없는 형식으로 시도할 기본 포맷 목록 (UTC로 간주)
const NAIVE_FORMATS: [&str; 4] = [
    "%b %d %Y %H:%M:%S%.f",
    "%b %d %Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// 필드 값을 UTC 시각으로 해석합니다.
///
/// `java_format`이 주어지면 먼저 해당 포맷으로 시도합니다.
pub(crate) fn parse_time(value: &FieldValue, java_format: Option<&str>) -> Option<DateTime<Utc>> {
    match value {
        FieldValue::Integer(millis) => DateTime::from_timestamp_millis(*millis),
        FieldValue::Float(f) if f.is_finite() => DateTime::from_timestamp_millis(*f as i64),
        FieldValue::String(s) => parse_time_str(s.trim(), java_format),
        _ => None,
    }
}

fn parse_time_str(text: &str, java_format: Option<&str>) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }

    if let Some(format) = java_format.map(java_to_chrono) {
        if let Ok(dt) = DateTime::parse_from_str(text, &format) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, &format) {
            return Some(dt.and_utc());
        }
    }

    if text.bytes().all(|b| b.is_ascii_digit()) {
        return text
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|dt| dt.and_utc())
}

/// Java `SimpleDateFormat` 토큰을 chrono 포맷으로 변환합니다.
///
/// 지원 토큰: `yyyy yy MMM MM dd d HH H hh mm ss SSS a Z z`, 작은따옴표 리터럴
fn java_to_chrono(pattern: &str) -> String {
    const TOKENS: [(&str, &str); 15] = [
        ("yyyy", "%Y"),
        ("SSS", "%3f"),
        ("MMM", "%b"),
        ("yy", "%y"),
        ("MM", "%m"),
        ("dd", "%d"),
        ("HH", "%H"),
        ("hh", "%I"),
        ("mm", "%M"),
        ("ss", "%S"),
        ("d", "%d"),
        ("H", "%H"),
        ("a", "%p"),
        ("Z", "%z"),
        ("z", "%Z"),
    ];

    let mut out = String::with_capacity(pattern.len() * 2);
    let mut rest = pattern;
    'outer: while let Some(c) = rest.chars().next() {
        for (token, replacement) in TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(replacement);
                rest = tail;
                continue 'outer;
            }
        }
        if c == '\'' {
            // 따옴표 안은 리터럴
            let tail = &rest[1..];
            let end = tail.find('\'').unwrap_or(tail.len());
            out.push_str(&tail[..end].replace('%', "%%"));
            rest = tail.get(end + 1..).unwrap_or("");
            continue;
        }
        if c == '%' {
            out.push_str("%%");
        } else {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(text: &str) -> DateTime<Utc> {
        text.parse().unwrap()
    }

    #[test]
    fn epoch_millis_integer_and_string() {
        let expected = ts("2024-01-15T12:00:00Z");
        assert_eq!(
            parse_time(&FieldValue::Integer(1_705_320_000_000), None),
            Some(expected)
        );
        assert_eq!(
            parse_time(&FieldValue::String("1705320000000".into()), None),
            Some(expected)
        );
    }

    #[test]
    fn rfc3339_with_offset_is_converted_to_utc() {
        assert_eq!(
            parse_time(&"2024-01-15T21:00:00+09:00".into(), None),
            Some(ts("2024-01-15T12:00:00Z"))
        );
    }

    #[test]
    fn cef_receipt_time_format() {
        assert_eq!(
            parse_time(&"Jan 15 2024 12:00:00".into(), None),
            Some(ts("2024-01-15T12:00:00Z"))
        );
        assert_eq!(
            parse_time(&"Jan 15 2024 12:00:00.250".into(), None),
            Some(ts("2024-01-15T12:00:00.250Z"))
        );
    }

    #[test]
    fn java_format_is_honored() {
        assert_eq!(
            parse_time(&"15/01/2024 12:00:00".into(), Some("dd/MM/yyyy HH:mm:ss")),
            Some(ts("2024-01-15T12:00:00Z"))
        );
    }

    #[test]
    fn java_to_chrono_tokens() {
        assert_eq!(java_to_chrono("MMM dd yyyy HH:mm:ss"), "%b %d %Y %H:%M:%S");
        assert_eq!(java_to_chrono("yyyy-MM-dd'T'HH"), "%Y-%m-%dT%H");
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_time(&"yesterday".into(), None), None);
        assert_eq!(parse_time(&FieldValue::Bool(true), None), None);
        assert_eq!(parse_time(&"".into(), None), None);
    }
}
