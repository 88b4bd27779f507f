//! 네이티브 JSON 파서
//!
//! 스키마 준수 JSON 객체를 그대로 중첩 [`FieldMap`]으로 변환합니다.
//! 정수는 `Integer`, 그 밖의 숫자는 `Float`, 배열은 `List`가 되며 `null`은 제거됩니다.

use graphwarden_core::error::ParseError;
use graphwarden_core::types::{FieldMap, FieldValue, FormatTag};

use super::{FormatParser, malformed};

/// 네이티브 JSON 파서
pub struct NativeJsonParser;

impl FormatParser for NativeJsonParser {
    fn format(&self) -> FormatTag {
        FormatTag::Native
    }

    fn parse(&self, raw: &[u8]) -> Result<FieldMap, ParseError> {
        parse_object(raw, FormatTag::Native)
    }
}

/// JSON 객체를 [`FieldMap`]으로 파싱합니다.
///
/// 구조화 페이로드 처리에서도 사용하므로 에러에 기록할 포맷을 인자로 받습니다.
pub(crate) fn parse_object(raw: &[u8], format: FormatTag) -> Result<FieldMap, ParseError> {
    let value: serde_json::Value = serde_json::from_slice(raw).map_err(|e| {
        let text = String::from_utf8_lossy(raw);
        let offset = line_column_to_offset(&text, e.line(), e.column());
        malformed(format, &text, offset, &e.to_string())
    })?;

    match FieldValue::from_json(value) {
        Some(FieldValue::Map(map)) => Ok(map),
        _ => Err(malformed(
            format,
            &String::from_utf8_lossy(raw),
            0,
            "expected JSON object at top level",
        )),
    }
}

/// serde_json의 (line, column)을 바이트 오프셋으로 변환합니다.
///
/// column은 1부터 시작하며 0이면 줄의 시작을 의미합니다.
fn line_column_to_offset(text: &str, line: usize, column: usize) -> usize {
    let line_start: usize = text
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    (line_start + column.saturating_sub(1)).min(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_object() {
        let fields = NativeJsonParser
            .parse(
                br#"{"class_uid": 3002, "time": "2024-01-15T12:00:00Z", "metadata": {"version": "1.0.0", "product": {"name": "okta"}}, "score": 0.5, "tags": ["a", null, "b"], "gone": null}"#,
            )
            .unwrap();
        assert_eq!(fields["class_uid"], FieldValue::Integer(3002));
        assert_eq!(fields["score"], FieldValue::Float(0.5));
        assert_eq!(
            fields["tags"],
            FieldValue::List(vec!["a".into(), "b".into()])
        );
        assert!(!fields.contains_key("gone"));
        let metadata = fields["metadata"].as_map().unwrap();
        assert_eq!(metadata["version"].as_str(), Some("1.0.0"));
    }

    #[test]
    fn non_object_is_malformed() {
        let err = NativeJsonParser.parse(b"[1, 2, 3]").unwrap_err();
        assert!(matches!(err, ParseError::MalformedInput { offset: 0, .. }));
    }

    #[test]
    fn syntax_error_reports_byte_offset() {
        let input = br#"{"class_uid": 1, "time": }"#;
        let err = NativeJsonParser.parse(input).unwrap_err();
        match err {
            ParseError::MalformedInput { offset, format, .. } => {
                assert_eq!(format, "native");
                assert_eq!(input[offset], b'}');
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn offset_accounts_for_previous_lines() {
        let text = "{\n  \"a\": 1,\n  oops\n}";
        let offset = line_column_to_offset(text, 3, 3);
        assert_eq!(&text[offset..offset + 4], "oops");
    }
}
