//! LEEF (Log Event Extended Format) 파서
//!
//! # 메시지 형식
//! ```text
//! LEEF:1.0|Vendor|Product|Version|EventID|key1=value1<TAB>key2=value2
//! LEEF:2.0|Vendor|Product|Version|EventID|DelimiterChar|key1=value1^key2=value2
//! ```
//!
//! LEEF 2.0의 구분자 필드는 단일 문자 또는 `0xNN`/`xNN` 16진 코드입니다.
//! 구분자가 지정되지 않으면 TAB을 사용하며, 입력에 TAB이 없으면
//! 공백 구분 `key=value` 형식으로 해석합니다.

use graphwarden_core::error::ParseError;
use graphwarden_core::types::{FieldMap, FieldValue, FormatTag};

use super::cef::{locate_body, split_header};
use super::kv::{split_key_values, unescape_value};
use super::{FormatParser, decode_text, malformed};

const HEADER_FIELDS: [&str; 5] = ["leefVersion", "vendor", "product", "version", "eventId"];

const PREFIX: &str = "LEEF:";

const DEFAULT_DELIMITER: char = '\t';

/// LEEF 파서
pub struct LeefParser;

impl LeefParser {
    fn parse_text(input: &str) -> Result<FieldMap, ParseError> {
        let start = locate_body(input, PREFIX)
            .ok_or_else(|| malformed(FormatTag::Leef, input, 0, "missing 'LEEF:' prefix"))?;
        let body_offset = start + PREFIX.len();
        let body = &input[body_offset..];

        let (header, rest_start) = split_header(body, HEADER_FIELDS.len());
        if header.len() < HEADER_FIELDS.len() {
            return Err(malformed(
                FormatTag::Leef,
                input,
                input.len(),
                &format!(
                    "expected {} header fields, got {}",
                    HEADER_FIELDS.len(),
                    header.len()
                ),
            ));
        }

        let is_v2 = header[0].trim().starts_with('2');
        let mut fields = FieldMap::new();
        for (name, value) in HEADER_FIELDS.iter().zip(header) {
            fields.insert((*name).to_owned(), FieldValue::String(value));
        }

        let Some(rest_start) = rest_start else {
            return Ok(fields);
        };
        let mut attr_start = rest_start;
        let mut delimiter = None;

        if is_v2 {
            let rest = &body[rest_start..];
            if let Some(pipe) = rest.find('|') {
                let spec = &rest[..pipe];
                match parse_delimiter(spec) {
                    Some(d) => {
                        delimiter = Some(d);
                        attr_start = rest_start + pipe + 1;
                    }
                    None if spec.contains('=') => {}
                    None => {
                        return Err(malformed(
                            FormatTag::Leef,
                            input,
                            body_offset + rest_start,
                            &format!("invalid delimiter specification '{spec}'"),
                        ));
                    }
                }
            }
        }

        let attributes = &body[attr_start..];
        let attr_offset = body_offset + attr_start;
        let pairs = match delimiter {
            Some(d) => split_delimited(attributes, d, attr_offset, input)?,
            None if attributes.contains(DEFAULT_DELIMITER) => {
                split_delimited(attributes, DEFAULT_DELIMITER, attr_offset, input)?
            }
            None => split_key_values(attributes, attr_offset, FormatTag::Leef, input)?,
        };

        for (key, value) in pairs {
            fields.insert(key, FieldValue::String(value));
        }
        if let Some(d) = delimiter {
            fields.insert("delimiter".to_owned(), FieldValue::String(d.to_string()));
        }
        Ok(fields)
    }
}

impl FormatParser for LeefParser {
    fn format(&self) -> FormatTag {
        FormatTag::Leef
    }

    fn parse(&self, raw: &[u8]) -> Result<FieldMap, ParseError> {
        let input = decode_text(FormatTag::Leef, raw)?;
        Self::parse_text(input)
    }
}

/// LEEF 2.0 구분자 필드를 해석합니다.
fn parse_delimiter(spec: &str) -> Option<char> {
    let hex = spec
        .strip_prefix("0x")
        .or_else(|| spec.strip_prefix("0X"))
        .or_else(|| spec.strip_prefix('x'))
        .or_else(|| spec.strip_prefix('X'));
    if let Some(hex) = hex.filter(|h| !h.is_empty() && h.len() <= 4) {
        return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
    }
    let mut chars = spec.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c != '=' => Some(c),
        _ => None,
    }
}

/// 구분자로 속성을 분리합니다. 빈 조각은 무시합니다.
fn split_delimited(
    attributes: &str,
    delimiter: char,
    base_offset: usize,
    input: &str,
) -> Result<Vec<(String, String)>, ParseError> {
    let mut pairs = Vec::new();
    let mut offset = base_offset;
    for segment in attributes.split(delimiter) {
        let trimmed = segment.trim();
        if !trimmed.is_empty() {
            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(malformed(
                    FormatTag::Leef,
                    input,
                    offset,
                    "attribute is not a key=value pair",
                ));
            };
            if key.trim().is_empty() {
                return Err(malformed(FormatTag::Leef, input, offset, "empty attribute key"));
            }
            pairs.push((key.trim().to_owned(), unescape_value(value)));
        }
        offset += segment.len() + delimiter.len_utf8();
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Result<FieldMap, ParseError> {
        LeefParser.parse(input.as_bytes())
    }

    fn get<'a>(fields: &'a FieldMap, key: &str) -> &'a str {
        fields[key].as_str().unwrap()
    }

    #[test]
    fn parses_leef_1_tab_delimited() {
        let fields = parse(
            "LEEF:1.0|Microsoft|MSExchange|4.0 SP1|15345|src=192.0.2.0\tdst=172.50.123.1\tsev=5\tusrName=joe.black",
        )
        .unwrap();
        assert_eq!(get(&fields, "leefVersion"), "1.0");
        assert_eq!(get(&fields, "vendor"), "Microsoft");
        assert_eq!(get(&fields, "eventId"), "15345");
        assert_eq!(get(&fields, "src"), "192.0.2.0");
        assert_eq!(get(&fields, "usrName"), "joe.black");
    }

    #[test]
    fn parses_leef_2_with_caret_delimiter() {
        let fields =
            parse("LEEF:2.0|Lancope|StealthWatch|1.0|41|^|src=10.0.1.8^dst=10.0.0.5^sev=5")
                .unwrap();
        assert_eq!(get(&fields, "src"), "10.0.1.8");
        assert_eq!(get(&fields, "dst"), "10.0.0.5");
        assert_eq!(get(&fields, "delimiter"), "^");
    }

    #[test]
    fn parses_leef_2_with_hex_delimiter() {
        let fields = parse("LEEF:2.0|acme|ids|2.1|77|0x5E|src=10.0.0.1^sev=8").unwrap();
        assert_eq!(get(&fields, "sev"), "8");

        let fields = parse("LEEF:2.0|acme|ids|2.1|77|x7C|src=10.0.0.1|sev=8").unwrap();
        assert_eq!(get(&fields, "src"), "10.0.0.1");
        assert_eq!(get(&fields, "sev"), "8");
    }

    #[test]
    fn leef_2_without_delimiter_field_defaults_to_tab() {
        let fields = parse("LEEF:2.0|acme|ids|2.1|77|src=10.0.0.1\tsev=3").unwrap();
        assert_eq!(get(&fields, "sev"), "3");
        assert!(!fields.contains_key("delimiter"));
    }

    #[test]
    fn space_separated_attributes_are_accepted() {
        let fields = parse("LEEF:1.0|acme|ids|2.1|77|src=10.0.0.1 usrName=alice").unwrap();
        assert_eq!(get(&fields, "usrName"), "alice");
    }

    #[test]
    fn header_only_is_accepted() {
        let fields = parse("LEEF:1.0|acme|ids|2.1|77").unwrap();
        assert_eq!(fields.len(), HEADER_FIELDS.len());
    }

    #[test]
    fn too_few_header_fields_is_malformed() {
        let err = parse("LEEF:1.0|acme|ids").unwrap_err();
        assert!(matches!(err, ParseError::MalformedInput { ref format, .. } if format == "leef"));
    }

    #[test]
    fn attribute_without_equals_is_malformed() {
        let input = "LEEF:1.0|acme|ids|2.1|77|src=10.0.0.1\tbroken";
        let err = parse(input).unwrap_err();
        match err {
            ParseError::MalformedInput { offset, .. } => {
                assert_eq!(offset, input.find("broken").unwrap());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_delimiter_variants() {
        assert_eq!(parse_delimiter("^"), Some('^'));
        assert_eq!(parse_delimiter("0x09"), Some('\t'));
        assert_eq!(parse_delimiter("x5E"), Some('^'));
        assert_eq!(parse_delimiter("ab"), None);
    }
}
