//! CEF (Common Event Format) 파서
//!
//! # 메시지 형식
//! ```text
//! CEF:Version|Device Vendor|Device Product|Device Version|Signature ID|Name|Severity|Extension
//! ```
//!
//! 헤더의 파이프는 `\|`로 이스케이프할 수 있습니다. 확장 필드는 공백으로 구분된
//! `key=value` 쌍입니다. syslog 헤더(`<PRI>...`) 뒤에 오는 CEF 본문도 허용합니다.

use graphwarden_core::error::ParseError;
use graphwarden_core::types::{FieldMap, FieldValue, FormatTag};

use super::kv::split_key_values;
use super::{FormatParser, decode_text, malformed};

/// 헤더 필드 이름 (순서대로)
const HEADER_FIELDS: [&str; 7] = [
    "cefVersion",
    "deviceVendor",
    "deviceProduct",
    "deviceVersion",
    "signatureId",
    "name",
    "severity",
];

const PREFIX: &str = "CEF:";

/// CEF 파서
pub struct CefParser;

impl CefParser {
    fn parse_text(input: &str) -> Result<FieldMap, ParseError> {
        let start = locate_body(input, PREFIX)
            .ok_or_else(|| malformed(FormatTag::Cef, input, 0, "missing 'CEF:' prefix"))?;
        let body = &input[start + PREFIX.len()..];
        let body_offset = start + PREFIX.len();

        let (header, extension_start) = split_header(body, HEADER_FIELDS.len());
        if header.len() < HEADER_FIELDS.len() {
            return Err(malformed(
                FormatTag::Cef,
                input,
                input.len(),
                &format!(
                    "expected {} header fields, got {}",
                    HEADER_FIELDS.len(),
                    header.len()
                ),
            ));
        }

        let mut fields = FieldMap::new();
        for (name, value) in HEADER_FIELDS.iter().zip(header) {
            fields.insert((*name).to_owned(), FieldValue::String(value));
        }

        if let Some(ext_start) = extension_start {
            let extension = &body[ext_start..];
            for (key, value) in
                split_key_values(extension, body_offset + ext_start, FormatTag::Cef, input)?
            {
                fields.insert(key, FieldValue::String(value));
            }
        }

        Ok(fields)
    }
}

impl FormatParser for CefParser {
    fn format(&self) -> FormatTag {
        FormatTag::Cef
    }

    fn parse(&self, raw: &[u8]) -> Result<FieldMap, ParseError> {
        let input = decode_text(FormatTag::Cef, raw)?;
        Self::parse_text(input)
    }
}

/// 본문 시작 위치를 찾습니다.
///
/// 입력이 접두어로 시작하면 0, syslog 헤더 뒤에 접두어가 오면 그 위치입니다.
pub(crate) fn locate_body(input: &str, prefix: &str) -> Option<usize> {
    if input.starts_with(prefix) {
        return Some(0);
    }
    if !input.starts_with('<') {
        return None;
    }
    input
        .match_indices(prefix)
        .map(|(idx, _)| idx)
        .find(|&idx| {
            let preceded = input[..idx]
                .chars()
                .next_back()
                .is_some_and(|c| c == ' ' || c == '>');
            let versioned = input[idx + prefix.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit());
            preceded && versioned
        })
}

/// 이스케이프되지 않은 `|`로 최대 `count`개의 헤더 필드를 분리합니다.
///
/// 반환값: (헤더 필드, 확장 필드 시작 위치). 헤더 필드가 `count`개를 채우고
/// 뒤에 `|`가 있을 때만 확장 필드 위치가 `Some`입니다.
pub(crate) fn split_header(body: &str, count: usize) -> (Vec<String>, Option<usize>) {
    let mut fields = Vec::with_capacity(count);
    let mut current = String::new();
    let mut chars = body.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, next @ ('|' | '\\'))) => current.push(next),
                Some((_, other)) => {
                    current.push('\\');
                    current.push(other);
                }
                None => current.push('\\'),
            },
            '|' => {
                fields.push(std::mem::take(&mut current));
                if fields.len() == count {
                    return (fields, Some(i + 1));
                }
            }
            _ => current.push(c),
        }
    }

    if !current.is_empty() || fields.len() == count - 1 {
        fields.push(current);
    }
    (fields, None)
}
