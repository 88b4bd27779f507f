//! 공백 구분 `key=value` 확장 필드 분리
//!
//! 값은 다음 ` key=` 토큰 직전까지 이어집니다. 값 안의 공백은 그대로 유지되며,
//! `\=`, `\\`, `\n`, `\r`, `\|` 이스케이프를 해제합니다.

use graphwarden_core::error::ParseError;
use graphwarden_core::types::FormatTag;

use super::malformed;

/// 키로 허용되는 문자
fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '[' | ']')
}

/// `text`를 `(key, value)` 목록으로 분리합니다.
///
/// `base_offset`은 원본 입력 기준 `text`의 시작 위치이며 에러 오프셋에 더해집니다.
pub(crate) fn split_key_values(
    text: &str,
    base_offset: usize,
    format: FormatTag,
    original: &str,
) -> Result<Vec<(String, String)>, ParseError> {
    let text = text.trim_end();
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    // (key_start, eq_pos)
    let mut keys: Vec<(usize, usize)> = Vec::new();
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' => {
                let key_start = text[..i].rfind(' ').map_or(0, |p| p + 1);
                let key = &text[key_start..i];
                let after_prev = keys.last().is_none_or(|&(_, eq)| key_start > eq);
                if !key.is_empty() && after_prev && key.chars().all(is_key_char) {
                    keys.push((key_start, i));
                }
            }
            _ => {}
        }
    }

    let Some(&(first_start, _)) = keys.first() else {
        return Err(malformed(
            format,
            original,
            base_offset,
            "expected key=value pairs",
        ));
    };
    if !text[..first_start].trim().is_empty() {
        return Err(malformed(
            format,
            original,
            base_offset,
            "unexpected text before first key=value pair",
        ));
    }

    let mut pairs = Vec::with_capacity(keys.len());
    for (idx, &(key_start, eq)) in keys.iter().enumerate() {
        let value_end = keys.get(idx + 1).map_or(text.len(), |&(next, _)| next);
        let key = &text[key_start..eq];
        let value = text[eq + 1..value_end].trim_end_matches(' ');
        pairs.push((key.to_owned(), unescape_value(value)));
    }
    Ok(pairs)
}

/// 확장 필드 값의 이스케이프를 해제합니다.
pub(crate) fn unescape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
