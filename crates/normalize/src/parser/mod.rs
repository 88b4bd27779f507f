//! 포맷별 파서 -- 원시 바이트를 포맷 고유 필드 이름의 [`FieldMap`]으로 변환
//!
//! [`ParserRegistry`]는 [`FormatTag`]별로 등록된 [`FormatParser`]를 선택합니다.
//! 파싱 실패는 항상 [`ParseError::MalformedInput`]이며 부분 결과를 반환하지 않습니다.
//!
//! # 지원 형식
//! - 스키마 준수 JSON ([`NativeJsonParser`])
//! - Syslog RFC 5424 / RFC 3164 ([`SyslogParser`])
//! - CEF ([`CefParser`])
//! - LEEF 1.0 / 2.0 ([`LeefParser`])
//!
//! # 사용 예시
//! ```ignore
//! use graphwarden_core::types::FormatTag;
//! use graphwarden_normalize::parser::ParserRegistry;
//!
//! let parsers = ParserRegistry::with_defaults(64 * 1024);
//! let fields = parsers.parse(FormatTag::Cef, b"CEF:0|acme|fw|1.0|100|Blocked|5|src=10.0.0.1")?;
//! assert_eq!(fields["deviceVendor"].as_str(), Some("acme"));
//! ```

pub mod cef;
mod kv;
pub mod leef;
pub mod native;
pub mod syslog;

pub use cef::CefParser;
pub use leef::LeefParser;
pub use native::NativeJsonParser;
pub use syslog::SyslogParser;

use graphwarden_core::error::ParseError;
use graphwarden_core::types::{FieldMap, FormatTag};

/// 기본 최대 입력 크기 (64 KiB)
pub const DEFAULT_MAX_INPUT_SIZE: usize = 64 * 1024;

/// 에러 메시지에 포함할 입력 조각 최대 길이 (문자 수)
const FRAGMENT_LEN: usize = 32;

/// 단일 포맷 파서
///
/// 구현체는 상태가 없어야 하며 여러 태스크에서 공유될 수 있습니다.
pub trait FormatParser: Send + Sync {
    /// 파서가 처리하는 포맷
    fn format(&self) -> FormatTag;

    /// 원시 입력을 파싱합니다. BOM과 앞쪽 공백은 이미 제거된 상태입니다.
    fn parse(&self, raw: &[u8]) -> Result<FieldMap, ParseError>;
}

/// 포맷별 파서 레지스트리
pub struct ParserRegistry {
    parsers: Vec<Box<dyn FormatParser>>,
    max_input_size: usize,
}

impl ParserRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new(max_input_size: usize) -> Self {
        Self {
            parsers: Vec::new(),
            max_input_size,
        }
    }

    /// 네 가지 기본 파서가 등록된 레지스트리를 생성합니다.
    pub fn with_defaults(max_input_size: usize) -> Self {
        Self::new(max_input_size)
            .register(Box::new(NativeJsonParser))
            .register(Box::new(SyslogParser::new()))
            .register(Box::new(CefParser))
            .register(Box::new(LeefParser))
    }

    /// 파서를 등록합니다. 같은 포맷이 이미 있으면 교체합니다.
    pub fn register(mut self, parser: Box<dyn FormatParser>) -> Self {
        self.parsers.retain(|p| p.format() != parser.format());
        self.parsers.push(parser);
        self
    }

    /// 등록된 포맷 목록
    pub fn registered_formats(&self) -> Vec<FormatTag> {
        self.parsers.iter().map(|p| p.format()).collect()
    }

    /// 파서가 등록된 포맷인지 여부
    pub fn supports(&self, format: FormatTag) -> bool {
        self.parsers.iter().any(|p| p.format() == format)
    }

    pub fn max_input_size(&self) -> usize {
        self.max_input_size
    }

    /// 지정된 포맷으로 파싱합니다.
    ///
    /// Native 이외의 포맷이라도 입력이 JSON 객체이면 이미 디코딩된
    /// 구조화 페이로드로 보고 그대로 [`FieldMap`]으로 받아들입니다.
    pub fn parse(&self, format: FormatTag, raw: &[u8]) -> Result<FieldMap, ParseError> {
        if raw.len() > self.max_input_size {
            return Err(ParseError::MalformedInput {
                format: format.as_str().to_owned(),
                offset: 0,
                fragment: fragment_at(&String::from_utf8_lossy(&raw[..FRAGMENT_LEN.min(raw.len())]), 0),
                reason: format!(
                    "input too large: {} bytes (max: {})",
                    raw.len(),
                    self.max_input_size
                ),
            });
        }

        let body = strip_preamble(raw);
        if body.is_empty() {
            return Err(malformed(format, "", 0, "empty input"));
        }

        if format != FormatTag::Native && body.first() == Some(&b'{') {
            return native::parse_object(body, format);
        }

        let parser = self
            .parsers
            .iter()
            .find(|p| p.format() == format)
            .ok_or_else(|| malformed(format, "", 0, "no parser registered for format"))?;
        parser.parse(body)
    }
}

/// UTF-8 BOM과 앞쪽 공백을 제거합니다.
pub fn strip_preamble(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(raw);
    let start = raw
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(raw.len());
    let end = raw
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &raw[start..end.max(start)]
}

/// `offset` 위치부터의 입력 조각을 잘라냅니다. 문자 경계를 지킵니다.
pub(crate) fn fragment_at(input: &str, offset: usize) -> String {
    let mut start = offset.min(input.len());
    while !input.is_char_boundary(start) {
        start -= 1;
    }
    input[start..].chars().take(FRAGMENT_LEN).collect()
}

/// 텍스트 포맷 본문을 UTF-8로 해석합니다.
///
/// 잘못된 바이트열은 대체 문자로 바꾸지 않고, 유효한 마지막 위치를 오프셋으로 보고합니다.
pub(crate) fn decode_text(format: FormatTag, raw: &[u8]) -> Result<&str, ParseError> {
    std::str::from_utf8(raw).map_err(|e| {
        let valid = e.valid_up_to();
        let prefix = std::str::from_utf8(&raw[..valid]).unwrap_or_default();
        malformed(format, prefix, valid, "invalid UTF-8 sequence")
    })
}

/// `MalformedInput` 에러를 생성합니다.
pub(crate) fn malformed(format: FormatTag, input: &str, offset: usize, reason: &str) -> ParseError {
    ParseError::MalformedInput {
        format: format.as_str().to_owned(),
        offset,
        fragment: fragment_at(input, offset),
        reason: reason.to_owned(),
    }
}
