//! Syslog 파서 -- RFC 5424 및 RFC 3164 (best-effort)
//!
//! # RFC 5424 메시지 형식
//! ```text
//! <PRI>VERSION TIMESTAMP HOSTNAME APP-NAME PROCID MSGID STRUCTURED-DATA MSG
//! ```
//!
//! # RFC 3164 메시지 형식
//! ```text
//! <PRI>MMM DD HH:MM:SS HOSTNAME TAG[PID]: MSG
//! ```
//!
//! 출력 필드: `facility`, `severity`, `version`, `timestamp`, `hostname`, `app_name`,
//! `procid`, `msgid`, `message`, 그리고 structured data는 `sd.{id}.{param}` 키로 기록합니다.
//! NILVALUE(`-`) 필드는 생략합니다.

use chrono::{DateTime, Datelike, NaiveDateTime, SecondsFormat, Utc};
use graphwarden_core::error::ParseError;
use graphwarden_core::types::{FieldMap, FieldValue, FormatTag};

use super::{FormatParser, decode_text, malformed};

/// 유효한 최대 PRI 값 (facility 23 * 8 + severity 7)
const MAX_SYSLOG_PRI: u16 = 191;

/// Syslog 파서
///
/// ## 지원 기능
/// - PRI 필드에서 facility/severity 디코딩
/// - RFC 3339 타임스탬프 파싱
/// - Structured Data (SD) 추출
/// - NILVALUE (`-`) 처리
/// - RFC 3164 타임스탬프 (현재 연도 가정)
pub struct SyslogParser {
    /// RFC 3164 타임스탬프에 사용할 연도 (테스트용 고정값)
    fixed_year: Option<i32>,
}

impl SyslogParser {
    pub fn new() -> Self {
        Self { fixed_year: None }
    }

    /// RFC 3164 타임스탬프의 연도를 고정합니다.
    pub fn with_year(mut self, year: i32) -> Self {
        self.fixed_year = Some(year);
        self
    }

    /// PRI 값에서 facility와 severity를 분리합니다.
    ///
    /// PRI = facility * 8 + severity
    fn decode_pri(pri: u16) -> (i64, i64) {
        (i64::from(pri / 8), i64::from(pri % 8))
    }

    fn parse_text(&self, input: &str) -> Result<FieldMap, ParseError> {
        let input = input.trim_end_matches(['\r', '\n']);

        if !input.starts_with('<') {
            return Err(malformed(
                FormatTag::Syslog,
                input,
                0,
                "missing PRI field (expected '<')",
            ));
        }

        let pri_end = input
            .find('>')
            .filter(|&end| end <= 4)
            .ok_or_else(|| malformed(FormatTag::Syslog, input, 0, "unterminated PRI field"))?;

        let pri_str = &input[1..pri_end];
        let pri: u16 = pri_str
            .parse()
            .ok()
            .filter(|_| pri_str.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| {
                malformed(
                    FormatTag::Syslog,
                    input,
                    1,
                    &format!("invalid PRI value: '{pri_str}'"),
                )
            })?;

        if pri > MAX_SYSLOG_PRI {
            return Err(malformed(
                FormatTag::Syslog,
                input,
                1,
                &format!("PRI value {pri} out of valid range (0-{MAX_SYSLOG_PRI})"),
            ));
        }

        let (facility, severity) = Self::decode_pri(pri);
        let mut fields = FieldMap::new();
        fields.insert("facility".to_owned(), FieldValue::Integer(facility));
        fields.insert("severity".to_owned(), FieldValue::Integer(severity));

        let body_offset = pri_end + 1;
        let remainder = &input[body_offset..];

        if let Some(body) = remainder.strip_prefix("1 ") {
            fields.insert("version".to_owned(), FieldValue::Integer(1));
            Self::parse_rfc5424_body(input, body, body_offset + 2, &mut fields)?;
        } else {
            self.parse_rfc3164_body(remainder, &mut fields);
        }

        Ok(fields)
    }

    /// RFC 5424 메시지 본문을 파싱합니다.
    ///
    /// 형식: `TIMESTAMP HOSTNAME APP-NAME PROCID MSGID STRUCTURED-DATA MSG`
    fn parse_rfc5424_body(
        input: &str,
        body: &str,
        body_offset: usize,
        fields: &mut FieldMap,
    ) -> Result<(), ParseError> {
        let parts: Vec<&str> = body.splitn(6, ' ').collect();

        if parts.len() < 6 {
            return Err(malformed(
                FormatTag::Syslog,
                input,
                input.len(),
                &format!(
                    "RFC 5424 requires at least 6 fields after version, got {}",
                    parts.len()
                ),
            ));
        }

        if let Some(ts) = nilvalue(parts[0]) {
            let dt = DateTime::parse_from_rfc3339(ts).map_err(|e| {
                malformed(
                    FormatTag::Syslog,
                    input,
                    body_offset,
                    &format!("invalid RFC 3339 timestamp '{ts}': {e}"),
                )
            })?;
            fields.insert(
                "timestamp".to_owned(),
                FieldValue::String(
                    dt.with_timezone(&Utc)
                        .to_rfc3339_opts(SecondsFormat::AutoSi, true),
                ),
            );
        }

        for (key, part) in ["hostname", "app_name", "procid", "msgid"]
            .iter()
            .zip(&parts[1..5])
        {
            if let Some(value) = nilvalue(part) {
                fields.insert((*key).to_owned(), FieldValue::String(value.to_owned()));
            }
        }

        let sd_offset = body_offset + parts[..5].iter().map(|p| p.len() + 1).sum::<usize>();
        let sd_and_msg = parts[5];
        let message = if sd_and_msg.starts_with('[') {
            let (sd_part, msg_part) = split_sd_and_message(sd_and_msg);
            parse_structured_data(input, sd_part, sd_offset, fields)?;
            msg_part
        } else if let Some(msg) = sd_and_msg.strip_prefix("- ") {
            msg
        } else if sd_and_msg == "-" {
            ""
        } else {
            sd_and_msg
        };

        // RFC 5424 6.4: 메시지 앞 BOM 허용
        let message = message.trim_start_matches('\u{feff}');
        if !message.is_empty() {
            fields.insert("message".to_owned(), FieldValue::String(message.to_owned()));
        }
        Ok(())
    }

    /// RFC 3164 (BSD syslog) 메시지 본문을 최선 노력으로 파싱합니다.
    ///
    /// 형식: `MMM DD HH:MM:SS hostname tag[pid]: message`
    /// 타임스탬프를 해석하지 못하면 전체를 메시지로 취급합니다.
    fn parse_rfc3164_body(&self, body: &str, fields: &mut FieldMap) {
        // "Jan  5" 처럼 일자가 한 자리이면 공백이 두 개
        let tokens: Vec<&str> = body.split_whitespace().take(3).collect();
        let timestamp = (tokens.len() == 3)
            .then(|| self.parse_bsd_timestamp(&tokens.join(" ")))
            .flatten();

        let Some(timestamp) = timestamp else {
            if !body.trim().is_empty() {
                fields.insert("message".to_owned(), FieldValue::String(body.trim().to_owned()));
            }
            return;
        };
        fields.insert(
            "timestamp".to_owned(),
            FieldValue::String(timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );

        let rest = skip_tokens(body, 3);
        let (hostname, tag_and_msg) = match rest.split_once(' ') {
            Some((host, tail)) => (host, tail),
            None => (rest, ""),
        };
        if !hostname.is_empty() {
            fields.insert("hostname".to_owned(), FieldValue::String(hostname.to_owned()));
        }

        // tag는 ':' 앞까지, 공백이 먼저 나오면 tag가 없는 메시지
        let colon = tag_and_msg.find(':');
        let space = tag_and_msg.find(' ');
        let (tag, message) = match colon {
            Some(c) if space.is_none_or(|s| c < s) => {
                (&tag_and_msg[..c], tag_and_msg[c + 1..].trim_start())
            }
            _ => ("", tag_and_msg),
        };

        if !tag.is_empty() {
            let (app, pid) = match tag.split_once('[') {
                Some((app, pid)) => (app, pid.strip_suffix(']')),
                None => (tag, None),
            };
            fields.insert("app_name".to_owned(), FieldValue::String(app.to_owned()));
            if let Some(pid) = pid.filter(|p| !p.is_empty()) {
                fields.insert("procid".to_owned(), FieldValue::String(pid.to_owned()));
            }
        }
        if !message.is_empty() {
            fields.insert("message".to_owned(), FieldValue::String(message.to_owned()));
        }
    }

    /// BSD syslog 타임스탬프를 파싱합니다.
    ///
    /// 형식: `MMM DD HH:MM:SS` (예: `Jan 15 12:00:00`)
    /// 연도 정보가 없으므로 현재 연도를 가정합니다.
    fn parse_bsd_timestamp(&self, timestamp: &str) -> Option<DateTime<Utc>> {
        let year = self.fixed_year.unwrap_or_else(|| Utc::now().year());
        NaiveDateTime::parse_from_str(&format!("{year} {timestamp}"), "%Y %b %d %H:%M:%S")
            .ok()
            .map(|dt| dt.and_utc())
    }
}

impl Default for SyslogParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatParser for SyslogParser {
    fn format(&self) -> FormatTag {
        FormatTag::Syslog
    }

    fn parse(&self, raw: &[u8]) -> Result<FieldMap, ParseError> {
        let input = decode_text(FormatTag::Syslog, raw)?;
        self.parse_text(input)
    }
}

/// NILVALUE (`-`)를 `None`으로 변환합니다.
fn nilvalue(value: &str) -> Option<&str> {
    if value == "-" || value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// 공백으로 구분된 앞쪽 토큰 `n`개를 건너뛴 나머지를 반환합니다.
fn skip_tokens(text: &str, n: usize) -> &str {
    let mut rest = text.trim_start();
    for _ in 0..n {
        rest = match rest.find(' ') {
            Some(pos) => rest[pos..].trim_start(),
            None => "",
        };
    }
    rest
}

/// Structured Data 부분과 메시지 부분을 분리합니다.
///
/// SD는 하나 이상의 연속된 `[...]` 블록이며, 그 이후가 메시지입니다.
fn split_sd_and_message(input: &str) -> (&str, &str) {
    let mut in_element = false;
    let mut in_quote = false;
    let mut escaped = false;

    for (idx, ch) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quote => escaped = true,
            '"' if in_element => in_quote = !in_quote,
            '[' if !in_quote && !in_element => in_element = true,
            ']' if !in_quote && in_element => in_element = false,
            _ if !in_element => {
                return (&input[..idx], input[idx..].trim_start());
            }
            _ => {}
        }
    }

    (input, "")
}

/// RFC 5424 Structured Data를 파싱합니다.
///
/// 형식: `[sd-id param1="value1" param2="value2"][sd-id2 ...]`
/// 추출된 파라미터는 `sd.{id}.{param}` 키로 기록됩니다.
fn parse_structured_data(
    input: &str,
    sd: &str,
    sd_offset: usize,
    fields: &mut FieldMap,
) -> Result<(), ParseError> {
    let err = |pos: usize, reason: &str| malformed(FormatTag::Syslog, input, sd_offset + pos, reason);
    let mut chars = sd.char_indices().peekable();

    while let Some((start, ch)) = chars.next() {
        if ch != '[' {
            return Err(err(start, "expected '[' at start of SD-ELEMENT"));
        }

        let mut sd_id = String::new();
        while let Some(&(_, ch)) = chars.peek() {
            if ch == ']' || ch == ' ' {
                break;
            }
            sd_id.push(ch);
            chars.next();
        }
        if sd_id.is_empty() {
            return Err(err(start, "empty SD-ID in structured data"));
        }

        let mut closed = false;
        while let Some((pos, ch)) = chars.next() {
            match ch {
                ']' => {
                    closed = true;
                    break;
                }
                ' ' => continue,
                _ => {}
            }

            let mut param_name = String::from(ch);
            let mut found_eq = false;
            for (_, c) in chars.by_ref() {
                if c == '=' {
                    found_eq = true;
                    break;
                }
                param_name.push(c);
            }
            if !found_eq {
                return Err(err(pos, "SD-PARAM missing '='"));
            }
            if chars.next().map(|(_, c)| c) != Some('"') {
                return Err(err(pos, "SD-PARAM value must be quoted"));
            }

            let mut param_value = String::new();
            let mut escaped = false;
            let mut terminated = false;
            for (_, c) in chars.by_ref() {
                if escaped {
                    param_value.push(c);
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    terminated = true;
                    break;
                } else {
                    param_value.push(c);
                }
            }
            if !terminated {
                return Err(err(pos, "unterminated SD-PARAM value"));
            }

            fields.insert(
                format!("sd.{sd_id}.{param_name}"),
                FieldValue::String(param_value),
            );
        }

        if !closed {
            return Err(err(start, "unterminated SD-ELEMENT"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Result<FieldMap, ParseError> {
        SyslogParser::new().with_year(2024).parse(input.as_bytes())
    }

    fn get<'a>(fields: &'a FieldMap, key: &str) -> &'a FieldValue {
        fields
            .get(key)
            .unwrap_or_else(|| panic!("missing field {key}: {fields:?}"))
    }

    #[test]
    fn decode_pri_splits_facility_and_severity() {
        assert_eq!(SyslogParser::decode_pri(34), (4, 2));
        assert_eq!(SyslogParser::decode_pri(0), (0, 0));
        assert_eq!(SyslogParser::decode_pri(191), (23, 7));
    }

    #[test]
    fn parses_rfc5424_message() {
        let fields =
            parse("<34>1 2024-01-15T12:00:00Z myhost sshd 1234 ID47 - Failed password for root")
                .unwrap();
        assert_eq!(get(&fields, "facility"), &FieldValue::Integer(4));
        assert_eq!(get(&fields, "severity"), &FieldValue::Integer(2));
        assert_eq!(get(&fields, "version"), &FieldValue::Integer(1));
        assert_eq!(get(&fields, "timestamp").as_str(), Some("2024-01-15T12:00:00Z"));
        assert_eq!(get(&fields, "hostname").as_str(), Some("myhost"));
        assert_eq!(get(&fields, "app_name").as_str(), Some("sshd"));
        assert_eq!(get(&fields, "procid").as_str(), Some("1234"));
        assert_eq!(get(&fields, "msgid").as_str(), Some("ID47"));
        assert_eq!(
            get(&fields, "message").as_str(),
            Some("Failed password for root")
        );
    }

    #[test]
    fn timestamp_is_normalized_to_utc() {
        let fields = parse("<13>1 2024-01-15T21:00:00.5+09:00 h a - - - m").unwrap();
        assert_eq!(
            get(&fields, "timestamp").as_str(),
            Some("2024-01-15T12:00:00.500Z")
        );
    }

    #[test]
    fn nilvalues_are_omitted() {
        let fields = parse("<13>1 - - - - - -").unwrap();
        for key in ["timestamp", "hostname", "app_name", "procid", "msgid", "message"] {
            assert!(!fields.contains_key(key), "{key} should be absent");
        }
    }

    #[test]
    fn structured_data_is_flattened() {
        let fields = parse(
            r#"<165>1 2024-01-15T12:00:00Z host app - ID1 [exampleSDID@32473 iut="3" eventSource="App\"X\""][origin ip="10.0.0.1"] BOM message"#,
        )
        .unwrap();
        assert_eq!(get(&fields, "sd.exampleSDID@32473.iut").as_str(), Some("3"));
        assert_eq!(
            get(&fields, "sd.exampleSDID@32473.eventSource").as_str(),
            Some("App\"X\"")
        );
        assert_eq!(get(&fields, "sd.origin.ip").as_str(), Some("10.0.0.1"));
        assert_eq!(get(&fields, "message").as_str(), Some("BOM message"));
    }

    #[test]
    fn structured_data_with_multibyte_message() {
        let fields = parse(r#"<14>1 2024-01-15T12:00:00Z h a - - [x k="값"] 로그인 실패"#).unwrap();
        assert_eq!(get(&fields, "sd.x.k").as_str(), Some("값"));
        assert_eq!(get(&fields, "message").as_str(), Some("로그인 실패"));
    }

    #[test]
    fn unquoted_sd_value_is_malformed() {
        let input = "<14>1 2024-01-15T12:00:00Z h a - - [x k=v] msg";
        let err = parse(input).unwrap_err();
        match err {
            ParseError::MalformedInput { offset, .. } => {
                assert!(offset >= input.find('[').unwrap());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parses_rfc3164_message() {
        let fields =
            parse("<38>Jan 15 12:00:00 web-01 sshd[4242]: Failed password for invalid user admin")
                .unwrap();
        assert_eq!(get(&fields, "timestamp").as_str(), Some("2024-01-15T12:00:00Z"));
        assert_eq!(get(&fields, "hostname").as_str(), Some("web-01"));
        assert_eq!(get(&fields, "app_name").as_str(), Some("sshd"));
        assert_eq!(get(&fields, "procid").as_str(), Some("4242"));
        assert_eq!(
            get(&fields, "message").as_str(),
            Some("Failed password for invalid user admin")
        );
        assert!(!fields.contains_key("version"));
    }

    #[test]
    fn rfc3164_single_digit_day() {
        let fields = parse("<38>Feb  5 01:02:03 host cron: job done").unwrap();
        assert_eq!(get(&fields, "timestamp").as_str(), Some("2024-02-05T01:02:03Z"));
        assert_eq!(get(&fields, "app_name").as_str(), Some("cron"));
    }

    #[test]
    fn rfc3164_without_timestamp_keeps_message() {
        let fields = parse("<38>something happened").unwrap();
        assert!(!fields.contains_key("timestamp"));
        assert_eq!(get(&fields, "message").as_str(), Some("something happened"));
    }

    #[test]
    fn pri_out_of_range_is_malformed() {
        let err = parse("<192>1 - - - - - -").unwrap_err();
        assert!(matches!(err, ParseError::MalformedInput { offset: 1, .. }));
    }

    #[test]
    fn missing_pri_is_malformed() {
        assert!(parse("1 2024-01-15T12:00:00Z host").is_err());
        assert!(parse("<abc>1 - - - - - -").is_err());
        assert!(parse("<34 no close").is_err());
    }

    #[test]
    fn short_rfc5424_is_malformed() {
        assert!(parse("<34>1 2024-01-15T12:00:00Z host").is_err());
    }

    #[test]
    fn invalid_rfc5424_timestamp_is_malformed() {
        let err = parse("<34>1 yesterday host app - - - msg").unwrap_err();
        match err {
            ParseError::MalformedInput { fragment, .. } => {
                assert!(fragment.starts_with("yesterday"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
