//! 텍스트 레코드 헤더 파서
//!
//! 한 줄짜리 텍스트 레코드에서 우선순위, 타임스탬프, 호스트명, 프로그램 태그를
//! 떼어내고 나머지를 본문으로 남깁니다.
//!
//! # 지원 형식
//! ```text
//! <PRI>1 TIMESTAMP HOSTNAME APP-NAME PROCID MSGID STRUCTURED-DATA MSG   (RFC 5424)
//! [<PRI>]MMM DD HH:MM:SS HOSTNAME TAG: MSG                              (RFC 3164)
//! [<PRI>]RFC3339-TIMESTAMP HOSTNAME TAG: MSG                            (journalctl short-iso)
//! PRI,SEQ,USEC,FLAGS;MSG                                                (/dev/kmsg)
//! [<PRI>]MSG                                                            (헤더 없음)
//! ```
//!
//! 헤더가 맞지 않으면 실패하지 않고 줄 전체를 본문으로 취급합니다.

use blkwatch_core::types::Severity;

use super::LineFields;
use super::timestamp::{parse_bsd_timestamp, parse_header_timestamp};

/// RFC 5424에서 유효한 최대 PRI 값
/// facility 최댓값 23 * 8 + severity 최댓값 7 = 191
const MAX_SYSLOG_PRI: u8 = 191;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// 텍스트 레코드 헤더 파서
#[derive(Debug, Default, Clone, Copy)]
pub struct SyslogFormat;

impl SyslogFormat {
    /// 형식 이름
    pub fn format_name(&self) -> &'static str {
        "text"
    }

    /// 한 줄을 헤더와 본문으로 나눕니다. 이 단계는 실패하지 않습니다.
    pub fn decode(&self, line: &str) -> LineFields {
        let mut fields = LineFields::default();
        let mut rest = line.trim();

        if let Some((pri, after)) = split_kmsg_prefix(rest) {
            fields.severity = Some(Severity::from_code((pri & 7) as u8));
            fields.facility = u8::try_from(pri >> 3).ok();
            fields.has_header = true;
            fields.body = strip_uptime(after).to_owned();
            return fields;
        }

        let mut has_pri = false;
        if let Some((pri, after)) = split_pri(rest) {
            let (facility, severity) = decode_pri(pri);
            fields.facility = Some(facility);
            fields.severity = Some(Severity::from_code(severity));
            fields.has_header = true;
            has_pri = true;
            rest = after;
        }

        let body = match rest.strip_prefix("1 ") {
            Some(after_version) if has_pri => parse_rfc5424(after_version, &mut fields),
            _ => parse_rfc3164(rest, &mut fields)
                .or_else(|| parse_iso(rest, &mut fields))
                .unwrap_or(rest),
        };

        fields.body = strip_uptime(body).trim().to_owned();
        fields
    }
}

/// PRI 값에서 facility와 severity를 분리합니다.
///
/// PRI = facility * 8 + severity
fn decode_pri(pri: u8) -> (u8, u8) {
    (pri / 8, pri % 8)
}

/// `<NNN>` 접두어를 떼어냅니다. 형식이나 범위가 맞지 않으면 `None`.
fn split_pri(input: &str) -> Option<(u8, &str)> {
    let inner = input.strip_prefix('<')?;
    let end = inner.find('>')?;
    if end == 0 || end > 3 {
        return None;
    }
    let pri: u8 = inner[..end].parse().ok()?;
    if pri > MAX_SYSLOG_PRI {
        return None;
    }
    Some((pri, &inner[end + 1..]))
}

/// `/dev/kmsg` 접두어 `PRI,SEQ,USEC,FLAGS;`를 떼어냅니다.
fn split_kmsg_prefix(input: &str) -> Option<(u32, &str)> {
    let semi = input.find(';')?;
    let prefix = &input[..semi];
    let mut parts = prefix.split(',');
    let pri: u32 = parts.next()?.parse().ok()?;
    let seq = parts.next()?;
    let usec = parts.next()?;
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(seq) || !all_digits(usec) {
        return None;
    }
    Some((pri, &input[semi + 1..]))
}

/// 앞쪽 공백을 건너뛰고 다음 필드와 나머지를 돌려줍니다.
fn next_field(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], &s[i..]),
        None => (s, ""),
    }
}

/// NILVALUE (`-`)를 `None`으로 변환합니다.
fn non_nil(value: &str) -> Option<String> {
    if value.is_empty() || value == "-" {
        None
    } else {
        Some(value.to_owned())
    }
}

/// RFC 5424 메시지 본문을 파싱합니다. 필드가 모자라면 있는 만큼만 채웁니다.
///
/// 형식: `TIMESTAMP HOSTNAME APP-NAME PROCID MSGID STRUCTURED-DATA MSG`
fn parse_rfc5424<'a>(body: &'a str, fields: &mut LineFields) -> &'a str {
    let (timestamp, rest) = next_field(body);
    fields.timestamp = parse_header_timestamp(timestamp);
    let (hostname, rest) = next_field(rest);
    fields.hostname = non_nil(hostname);
    let (app, rest) = next_field(rest);
    fields.app = non_nil(app);
    let (_procid, rest) = next_field(rest);
    let (_msgid, rest) = next_field(rest);

    let sd_and_msg = rest.trim_start();
    if sd_and_msg.starts_with('[') {
        let (sd_part, msg_part) = split_sd_and_message(sd_and_msg);
        match parse_structured_data(sd_part) {
            Some(params) => {
                fields.fields.extend(params);
                msg_part
            }
            None => sd_and_msg,
        }
    } else if let Some(msg) = sd_and_msg.strip_prefix("- ") {
        msg
    } else if sd_and_msg == "-" {
        ""
    } else {
        sd_and_msg
    }
}

/// RFC 3164 (BSD syslog) 헤더를 최선 노력으로 파싱합니다.
///
/// 형식: `MMM DD HH:MM:SS hostname tag: message`
fn parse_rfc3164<'a>(input: &'a str, fields: &mut LineFields) -> Option<&'a str> {
    let (month, rest) = next_field(input);
    if !MONTHS.contains(&month) {
        return None;
    }
    let (day, rest) = next_field(rest);
    let (time, rest) = next_field(rest);
    let timestamp = parse_bsd_timestamp(&format!("{month} {day} {time}"))?;

    fields.timestamp = Some(timestamp);
    fields.has_header = true;
    Some(parse_host_and_tag(rest, fields))
}

/// `RFC3339-TIMESTAMP hostname tag: message` 형식을 파싱합니다.
fn parse_iso<'a>(input: &'a str, fields: &mut LineFields) -> Option<&'a str> {
    let (timestamp, rest) = next_field(input);
    // 날짜로 시작하지 않는 필드는 빠르게 거른다
    if !timestamp.as_bytes().first().is_some_and(u8::is_ascii_digit) || !timestamp.contains('-') {
        return None;
    }
    let timestamp = parse_header_timestamp(timestamp)?;

    fields.timestamp = Some(timestamp);
    fields.has_header = true;
    Some(parse_host_and_tag(rest, fields))
}

fn parse_host_and_tag<'a>(rest: &'a str, fields: &mut LineFields) -> &'a str {
    let (hostname, after_host) = next_field(rest);
    fields.hostname = non_nil(hostname);

    let (tag, after_tag) = next_field(after_host);
    match tag.strip_suffix(':') {
        Some(tag) if !tag.is_empty() => {
            let name = tag.split('[').next().unwrap_or(tag);
            fields.app = non_nil(name);
            after_tag
        }
        _ => after_host,
    }
}

/// 커널 가동 시간 표기 `[  123.456789] `를 떼어냅니다.
fn strip_uptime(body: &str) -> &str {
    let trimmed = body.trim_start();
    let Some(inner) = trimmed.strip_prefix('[') else {
        return body;
    };
    let Some(close) = inner.find(']') else {
        return body;
    };
    let stamp = inner[..close].trim();
    let is_uptime = !stamp.is_empty()
        && stamp.contains('.')
        && stamp.bytes().all(|b| b.is_ascii_digit() || b == b'.');
    if is_uptime {
        inner[close + 1..].trim_start()
    } else {
        body
    }
}

/// Structured Data 부분과 메시지 부분을 분리합니다.
///
/// SD는 하나 이상의 `[...]` 블록으로 구성되며, 그 이후가 메시지입니다.
fn split_sd_and_message(input: &str) -> (&str, &str) {
    let mut in_quote = false;
    let mut escaped = false;
    let mut in_element = false;

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
            c if !in_element && !in_quote => {
                // 요소 사이가 아닌 곳에서 다른 문자가 나오면 메시지 시작
                if c != '[' {
                    return (input[..idx].trim_end(), input[idx..].trim_start());
                }
            }
            _ => {}
        }
    }

    // 닫히지 않은 SD가 있으면 전체를 SD로 간주
    (input, "")
}

/// RFC 5424 Structured Data를 파싱합니다.
///
/// 형식: `[sd-id param1="value1" param2="value2"][sd-id2 ...]`
/// 파라미터 이름을 그대로 키로 사용합니다. 형식이 맞지 않으면 `None`.
fn parse_structured_data(sd: &str) -> Option<Vec<(String, String)>> {
    let mut params = Vec::new();
    let mut chars = sd.chars().peekable();

    while chars.peek().is_some() {
        if chars.next() != Some('[') {
            return None;
        }

        // SD-ID (']' 또는 ' ' 전까지)
        let mut sd_id = String::new();
        while let Some(&ch) = chars.peek() {
            if ch == ']' || ch == ' ' {
                break;
            }
            sd_id.push(ch);
            chars.next();
        }
        if sd_id.is_empty() {
            return None;
        }

        loop {
            match chars.peek() {
                Some(']') => {
                    chars.next();
                    break;
                }
                Some(' ') => {
                    chars.next();
                    continue;
                }
                None => return None,
                _ => {}
            }

            let mut name = String::new();
            while let Some(&ch) = chars.peek() {
                if ch == '=' {
                    break;
                }
                name.push(ch);
                chars.next();
            }
            if chars.next() != Some('=') || chars.next() != Some('"') {
                return None;
            }

            let mut value = String::new();
            let mut escaped = false;
            let mut closed = false;
            for ch in chars.by_ref() {
                if escaped {
                    value.push(ch);
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == '"' {
                    closed = true;
                    break;
                } else {
                    value.push(ch);
                }
            }
            if !closed || name.is_empty() {
                return None;
            }
            params.push((name, value));
        }
    }

    Some(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(line: &str) -> LineFields {
        SyslogFormat.decode(line)
    }

    #[test]
    fn decode_pri_splits_facility_and_severity() {
        assert_eq!(decode_pri(34), (4, 2));
        assert_eq!(decode_pri(0), (0, 0));
        assert_eq!(decode_pri(191), (23, 7));
    }

    #[test]
    fn rfc5424_full_header() {
        let f = decode("<11>1 2024-01-15T12:00:00Z storage01 kernel - - - sd 2:0:0:1: [sdb] offline");
        assert_eq!(f.severity, Some(Severity::Error));
        assert_eq!(f.facility, Some(1));
        assert_eq!(f.hostname.as_deref(), Some("storage01"));
        assert_eq!(f.app.as_deref(), Some("kernel"));
        assert!(f.timestamp.is_some());
        assert_eq!(f.body, "sd 2:0:0:1: [sdb] offline");
        assert!(f.has_header);
    }

    #[test]
    fn rfc5424_structured_data_becomes_fields() {
        let f = decode(
            r#"<27>1 2024-01-15T12:00:00Z h multipathd - - [blk@1 wwid="W1" paths="sdb,sdc"] map up"#,
        );
        assert_eq!(
            f.fields,
            vec![
                ("wwid".to_owned(), "W1".to_owned()),
                ("paths".to_owned(), "sdb,sdc".to_owned())
            ]
        );
        assert_eq!(f.body, "map up");
    }

    #[test]
    fn rfc5424_malformed_sd_is_kept_as_message() {
        let f = decode("<27>1 2024-01-15T12:00:00Z h app - - [oops no-equals] text");
        assert!(f.fields.is_empty());
        assert_eq!(f.body, "[oops no-equals] text");
    }

    #[test]
    fn rfc5424_nil_values() {
        let f = decode("<14>1 - - - - - - hello");
        assert!(f.timestamp.is_none());
        assert!(f.hostname.is_none());
        assert!(f.app.is_none());
        assert_eq!(f.body, "hello");
    }

    #[test]
    fn rfc5424_truncated_header_keeps_what_it_has() {
        let f = decode("<14>1 2024-01-15T12:00:00Z host");
        assert_eq!(f.hostname.as_deref(), Some("host"));
        assert_eq!(f.body, "");
    }

    #[test]
    fn rfc3164_header_with_pid_tag() {
        let f = decode("<30>Jan 15 12:00:00 storage01 multipathd[812]: mpatha: load table");
        assert_eq!(f.severity, Some(Severity::Info));
        assert_eq!(f.hostname.as_deref(), Some("storage01"));
        assert_eq!(f.app.as_deref(), Some("multipathd"));
        assert_eq!(f.body, "mpatha: load table");
    }

    #[test]
    fn rfc3164_without_pri() {
        let f = decode("Mar  3 08:15:01 host kernel: [  12.345678] sd 0:0:0:0: [sda] Spinning up disk...");
        assert!(f.severity.is_none());
        assert_eq!(f.app.as_deref(), Some("kernel"));
        assert_eq!(f.body, "sd 0:0:0:0: [sda] Spinning up disk...");
    }

    #[test]
    fn iso_header_like_journalctl() {
        let f = decode("2024-01-15T12:00:00+0000 storage01 kernel: device-mapper: multipath: Failing path 8:16.");
        assert_eq!(f.hostname.as_deref(), Some("storage01"));
        assert_eq!(f.app.as_deref(), Some("kernel"));
        assert_eq!(f.body, "device-mapper: multipath: Failing path 8:16.");
    }

    #[test]
    fn kmsg_prefix() {
        let f = decode("3,1234,5678901,-;sd 2:0:0:1: [sdb] tag#0 Sense Key : Medium Error [current]");
        assert_eq!(f.severity, Some(Severity::Error));
        assert_eq!(f.facility, Some(0));
        assert!(f.timestamp.is_none());
        assert!(f.body.starts_with("sd 2:0:0:1: [sdb]"));
    }

    #[test]
    fn plain_line_is_all_body() {
        let f = decode("sdb: sdb1 sdb2");
        assert!(!f.has_header);
        assert!(f.severity.is_none());
        assert_eq!(f.body, "sdb: sdb1 sdb2");
    }

    #[test]
    fn invalid_pri_is_treated_as_body() {
        let f = decode("<999>hello");
        assert!(f.severity.is_none());
        assert_eq!(f.body, "<999>hello");
    }

    #[test]
    fn pri_only_header_keeps_body() {
        let f = decode("<12>device-mapper: thin: 253:3: reached low water mark");
        assert_eq!(f.severity, Some(Severity::Warning));
        assert_eq!(f.body, "device-mapper: thin: 253:3: reached low water mark");
    }

    #[test]
    fn uptime_strip_leaves_non_uptime_brackets() {
        assert_eq!(strip_uptime("[sdb] foo"), "[sdb] foo");
        assert_eq!(strip_uptime("[ 1.5] foo"), "foo");
    }

    #[test]
    fn split_sd_handles_multiple_elements() {
        let (sd, msg) = split_sd_and_message(r#"[a x="1"][b y="]"] rest of msg"#);
        assert_eq!(sd, r#"[a x="1"][b y="]"]"#);
        assert_eq!(msg, "rest of msg");
    }
}
