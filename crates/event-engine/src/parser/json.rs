//! JSON 레코드 파서
//!
//! 한 줄짜리 JSON 객체 레코드를 [`LineFields`]로 변환합니다.
//! 블록 장치 정보는 `block` 하위 객체로 받습니다.
//!
//! # 예시
//! ```text
//! {"hostname":"storage01","severity":"err","message":"path down",
//!  "block":{"wwid":"W1","path":"/dev/sdb","owners":["MPATH1"]}}
//! ```
//!
//! JSON으로 해석되지 않는 줄은 `None`을 돌려주고 텍스트 파서로 넘어갑니다.

use serde_json::Value;
use tracing::debug;

use super::LineFields;
use super::timestamp::parse_header_timestamp;

/// 헤더 역할을 하는 키 (필드로 넘기지 않음)
const HOSTNAME_KEYS: [&str; 2] = ["hostname", "host"];
const MESSAGE_KEYS: [&str; 2] = ["message", "msg"];
const APP_KEYS: [&str; 3] = ["app", "process", "tag"];

/// JSON 레코드 파서
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormat;

impl JsonFormat {
    /// 형식 이름
    pub fn format_name(&self) -> &'static str {
        "json"
    }

    /// JSON 객체 한 줄을 해석합니다. JSON 객체가 아니면 `None`.
    pub fn decode(&self, line: &str) -> Option<LineFields> {
        let line = line.trim();
        if !line.starts_with('{') {
            return None;
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "brace-prefixed line is not JSON, falling back to text");
                return None;
            }
        };
        let object = value.as_object()?;

        let mut fields = LineFields {
            has_header: true,
            ..LineFields::default()
        };

        for (key, val) in object {
            let key = key.as_str();
            if HOSTNAME_KEYS.contains(&key) {
                fields.hostname = scalar_to_string(val);
            } else if MESSAGE_KEYS.contains(&key) {
                fields.body = scalar_to_string(val).unwrap_or_default();
            } else if APP_KEYS.contains(&key) {
                fields.app = scalar_to_string(val);
            } else if key == "timestamp" {
                fields.timestamp = scalar_to_string(val)
                    .as_deref()
                    .and_then(parse_header_timestamp);
            } else if key == "raw_message" {
                fields.raw_message = scalar_to_string(val);
            } else if key == "block" {
                if let Some(block) = val.as_object() {
                    for (bkey, bval) in block {
                        if let Some(s) = value_to_field(bval) {
                            fields.fields.push((bkey.clone(), s));
                        }
                    }
                }
            } else if let Some(s) = value_to_field(val) {
                fields.fields.push((key.to_owned(), s));
            }
        }

        Some(fields)
    }
}

/// 문자열/숫자/불리언을 문자열로 변환합니다.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// 스칼라 또는 스칼라 배열(쉼표로 연결)을 필드 값으로 변환합니다.
fn value_to_field(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => {
            let joined: Vec<String> = items.iter().filter_map(scalar_to_string).collect();
            if joined.is_empty() {
                None
            } else {
                Some(joined.join(","))
            }
        }
        Value::Null => None,
        other => scalar_to_string(other).filter(|s| !s.is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_flat_object() {
        let f = JsonFormat
            .decode(r#"{"host":"web-01","severity":"err","message":"path down","timestamp":"2024-01-15T12:00:00Z"}"#)
            .unwrap();
        assert_eq!(f.hostname.as_deref(), Some("web-01"));
        assert_eq!(f.body, "path down");
        assert!(f.timestamp.is_some());
        assert_eq!(f.fields, vec![("severity".to_owned(), "err".to_owned())]);
    }

    #[test]
    fn block_object_fields_are_flattened() {
        let f = JsonFormat
            .decode(r#"{"message":"m","block":{"wwid":"W1","owners":["MPATH1","MPATH2"],"uuid":null}}"#)
            .unwrap();
        assert!(f.fields.contains(&("wwid".to_owned(), "W1".to_owned())));
        assert!(f.fields.contains(&("owners".to_owned(), "MPATH1,MPATH2".to_owned())));
        assert!(!f.fields.iter().any(|(k, _)| k == "uuid"));
    }

    #[test]
    fn numeric_values_become_strings() {
        let f = JsonFormat.decode(r#"{"severity":3,"msg":"x"}"#).unwrap();
        assert_eq!(f.fields, vec![("severity".to_owned(), "3".to_owned())]);
    }

    #[test]
    fn non_json_returns_none() {
        assert!(JsonFormat.decode("{not json").is_none());
        assert!(JsonFormat.decode("plain text").is_none());
        assert!(JsonFormat.decode("[1,2]").is_none());
    }

    #[test]
    fn invalid_timestamp_is_dropped() {
        let f = JsonFormat
            .decode(r#"{"timestamp":"0000-00-00T00:00:00.000000Z","message":"m"}"#)
            .unwrap();
        assert!(f.timestamp.is_none());
    }

    #[test]
    fn raw_message_is_carried() {
        let f = JsonFormat
            .decode(r#"{"message":"m","raw_message":"<3>orig"}"#)
            .unwrap();
        assert_eq!(f.raw_message.as_deref(), Some("<3>orig"));
    }
}
