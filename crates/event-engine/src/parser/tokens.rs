//! 본문 `key=value` 토큰 추출
//!
//! 키는 `[A-Za-z_][A-Za-z0-9_.-]*` 형식이며 대소문자를 구분하지 않습니다.
//! 값은 공백 전까지이거나 큰따옴표로 감싼 문자열입니다.

use std::ops::Range;

/// 이벤트/장치 필드로 해석되는 키
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Severity,
    Subsystem,
    EventType,
    EventId,
    Hostname,
    Wwid,
    Path,
    PreferredPath,
    BlkType,
    Uuid,
    MountPoint,
    TransactionId,
    Owners,
    Members,
}

impl FieldKey {
    /// 키 이름(소문자)을 인식합니다.
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.to_ascii_lowercase();
        let field = match key.as_str() {
            "severity" | "priority" | "level" => Self::Severity,
            "subsystem" | "sub_system" => Self::Subsystem,
            "event_type" => Self::EventType,
            "event_id" => Self::EventId,
            "hostname" | "host" => Self::Hostname,
            "wwid" => Self::Wwid,
            "path" | "dev" | "devname" => Self::Path,
            "preferred_path" | "alias" => Self::PreferredPath,
            "blk_type" => Self::BlkType,
            "uuid" => Self::Uuid,
            "mount" | "mount_point" => Self::MountPoint,
            "transaction_id" | "txn" => Self::TransactionId,
            "owners" | "owner" | "holders" => Self::Owners,
            "members" | "paths" | "slaves" => Self::Members,
            _ => return None,
        };
        Some(field)
    }
}

/// 본문에서 찾은 토큰 하나
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    /// 원래 표기의 키
    pub key: &'a str,
    /// 따옴표를 벗긴 값
    pub value: &'a str,
    /// 본문에서 토큰이 차지하는 바이트 범위
    pub span: Range<usize>,
}

impl Token<'_> {
    /// 인식되는 필드 키인지
    pub fn field(&self) -> Option<FieldKey> {
        FieldKey::from_key(self.key)
    }
}

/// 본문에서 모든 `key=value` 토큰을 찾습니다.
///
/// 토큰은 단어 경계(본문 시작 또는 공백 뒤)에서만 시작합니다.
pub fn scan(body: &str) -> Vec<Token<'_>> {
    let bytes = body.as_bytes();
    let len = bytes.len();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < len {
        while i < len && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= len {
            break;
        }

        let start = i;
        let mut j = i;
        while j < len && is_key_byte(bytes[j]) {
            j += 1;
        }

        let starts_like_key = bytes[start].is_ascii_alphabetic() || bytes[start] == b'_';
        let is_token = j > start
            && starts_like_key
            && j < len
            && bytes[j] == b'='
            && bytes.get(j + 1) != Some(&b'=');
        if is_token {
            let value_start = j + 1;
            let (value, end) = if value_start < len && bytes[value_start] == b'"' {
                match body[value_start + 1..].find('"') {
                    Some(off) => {
                        let close = value_start + 1 + off;
                        (&body[value_start + 1..close], close + 1)
                    }
                    None => (&body[value_start + 1..], len),
                }
            } else {
                let end = next_whitespace(bytes, value_start);
                (&body[value_start..end], end)
            };

            if !value.is_empty() {
                tokens.push(Token {
                    key: &body[start..j],
                    value,
                    span: start..end,
                });
            }
            i = end;
        } else {
            i = next_whitespace(bytes, i);
        }
    }

    tokens
}

/// 주어진 범위를 본문에서 지우고 공백을 정리합니다.
///
/// 지울 범위가 없으면 본문을 그대로 돌려줍니다.
pub fn strip(body: &str, spans: &[Range<usize>]) -> String {
    if spans.is_empty() {
        return body.trim().to_owned();
    }

    let mut kept = String::with_capacity(body.len());
    let mut cursor = 0;
    for span in spans {
        if span.start >= cursor {
            kept.push_str(&body[cursor..span.start]);
            kept.push(' ');
            cursor = span.end;
        }
    }
    kept.push_str(&body[cursor.min(body.len())..]);

    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 쉼표로 구분된 목록 값을 나눕니다.
pub fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn is_key_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-')
}

fn next_whitespace(bytes: &[u8], from: usize) -> usize {
    let mut k = from;
    while k < bytes.len() && !bytes[k].is_ascii_whitespace() {
        k += 1;
    }
    k
}
