//! 레코드 파서
//!
//! 로그 소스의 원시 레코드 한 줄을 [`Event`]와 장치 목격 정보([`DeviceSighting`])로
//! 변환합니다. 레지스트리는 건드리지 않으며, 장치 해석과 연결은 반복자가 합니다.
//!
//! # 처리 순서
//! 1. 길이 제한 적용, 손실 허용 UTF-8 디코딩
//! 2. JSON 레코드 시도, 실패하면 텍스트 헤더 파싱
//! 3. 본문 `key=value` 토큰 추출
//! 4. 패턴 분류
//! 5. 필드 우선순위 적용 (명시적 토큰 > 헤더 > 기본값)
//!
//! 실패는 두 가지뿐입니다. 읽을 수 있는 내용이 없으면 `LOG_SEVERITY_PARSE_ERROR`,
//! 헤더만 있고 본문이 비어 있으면 `STORAGE_SUBSYSTEM_PARSE_ERROR`.

pub mod classify;
pub mod json;
pub mod syslog;
pub mod timestamp;
pub mod tokens;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use blkwatch_core::config::{BlkwatchConfig, GeneralConfig, ParserConfig};
use blkwatch_core::error::BlkwatchError;
use blkwatch_core::types::{BlkType, Severity, Subsystem};

use crate::event::Event;
use crate::registry::BlockHint;
use crate::source::SourceRecord;

use self::classify::{Classification, Classifier};
use self::json::JsonFormat;
use self::syslog::SyslogFormat;
use self::tokens::FieldKey;

/// 헤더 파싱 결과
///
/// JSON과 텍스트 형식이 같은 구조로 결과를 돌려줍니다.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineFields {
    pub severity: Option<Severity>,
    pub facility: Option<u8>,
    pub timestamp: Option<DateTime<Utc>>,
    pub hostname: Option<String>,
    /// 프로그램 태그 (`kernel`, `multipathd` 등)
    pub app: Option<String>,
    pub body: String,
    /// 구조화 데이터나 JSON 키에서 온 `key=value` 쌍
    pub fields: Vec<(String, String)>,
    pub has_header: bool,
    pub raw_message: Option<String>,
}

/// 레코드에서 발견한 장치들
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSighting {
    /// 이벤트가 가리킬 장치
    pub device: BlockHint,
    /// 주 장치 위에 있는 장치들
    pub owners: Vec<BlockHint>,
    /// 주 장치 아래에 있는 장치들 (주 장치가 이들의 소유자)
    pub members: Vec<BlockHint>,
}

/// 해석된 레코드
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    pub event: Event,
    pub device: Option<DeviceSighting>,
    /// 레코드 형식 (`json` 또는 `text`)
    pub format: &'static str,
}

/// 레코드 파서
#[derive(Debug, Clone)]
pub struct RecordParser {
    classifier: Classifier,
    max_input_size: usize,
    default_hostname: String,
}

impl RecordParser {
    /// 파서 설정으로 생성합니다.
    ///
    /// # Errors
    /// 사용자 정의 패턴이 잘못되면 `CONF_ERROR`.
    pub fn new(config: &ParserConfig) -> Result<Self, BlkwatchError> {
        Ok(Self {
            classifier: Classifier::new(&config.patterns)?,
            max_input_size: config.max_input_size,
            default_hostname: GeneralConfig::default().hostname,
        })
    }

    /// 전체 설정으로 생성합니다. 기본 호스트명은 `[general]`에서 가져옵니다.
    ///
    /// # Errors
    /// 사용자 정의 패턴이 잘못되면 `CONF_ERROR`.
    pub fn from_config(config: &BlkwatchConfig) -> Result<Self, BlkwatchError> {
        Ok(Self::new(&config.parser)?.with_default_hostname(&config.general.hostname))
    }

    /// 호스트명이 없는 레코드에 쓸 호스트명을 지정합니다.
    pub fn with_default_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.default_hostname = hostname.into();
        self
    }

    /// 분류 패턴 수
    pub fn rule_count(&self) -> usize {
        self.classifier.rule_count()
    }

    /// 로그 소스 레코드를 해석합니다.
    ///
    /// 헤더에 타임스탬프가 없으면 소스가 준 타임스탬프를 씁니다.
    ///
    /// # Errors
    /// 모듈 문서의 두 가지 실패 조건 참고.
    pub fn parse(&self, record: &SourceRecord) -> Result<ParsedRecord, BlkwatchError> {
        self.parse_bytes(&record.data, record.timestamp)
    }

    /// 원시 바이트 한 줄을 해석합니다.
    ///
    /// # Errors
    /// 모듈 문서의 두 가지 실패 조건 참고.
    pub fn parse_line(&self, line: &[u8]) -> Result<ParsedRecord, BlkwatchError> {
        self.parse_bytes(line, None)
    }

    fn parse_bytes(
        &self,
        data: &[u8],
        source_timestamp: Option<DateTime<Utc>>,
    ) -> Result<ParsedRecord, BlkwatchError> {
        let data = if data.len() > self.max_input_size {
            warn!(
                size = data.len(),
                max = self.max_input_size,
                "record exceeds max_input_size, truncating"
            );
            &data[..self.max_input_size]
        } else {
            data
        };

        let decoded = String::from_utf8_lossy(data);
        let line = decoded.trim();
        if !line.chars().any(char::is_alphanumeric) {
            return Err(BlkwatchError::LogSeverityParse(
                "record has no printable content".to_owned(),
            ));
        }

        let (format, fields) = match JsonFormat.decode(line) {
            Some(fields) => (JsonFormat.format_name(), fields),
            None => (SyslogFormat.format_name(), SyslogFormat.decode(line)),
        };
        if fields.body.trim().is_empty() && fields.fields.is_empty() {
            return Err(BlkwatchError::StorageSubsystemParse(format!(
                "{format} record has a header but no message body"
            )));
        }

        let mut explicit = ExplicitFields::default();
        let mut extension = BTreeMap::new();
        for (key, value) in &fields.fields {
            match FieldKey::from_key(key) {
                Some(field) => explicit.set(field, value),
                None => {
                    extension.insert(key.clone(), value.clone());
                }
            }
        }

        let body_tokens = tokens::scan(&fields.body);
        let mut spans = Vec::new();
        for token in &body_tokens {
            match token.field() {
                Some(field) => {
                    explicit.set(field, token.value);
                    spans.push(token.span.clone());
                }
                None => {
                    extension.insert(token.key.to_owned(), token.value.to_owned());
                }
            }
        }
        let message = tokens::strip(&fields.body, &spans);

        let classification = self.classifier.classify(&message, fields.app.as_deref());
        for (name, value) in &classification.captures {
            extension
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }

        let severity = explicit
            .severity
            .or(fields.severity)
            .unwrap_or(Severity::Unknown);
        let subsystem = match &explicit.subsystem {
            Some(s) => s.clone(),
            None => classification
                .subsystem
                .unwrap_or(Subsystem::Other)
                .as_str()
                .to_owned(),
        };
        let timestamp = fields
            .timestamp
            .or(source_timestamp)
            .map(|ts| timestamp::canonical(&ts))
            .unwrap_or_else(|| timestamp::UNPARSEABLE_TIMESTAMP.to_owned());
        let hostname = explicit
            .hostname
            .take()
            .or_else(|| fields.hostname.clone())
            .unwrap_or_else(|| self.default_hostname.clone());

        let device = build_sighting(&classification, &mut explicit);
        let event = Event {
            hostname,
            severity,
            subsystem,
            timestamp,
            event_id: explicit
                .event_id
                .take()
                .unwrap_or_else(|| classification.event_id.clone()),
            event_type: explicit
                .event_type
                .take()
                .unwrap_or_else(|| classification.event_type.clone()),
            block: None,
            message,
            raw_message: fields.raw_message.clone().unwrap_or_else(|| line.to_owned()),
            extension,
        };

        Ok(ParsedRecord {
            event,
            device,
            format,
        })
    }
}

/// 명시적 `key=value` 필드 값. 나중에 나온 값이 이깁니다.
#[derive(Debug, Default)]
struct ExplicitFields {
    severity: Option<Severity>,
    subsystem: Option<String>,
    event_type: Option<String>,
    event_id: Option<String>,
    hostname: Option<String>,
    device: BlockHint,
    owners: Vec<String>,
    members: Vec<String>,
}

impl ExplicitFields {
    fn set(&mut self, field: FieldKey, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        match field {
            FieldKey::Severity => match Severity::from_str_loose(value) {
                Some(severity) => self.severity = Some(severity),
                None => debug!(value, "ignoring unrecognized severity token"),
            },
            FieldKey::Subsystem => {
                self.subsystem = Some(
                    Subsystem::from_str_loose(value)
                        .map(|s| s.as_str().to_owned())
                        .unwrap_or_default(),
                );
            }
            FieldKey::EventType => self.event_type = Some(value.to_owned()),
            FieldKey::EventId => self.event_id = Some(value.to_owned()),
            FieldKey::Hostname => self.hostname = Some(value.to_owned()),
            FieldKey::Wwid => self.device.wwid = Some(value.to_owned()),
            FieldKey::Path => {
                let hint = list_item_hint(value);
                if hint.path.is_some() {
                    self.device.path = hint.path;
                } else {
                    self.device.path = Some(value.to_owned());
                }
                if hint.blk_type != BlkType::Unknown && self.device.blk_type == BlkType::Unknown {
                    self.device.blk_type = hint.blk_type;
                }
            }
            FieldKey::PreferredPath => self.device.preferred_path = Some(value.to_owned()),
            FieldKey::BlkType => match BlkType::from_str_loose(value) {
                Some(blk_type) => self.device.blk_type = blk_type,
                None => debug!(value, "ignoring unrecognized blk_type token"),
            },
            FieldKey::Uuid => self.device.uuid = Some(value.to_owned()),
            FieldKey::MountPoint => self.device.mount_point = Some(value.to_owned()),
            FieldKey::TransactionId => self.device.transaction_id = Some(value.to_owned()),
            FieldKey::Owners => self
                .owners
                .extend(tokens::split_list(value).map(str::to_owned)),
            FieldKey::Members => self
                .members
                .extend(tokens::split_list(value).map(str::to_owned)),
        }
    }
}

/// 분류 결과와 명시적 필드로 장치 목격 정보를 만듭니다.
///
/// 주 장치는 `kdev` 장치, 없으면 `dmname` 장치입니다.
/// 둘 다 있으면 `dmname` 장치가 주 장치의 소유자가 됩니다.
fn build_sighting(
    classification: &Classification,
    explicit: &mut ExplicitFields,
) -> Option<DeviceSighting> {
    let mut kdev = classification.kdev.as_deref().map(kernel_hint);
    let mut dm = classification.dmname.as_deref().map(|name| BlockHint {
        preferred_path: Some(format!("/dev/mapper/{name}")),
        ..BlockHint::default()
    });

    if classification.blk_type != BlkType::Unknown {
        match (&mut dm, &mut kdev) {
            (Some(hint), _) | (None, Some(hint)) => hint.blk_type = classification.blk_type,
            (None, None) => {}
        }
    }

    let mut owners: Vec<BlockHint> = Vec::new();
    let mut primary = match (kdev, dm) {
        (Some(kdev), Some(dm)) => {
            owners.push(dm);
            kdev
        }
        (Some(hint), None) | (None, Some(hint)) => hint,
        (None, None) => BlockHint::default(),
    };
    augment(&mut primary, std::mem::take(&mut explicit.device));

    if !primary.has_identity() {
        if !explicit.owners.is_empty() || !explicit.members.is_empty() {
            debug!("device list tokens without a primary device are ignored");
        }
        return None;
    }

    owners.extend(
        classification
            .owners
            .iter()
            .chain(explicit.owners.iter())
            .map(|item| list_item_hint(item)),
    );
    let members = classification
        .members
        .iter()
        .chain(explicit.members.iter())
        .map(|item| list_item_hint(item))
        .collect();

    Some(DeviceSighting {
        device: primary,
        owners,
        members,
    })
}

/// 명시적 필드로 주 장치 힌트를 덮어씁니다.
fn augment(primary: &mut BlockHint, explicit: BlockHint) {
    let BlockHint {
        wwid,
        path,
        preferred_path,
        blk_type,
        uuid,
        mount_point,
        transaction_id,
    } = explicit;
    if wwid.is_some() {
        primary.wwid = wwid;
    }
    if path.is_some() {
        primary.path = path;
    }
    if preferred_path.is_some() {
        primary.preferred_path = preferred_path;
    }
    if blk_type != BlkType::Unknown {
        primary.blk_type = blk_type;
    }
    if uuid.is_some() {
        primary.uuid = uuid;
    }
    if mount_point.is_some() {
        primary.mount_point = mount_point;
    }
    if transaction_id.is_some() {
        primary.transaction_id = transaction_id;
    }
}

/// 목록 항목을 장치 힌트로 바꿉니다.
///
/// `/`로 시작하면 경로, 커널 장치 이름처럼 보이면 커널 이름, 아니면 WWID입니다.
pub fn list_item_hint(item: &str) -> BlockHint {
    if let Some(name) = item.strip_prefix("/dev/mapper/") {
        if !name.is_empty() {
            return BlockHint {
                preferred_path: Some(item.to_owned()),
                ..BlockHint::default()
            };
        }
    }
    if let Some(name) = item.strip_prefix("/dev/") {
        if let Some((path, blk_type)) = kernel_device(name) {
            return BlockHint {
                path: Some(path),
                blk_type,
                ..BlockHint::default()
            };
        }
    }
    if item.starts_with('/') {
        return BlockHint::with_path(item);
    }
    match kernel_device(item) {
        Some((path, blk_type)) => BlockHint {
            path: Some(path),
            blk_type,
            ..BlockHint::default()
        },
        None => BlockHint::with_wwid(item),
    }
}

/// 커널 장치 이름을 경로 힌트로 바꿉니다. 모르는 형식이면 `/dev/<name>`.
fn kernel_hint(name: &str) -> BlockHint {
    let name = name.strip_prefix("/dev/").unwrap_or(name);
    let (path, blk_type) =
        kernel_device(name).unwrap_or_else(|| (format!("/dev/{name}"), BlkType::Unknown));
    BlockHint {
        path: Some(path),
        blk_type,
        ..BlockHint::default()
    }
}

/// 커널 장치 이름 규칙
///
/// - `MAJ:MIN` → `/dev/block/MAJ:MIN`
/// - `dm-N` → `/dev/dm-N` (Device Mapper)
/// - `sdX` → SCSI 디스크, `sdXN`/`vdXN`/`nvmeXnYpZ` → 파티션
/// - `vdX`/`xvdX`/`nvmeXnY` → 기타 디스크
pub fn kernel_device(name: &str) -> Option<(String, BlkType)> {
    if let Some((major, minor)) = name.split_once(':') {
        if is_digits(major) && is_digits(minor) {
            return Some((format!("/dev/block/{name}"), BlkType::Unknown));
        }
        return None;
    }
    if let Some(num) = name.strip_prefix("dm-") {
        if is_digits(num) {
            return Some((format!("/dev/{name}"), BlkType::Dm));
        }
        return None;
    }

    let path = format!("/dev/{name}");
    for prefix in ["xvd", "sd", "vd"] {
        let Some(rest) = name.strip_prefix(prefix) else {
            continue;
        };
        let letters = rest.bytes().take_while(u8::is_ascii_lowercase).count();
        if letters == 0 {
            return None;
        }
        let digits = &rest[letters..];
        return if digits.is_empty() {
            let blk_type = if prefix == "sd" {
                BlkType::Scsi
            } else {
                BlkType::Other
            };
            Some((path, blk_type))
        } else if is_digits(digits) {
            Some((path, BlkType::Partition))
        } else {
            None
        };
    }

    let rest = name.strip_prefix("nvme")?;
    let (controller, rest) = rest.split_once('n')?;
    if !is_digits(controller) {
        return None;
    }
    match rest.split_once('p') {
        Some((ns, part)) if is_digits(ns) && is_digits(part) => Some((path, BlkType::Partition)),
        None if is_digits(rest) => Some((path, BlkType::Other)),
        _ => None,
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
