//! 이벤트 분류: 패턴 테이블과 서브시스템 추정
//!
//! 패턴은 사용자 정의(설정 파일) 패턴을 먼저, 내장 패턴을 나중에 평가하며
//! 처음 맞는 패턴이 이깁니다. 정규식의 이름 있는 캡처 중
//! `kdev`, `dmname`, `owners`, `members`는 장치 식별에 쓰이고
//! 나머지는 이벤트 확장 필드로 들어갑니다.

use regex::Regex;

use blkwatch_core::config::PatternConfig;
use blkwatch_core::error::BlkwatchError;
use blkwatch_core::types::{BlkType, Subsystem};

/// 패턴이 맞지 않은 레코드의 이벤트 분류
pub const UNCLASSIFIED_EVENT_TYPE: &str = "other";

/// 패턴이 맞지 않은 레코드의 이벤트 식별자
pub const UNCLASSIFIED_EVENT_ID: &str = "UNCLASSIFIED";

const SCSI_PREFIX: &str = r"^sd (?P<scsi_id>\d+:\d+:\d+:\d+): \[(?P<kdev>sd[a-z]+)\] ";
const DISK_NAME: &str = r"(?:(?:sd|vd|xvd)[a-z]+|nvme\d+n\d+)";
const PART_NAME: &str = r"(?:(?:sd|vd|xvd)[a-z]+\d+|nvme\d+n\d+p\d+)";

/// 내장 패턴 정의
struct BuiltinPattern {
    starts_with: Option<&'static str>,
    app: Option<&'static str>,
    regex: String,
    subsystem: Subsystem,
    event_type: &'static str,
    event_id: &'static str,
    blk_type: BlkType,
}

fn builtin_patterns() -> Vec<BuiltinPattern> {
    let scsi = |tail: &str, event_type: &'static str, event_id: &'static str| BuiltinPattern {
        starts_with: Some("sd "),
        app: None,
        regex: format!("{SCSI_PREFIX}{tail}"),
        subsystem: Subsystem::Scsi,
        event_type,
        event_id,
        blk_type: BlkType::Scsi,
    };

    vec![
        BuiltinPattern {
            starts_with: Some("device-mapper: multipath:"),
            app: None,
            regex: r"^device-mapper: multipath: (?:\d+:\d+: )?Failing path (?P<kdev>\d+:\d+)\.?$"
                .to_owned(),
            subsystem: Subsystem::Multipath,
            event_type: "path-down",
            event_id: "DM_MPATH_PATH_FAILED",
            blk_type: BlkType::Unknown,
        },
        BuiltinPattern {
            starts_with: Some("device-mapper: multipath:"),
            app: None,
            regex:
                r"^device-mapper: multipath: (?:\d+:\d+: )?Reinstating path (?P<kdev>\d+:\d+)\.?$"
                    .to_owned(),
            subsystem: Subsystem::Multipath,
            event_type: "path-restored",
            event_id: "DM_MPATH_PATH_REINSTATED",
            blk_type: BlkType::Unknown,
        },
        BuiltinPattern {
            starts_with: Some("device-mapper: dirty region log:"),
            app: None,
            regex: r"^device-mapper: dirty region log: (?P<kdev>\d+:\d+): Failed to read header on dirty region log device$"
                .to_owned(),
            subsystem: Subsystem::Dm,
            event_type: "log-error",
            event_id: "DM_DIRTY_LOG_READ_FAILED",
            blk_type: BlkType::Dm,
        },
        BuiltinPattern {
            starts_with: Some("device-mapper: dirty region log:"),
            app: None,
            regex: r"^device-mapper: dirty region log: (?P<kdev>\d+:\d+): Failed to write header on dirty region log device$"
                .to_owned(),
            subsystem: Subsystem::Dm,
            event_type: "log-error",
            event_id: "DM_DIRTY_LOG_WRITE_FAILED",
            blk_type: BlkType::Dm,
        },
        BuiltinPattern {
            starts_with: Some("device-mapper: thin:"),
            app: None,
            regex: r"^device-mapper: thin: (?P<kdev>\d+:\d+): (?P<detail>.+)$".to_owned(),
            subsystem: Subsystem::Lvm,
            event_type: "thin-pool",
            event_id: "DM_THIN_POOL_EVENT",
            blk_type: BlkType::DmLvm,
        },
        scsi(
            r"Unaligned partial completion \(resid=(?P<resid>\d+), sector_sz=(?P<sector_sz>\d+)\)$",
            "io-error",
            "SCSI_UNALIGNED_PARTIAL_COMPLETION",
        ),
        scsi(r"Spinning up disk\.\.\.$", "spin-up", "SCSI_SPINNING_UP_DISK"),
        scsi(
            r"tag#\d+ Sense Key : (?P<sense_key>[^\[\]]+?)\s*\[(?P<is_deferred>deferred|current)\]",
            "sense-error",
            "SCSI_SENSE_KEY",
        ),
        scsi(
            r"tag#\d+ Add\. Sense: (?P<asc>.+)$",
            "sense-error",
            "SCSI_ADDITIONAL_SENSE_CODE",
        ),
        scsi(
            r"Medium access timeout failure\. Offlining disk!$",
            "device-offline",
            "SCSI_MEDIUM_ACCESS_TIMEOUT_OFFLINING_DISK",
        ),
        BuiltinPattern {
            starts_with: Some("sd "),
            app: None,
            regex: r"^sd (?P<scsi_id>\d+:\d+:\d+:\d+): (?:\[(?P<kdev>sd[a-z]+)\] )?rejecting I/O to offline device"
                .to_owned(),
            subsystem: Subsystem::Scsi,
            event_type: "path-down",
            event_id: "SCSI_REJECTING_IO_OFFLINE_DEVICE",
            blk_type: BlkType::Scsi,
        },
        BuiltinPattern {
            starts_with: None,
            app: None,
            regex: r"^(?:blk_update_request: )?(?P<error_kind>I/O|critical medium|critical target) error, dev (?P<kdev>[a-z]+[a-z0-9]*), sector (?P<sector>\d+)"
                .to_owned(),
            subsystem: Subsystem::Scsi,
            event_type: "io-error",
            event_id: "BLK_IO_ERROR",
            blk_type: BlkType::Unknown,
        },
        BuiltinPattern {
            starts_with: Some("checker failed path"),
            app: Some("multipathd"),
            regex: r"^checker failed path (?P<kdev>\d+:\d+) in map (?P<dmname>[^\s:]+)".to_owned(),
            subsystem: Subsystem::Multipath,
            event_type: "path-down",
            event_id: "MULTIPATHD_CHECKER_FAILED",
            blk_type: BlkType::DmMultipath,
        },
        BuiltinPattern {
            starts_with: None,
            app: Some("multipathd"),
            regex: r"^(?P<kdev>sd[a-z]+|\d+:\d+): mark as failed".to_owned(),
            subsystem: Subsystem::Multipath,
            event_type: "path-down",
            event_id: "MULTIPATHD_PATH_MARKED_FAILED",
            blk_type: BlkType::Unknown,
        },
        BuiltinPattern {
            starts_with: None,
            app: Some("multipathd"),
            regex: r"^(?P<kdev>sd[a-z]+|\d+:\d+): reinstated".to_owned(),
            subsystem: Subsystem::Multipath,
            event_type: "path-restored",
            event_id: "MULTIPATHD_PATH_REINSTATED",
            blk_type: BlkType::Unknown,
        },
        BuiltinPattern {
            starts_with: None,
            app: Some("multipathd"),
            regex: r"^(?P<dmname>[^\s:]+): remaining active paths: (?P<active_paths>\d+)".to_owned(),
            subsystem: Subsystem::Multipath,
            event_type: "path-count",
            event_id: "MULTIPATHD_REMAINING_ACTIVE_PATHS",
            blk_type: BlkType::DmMultipath,
        },
        BuiltinPattern {
            starts_with: Some("WARNING: Thin pool"),
            app: None,
            regex: r"^WARNING: Thin pool (?P<dmname>\S+) (?P<pool_area>data|metadata) is now (?P<usage>[\d.]+)% full"
                .to_owned(),
            subsystem: Subsystem::Lvm,
            event_type: "thin-pool",
            event_id: "LVM_THIN_POOL_USAGE",
            blk_type: BlkType::DmLvm,
        },
        BuiltinPattern {
            starts_with: None,
            app: None,
            regex: format!(r"^(?P<kdev>{DISK_NAME}): (?P<owners>{PART_NAME}(?: {PART_NAME})*)$"),
            subsystem: Subsystem::Partition,
            event_type: "partition-table",
            event_id: "PARTITION_TABLE_SCANNED",
            blk_type: BlkType::Unknown,
        },
        BuiltinPattern {
            starts_with: Some("EXT4-fs error (device "),
            app: None,
            regex: r"^EXT4-fs error \(device (?P<kdev>[^\s\)]+)\): ".to_owned(),
            subsystem: Subsystem::Other,
            event_type: "fs-error",
            event_id: "FS_ERROR",
            blk_type: BlkType::Unknown,
        },
        BuiltinPattern {
            starts_with: Some("XFS "),
            app: None,
            regex: r"^XFS \((?P<kdev>[^\s\)]+)\): writeback error on sector".to_owned(),
            subsystem: Subsystem::Other,
            event_type: "io-error",
            event_id: "FS_IO_ERROR",
            blk_type: BlkType::Unknown,
        },
    ]
}

/// 컴파일된 분류 패턴
#[derive(Debug, Clone)]
pub struct PatternRule {
    starts_with: Option<String>,
    app: Option<String>,
    regex: Regex,
    subsystem: Subsystem,
    event_type: String,
    event_id: String,
    /// `dmname` 캡처가 있으면 그 장치의, 없으면 `kdev` 장치의 종류
    blk_type: BlkType,
}

impl PatternRule {
    /// 사용자 정의 패턴을 컴파일합니다.
    ///
    /// # Errors
    /// 정규식이나 필드 값이 잘못되면 `CONF_ERROR`.
    pub fn from_config(config: &PatternConfig) -> Result<Self, BlkwatchError> {
        let regex = Regex::new(&config.regex).map_err(|e| {
            BlkwatchError::Conf(format!("invalid pattern regex '{}': {e}", config.regex))
        })?;
        let subsystem = Subsystem::from_str_loose(&config.subsystem).ok_or_else(|| {
            BlkwatchError::Conf(format!("unknown pattern subsystem '{}'", config.subsystem))
        })?;
        let blk_type = match &config.blk_type {
            Some(s) => BlkType::from_str_loose(s)
                .ok_or_else(|| BlkwatchError::Conf(format!("unknown pattern blk_type '{s}'")))?,
            None => BlkType::Unknown,
        };
        if config.event_type.is_empty() || config.event_id.is_empty() {
            return Err(BlkwatchError::Conf(
                "pattern event_type and event_id must not be empty".to_owned(),
            ));
        }

        Ok(Self {
            starts_with: config.starts_with.clone(),
            app: config.app.clone(),
            regex,
            subsystem,
            event_type: config.event_type.clone(),
            event_id: config.event_id.clone(),
            blk_type,
        })
    }

    fn from_builtin(pattern: BuiltinPattern) -> Result<Self, BlkwatchError> {
        let regex = Regex::new(&pattern.regex).map_err(|e| {
            BlkwatchError::InternalBug(format!(
                "built-in pattern {} does not compile: {e}",
                pattern.event_id
            ))
        })?;
        Ok(Self {
            starts_with: pattern.starts_with.map(str::to_owned),
            app: pattern.app.map(str::to_owned),
            regex,
            subsystem: pattern.subsystem,
            event_type: pattern.event_type.to_owned(),
            event_id: pattern.event_id.to_owned(),
            blk_type: pattern.blk_type,
        })
    }

    /// 이벤트 식별자
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    fn applies_to(&self, message: &str, app: Option<&str>) -> bool {
        let prefix_ok = self
            .starts_with
            .as_deref()
            .is_none_or(|prefix| message.starts_with(prefix));
        if !prefix_ok {
            return false;
        }
        match &self.app {
            Some(required) => app.is_some_and(|a| a.eq_ignore_ascii_case(required)),
            None => true,
        }
    }
}

/// 분류 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// 추정된 서브시스템
    pub subsystem: Option<Subsystem>,
    pub event_type: String,
    pub event_id: String,
    /// 커널 장치 이름 (`sdb`, `dm-3`, `8:16`)
    pub kdev: Option<String>,
    /// device-mapper 이름 (`mpatha`)
    pub dmname: Option<String>,
    /// 패턴이 지정한 장치 종류
    pub blk_type: BlkType,
    /// 주 장치 위에 있는 장치 이름들
    pub owners: Vec<String>,
    /// 주 장치 아래에 있는 장치 이름들
    pub members: Vec<String>,
    /// 장치 식별 외의 캡처
    pub captures: Vec<(String, String)>,
    /// 패턴이 맞았는지
    pub matched: bool,
}

/// 패턴 테이블
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<PatternRule>,
}

impl Classifier {
    /// 내장 패턴과 사용자 정의 패턴으로 분류기를 만듭니다.
    ///
    /// # Errors
    /// 사용자 정의 패턴이 잘못되면 `CONF_ERROR`.
    pub fn new(custom: &[PatternConfig]) -> Result<Self, BlkwatchError> {
        let mut rules = custom
            .iter()
            .map(PatternRule::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        for pattern in builtin_patterns() {
            rules.push(PatternRule::from_builtin(pattern)?);
        }
        Ok(Self { rules })
    }

    /// 등록된 패턴 수
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// 메시지를 분류합니다.
    pub fn classify(&self, message: &str, app: Option<&str>) -> Classification {
        for rule in &self.rules {
            if !rule.applies_to(message, app) {
                continue;
            }
            let Some(caps) = rule.regex.captures(message) else {
                continue;
            };

            let mut result = Classification {
                subsystem: Some(rule.subsystem),
                event_type: rule.event_type.clone(),
                event_id: rule.event_id.clone(),
                blk_type: rule.blk_type,
                matched: true,
                ..Classification::default()
            };

            for name in rule.regex.capture_names().flatten() {
                let Some(m) = caps.name(name) else {
                    continue;
                };
                let value = m.as_str().trim();
                match name {
                    "kdev" => result.kdev = Some(value.to_owned()),
                    "dmname" => result.dmname = Some(value.to_owned()),
                    "owners" => result.owners.extend(split_names(value)),
                    "members" => result.members.extend(split_names(value)),
                    _ => result.captures.push((name.to_owned(), value.to_owned())),
                }
            }

            refine_sense_key(&mut result);
            return result;
        }

        Classification {
            subsystem: Some(detect_subsystem(message, app)),
            event_type: UNCLASSIFIED_EVENT_TYPE.to_owned(),
            event_id: UNCLASSIFIED_EVENT_ID.to_owned(),
            ..Classification::default()
        }
    }
}

/// SCSI sense key를 더 구체적인 식별자로 바꿉니다.
fn refine_sense_key(result: &mut Classification) {
    if result.event_id != "SCSI_SENSE_KEY" {
        return;
    }
    let sense_key = result
        .captures
        .iter()
        .find(|(k, _)| k == "sense_key")
        .map(|(_, v)| v.as_str());
    match sense_key {
        Some("Medium Error") => result.event_id = "SCSI_MEDIUM_ERROR".to_owned(),
        Some("Hardware Error") => result.event_id = "SCSI_HARDWARE_ERROR".to_owned(),
        _ => {}
    }
}

/// 패턴이 맞지 않은 메시지의 서브시스템을 접두어와 태그로 추정합니다.
pub fn detect_subsystem(message: &str, app: Option<&str>) -> Subsystem {
    let app = app.map(str::to_ascii_lowercase);
    match app.as_deref() {
        Some("multipathd" | "multipath") => return Subsystem::Multipath,
        Some("lvm" | "lvm2" | "dmeventd" | "lvmetad" | "lvmpolld") => return Subsystem::Lvm,
        _ => {}
    }

    if message.starts_with("device-mapper: multipath") {
        Subsystem::Multipath
    } else if message.starts_with("device-mapper: thin") {
        Subsystem::Lvm
    } else if message.starts_with("device-mapper:") {
        Subsystem::Dm
    } else if message.starts_with("sd ") || message.starts_with("scsi") {
        Subsystem::Scsi
    } else {
        Subsystem::Other
    }
}

fn split_names(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}
