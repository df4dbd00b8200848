//! 도메인 타입: 심각도, 서브시스템, 블록 장치 종류
//!
//! 이벤트 엔진, CLI, C ABI가 공유하는 열거형입니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// syslog 심각도 레벨
///
/// 숫자 값이 작을수록 긴급합니다 (`Emergency = 0`).
/// 파싱할 수 없는 심각도는 [`Severity::Unknown`] (255)으로 표현합니다.
/// `Ord`는 숫자 값 순서를 따르므로 `Unknown`은 모든 실제 레벨보다 큽니다.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum Severity {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
    #[default]
    Unknown = 255,
}

impl Severity {
    /// 실제 심각도 레벨 8개 (`Unknown` 제외)
    pub const LEVELS: [Severity; 8] = [
        Self::Emergency,
        Self::Alert,
        Self::Critical,
        Self::Error,
        Self::Warning,
        Self::Notice,
        Self::Info,
        Self::Debug,
    ];

    /// 숫자 코드 (0..=7, 또는 255)
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// syslog 숫자 코드에서 변환합니다. 0..=7 밖이면 `Unknown`.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Emergency,
            1 => Self::Alert,
            2 => Self::Critical,
            3 => Self::Error,
            4 => Self::Warning,
            5 => Self::Notice,
            6 => Self::Info,
            7 => Self::Debug,
            _ => Self::Unknown,
        }
    }

    /// 이름 또는 숫자 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다. 어휘에 없는 값은 `None`.
    /// `"unknown"`은 `Some(Unknown)`으로 인식합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(code) = s.parse::<u8>() {
            return match code {
                0..=7 => Some(Self::from_code(code)),
                255 => Some(Self::Unknown),
                _ => None,
            };
        }
        match s.to_ascii_lowercase().as_str() {
            "emerg" | "emergency" | "panic" => Some(Self::Emergency),
            "alert" => Some(Self::Alert),
            "crit" | "critical" => Some(Self::Critical),
            "err" | "error" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warning),
            "notice" => Some(Self::Notice),
            "info" | "informational" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// 대문자 이름 (`"WARNING"` 등)
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Emergency => "EMERGENCY",
            Self::Alert => "ALERT",
            Self::Critical => "CRITICAL",
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Notice => "NOTICE",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// `floor` 이상으로 긴급한지 확인합니다 (`self <= floor`).
    ///
    /// `Unknown`은 어떤 하한에도 해당하지 않습니다.
    pub fn is_at_least(self, floor: Severity) -> bool {
        self != Self::Unknown && self <= floor
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 스토리지 서브시스템
///
/// 이벤트에는 문자열로 저장됩니다. 여기 정의된 집합이 알려진 값입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    Scsi,
    Dm,
    Multipath,
    Lvm,
    Partition,
    Other,
}

impl Subsystem {
    /// 모든 알려진 서브시스템
    pub const ALL: [Subsystem; 6] = [
        Self::Scsi,
        Self::Dm,
        Self::Multipath,
        Self::Lvm,
        Self::Partition,
        Self::Other,
    ];

    /// 소문자 이름
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scsi => "scsi",
            Self::Dm => "dm",
            Self::Multipath => "multipath",
            Self::Lvm => "lvm",
            Self::Partition => "partition",
            Self::Other => "other",
        }
    }

    /// 문자열에서 서브시스템을 파싱합니다. 대소문자 무시.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scsi" => Some(Self::Scsi),
            "dm" | "device-mapper" | "device_mapper" => Some(Self::Dm),
            "multipath" | "dm-multipath" | "mpath" => Some(Self::Multipath),
            "lvm" | "lvm2" | "dm-lvm" => Some(Self::Lvm),
            "partition" | "part" => Some(Self::Partition),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 블록 장치 종류
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum BlkType {
    #[default]
    Unknown = 0,
    Other = 1,
    Scsi = 2,
    Dm = 3,
    DmMultipath = 4,
    DmLvm = 5,
    Partition = 6,
}

impl BlkType {
    /// 사람이 읽는 이름 (`"Device Mapper Multipath"` 등)
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Other => "Other",
            Self::Scsi => "SCSI",
            Self::Dm => "Device Mapper",
            Self::DmMultipath => "Device Mapper Multipath",
            Self::DmLvm => "Device Mapper LVM",
            Self::Partition => "Partition",
        }
    }

    /// 문자열에서 장치 종류를 파싱합니다.
    ///
    /// 짧은 이름(`scsi`, `dm`, `multipath`, `lvm`, `partition`, `other`)과
    /// [`BlkType::as_str`]의 표시 이름을 모두 받습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unknown" => Some(Self::Unknown),
            "other" => Some(Self::Other),
            "scsi" => Some(Self::Scsi),
            "dm" | "device mapper" => Some(Self::Dm),
            "multipath" | "dm-multipath" | "dm_multipath" | "device mapper multipath" => {
                Some(Self::DmMultipath)
            }
            "lvm" | "dm-lvm" | "dm_lvm" | "device mapper lvm" => Some(Self::DmLvm),
            "partition" | "part" => Some(Self::Partition),
            _ => None,
        }
    }

    /// 더 구체적인 종류인지 (Unknown < Other < 나머지)
    pub fn specificity(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Other => 1,
            Self::Dm => 2,
            _ => 3,
        }
    }
}

impl fmt::Display for BlkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_follows_numeric_code() {
        assert!(Severity::Emergency < Severity::Alert);
        assert!(Severity::Warning < Severity::Notice);
        assert!(Severity::Debug < Severity::Unknown);
        assert_eq!(Severity::Unknown.as_u8(), 255);
    }

    #[test]
    fn severity_parses_names_and_digits() {
        assert_eq!(Severity::from_str_loose("err"), Some(Severity::Error));
        assert_eq!(Severity::from_str_loose("WARNING"), Some(Severity::Warning));
        assert_eq!(Severity::from_str_loose("emerg"), Some(Severity::Emergency));
        assert_eq!(Severity::from_str_loose("4"), Some(Severity::Warning));
        assert_eq!(Severity::from_str_loose(" info "), Some(Severity::Info));
        assert_eq!(Severity::from_str_loose("unknown"), Some(Severity::Unknown));
        assert_eq!(Severity::from_str_loose("8"), None);
        assert_eq!(Severity::from_str_loose("loud"), None);
        assert_eq!(Severity::from_str_loose(""), None);
    }

    #[test]
    fn severity_floor_semantics() {
        let floor = Severity::Warning;
        for level in Severity::LEVELS {
            assert_eq!(level.is_at_least(floor), level.as_u8() <= 4, "{level}");
        }
        assert!(!Severity::Unknown.is_at_least(Severity::Debug));
    }

    #[test]
    fn severity_serializes_uppercase() {
        let json = serde_json::to_string(&Severity::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");
        let back: Severity = serde_json::from_str("\"NOTICE\"").unwrap();
        assert_eq!(back, Severity::Notice);
    }

    #[test]
    fn subsystem_roundtrips_through_str() {
        for sub in Subsystem::ALL {
            assert_eq!(Subsystem::from_str_loose(sub.as_str()), Some(sub));
        }
        assert_eq!(Subsystem::from_str_loose("DM-Multipath"), Some(Subsystem::Multipath));
        assert_eq!(Subsystem::from_str_loose("nfs"), None);
    }

    #[test]
    fn blk_type_display_strings() {
        assert_eq!(BlkType::Scsi.to_string(), "SCSI");
        assert_eq!(BlkType::DmMultipath.to_string(), "Device Mapper Multipath");
        assert_eq!(BlkType::DmLvm.to_string(), "Device Mapper LVM");
        assert_eq!(BlkType::default(), BlkType::Unknown);
    }

    #[test]
    fn blk_type_accepts_short_and_display_names() {
        assert_eq!(BlkType::from_str_loose("multipath"), Some(BlkType::DmMultipath));
        assert_eq!(
            BlkType::from_str_loose("Device Mapper LVM"),
            Some(BlkType::DmLvm)
        );
        assert_eq!(BlkType::from_str_loose("tape"), None);
    }

    #[test]
    fn blk_type_specificity_orders_generic_before_concrete() {
        assert!(BlkType::Unknown.specificity() < BlkType::Other.specificity());
        assert!(BlkType::Dm.specificity() < BlkType::DmMultipath.specificity());
    }
}
