//! 이벤트 필터 체인
//!
//! 필터는 추가된 순서대로 평가되며 모두 통과해야 이벤트가 선택됩니다 (AND).
//! 필터 종류의 숫자 값은 C ABI 열거형과 같습니다.
//!
//! | 종류 | 값 | 조건 |
//! |------|----|------|
//! | `WWID` | 0 | 장치 또는 전이적 소유 장치의 WWID 일치 |
//! | `EVENT_TYPE` | 1 | 정확히 일치 |
//! | `SEVERITY` | 2 | 피연산자 이상으로 긴급 (`UNKNOWN` 제외) |
//! | `SUBSYSTEM` | 3 | 정확히 일치 |
//! | `SINCE` | 4 | 정규화된 타임스탬프 문자열 비교 `>=` |
//! | `EVENT_ID` | 5 | 정확히 일치 |

use std::fmt;
use std::str::FromStr;

use chrono::Utc;

use blkwatch_core::error::BlkwatchError;
use blkwatch_core::types::Severity;

use crate::event::Event;
use crate::parser::timestamp;
use crate::registry::BlockRegistry;

/// 필터 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum FilterKind {
    Wwid = 0,
    EventType = 1,
    Severity = 2,
    Subsystem = 3,
    Since = 4,
    EventId = 5,
}

impl FilterKind {
    pub const ALL: [FilterKind; 6] = [
        Self::Wwid,
        Self::EventType,
        Self::Severity,
        Self::Subsystem,
        Self::Since,
        Self::EventId,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wwid => "WWID",
            Self::EventType => "EVENT_TYPE",
            Self::Severity => "SEVERITY",
            Self::Subsystem => "SUBSYSTEM",
            Self::Since => "SINCE",
            Self::EventId => "EVENT_ID",
        }
    }
}

impl TryFrom<i32> for FilterKind {
    type Error = BlkwatchError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|kind| *kind as i32 == value)
            .ok_or_else(|| BlkwatchError::InvalidArgument(format!("unknown filter kind {value}")))
    }
}

impl FromStr for FilterKind {
    type Err = BlkwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| BlkwatchError::InvalidArgument(format!("unknown filter kind '{s}'")))
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 검증된 필터 하나
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Wwid(String),
    EventType(String),
    Severity(Severity),
    Subsystem(String),
    /// 정규화된 타임스탬프
    Since(String),
    EventId(String),
}

impl Filter {
    /// 종류와 피연산자 문자열로 필터를 만듭니다.
    ///
    /// # Errors
    /// 피연산자가 비었거나 종류에 맞지 않으면 `INVALID_ARGUMENT`.
    pub fn parse(kind: FilterKind, operand: &str) -> Result<Self, BlkwatchError> {
        let operand = operand.trim();
        if operand.is_empty() {
            return Err(BlkwatchError::InvalidArgument(format!(
                "{kind} filter requires a non-empty operand"
            )));
        }

        Ok(match kind {
            FilterKind::Wwid => Self::Wwid(operand.to_owned()),
            FilterKind::EventType => Self::EventType(operand.to_owned()),
            FilterKind::Subsystem => Self::Subsystem(operand.to_owned()),
            FilterKind::EventId => Self::EventId(operand.to_owned()),
            FilterKind::Severity => match Severity::from_str_loose(operand) {
                Some(Severity::Unknown) | None => {
                    return Err(BlkwatchError::InvalidArgument(format!(
                        "invalid severity filter operand '{operand}'"
                    )));
                }
                Some(severity) => Self::Severity(severity),
            },
            FilterKind::Since => Self::Since(timestamp::parse_since(operand, Utc::now())?),
        })
    }

    pub fn kind(&self) -> FilterKind {
        match self {
            Self::Wwid(_) => FilterKind::Wwid,
            Self::EventType(_) => FilterKind::EventType,
            Self::Severity(_) => FilterKind::Severity,
            Self::Subsystem(_) => FilterKind::Subsystem,
            Self::Since(_) => FilterKind::Since,
            Self::EventId(_) => FilterKind::EventId,
        }
    }

    /// 이벤트가 조건을 만족하는지
    pub fn matches(&self, event: &Event, registry: &BlockRegistry) -> bool {
        match self {
            Self::Wwid(wwid) => event
                .block()
                .is_some_and(|id| registry.wwid_matches(id, wwid)),
            Self::EventType(t) => event.event_type() == t,
            Self::Severity(floor) => event.severity().is_at_least(*floor),
            Self::Subsystem(s) => event.subsystem() == s,
            Self::Since(ts) => event.timestamp() >= ts.as_str(),
            Self::EventId(id) => event.event_id() == id,
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wwid(v) | Self::EventType(v) | Self::Subsystem(v) | Self::Since(v)
            | Self::EventId(v) => write!(f, "{}={v}", self.kind()),
            Self::Severity(s) => write!(f, "{}={s}", self.kind()),
        }
    }
}

/// 필터 체인 (AND)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterChain {
    filters: Vec<Filter>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    /// 피연산자를 검증해서 추가합니다. 실패하면 체인은 그대로입니다.
    ///
    /// # Errors
    /// [`Filter::parse`] 참고.
    pub fn add_parsed(&mut self, kind: FilterKind, operand: &str) -> Result<(), BlkwatchError> {
        let filter = Filter::parse(kind, operand)?;
        self.add(filter);
        Ok(())
    }

    /// 모든 필터를 통과하는지 (빈 체인은 모두 통과)
    pub fn matches(&self, event: &Event, registry: &BlockRegistry) -> bool {
        self.filters.iter().all(|f| f.matches(event, registry))
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.filters.iter()
    }
}
