//! 타임스탬프 정규화
//!
//! 이벤트 타임스탬프는 항상 `YYYY-MM-DDTHH:MM:SS.ffffffZ` (UTC, 마이크로초) 형식입니다.
//! 고정 폭이므로 문자열 비교가 곧 시간 비교입니다.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use blkwatch_core::error::BlkwatchError;

/// 정규 타임스탬프 형식
pub const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// 타임스탬프를 복구할 수 없을 때 사용하는 표식
///
/// 모든 실제 타임스탬프보다 앞에 정렬되므로 SINCE 필터에 걸리지 않습니다.
pub const UNPARSEABLE_TIMESTAMP: &str = "0000-00-00T00:00:00.000000Z";

/// UTC 시각을 정규 문자열로 변환합니다.
pub fn canonical(dt: &DateTime<Utc>) -> String {
    dt.format(CANONICAL_FORMAT).to_string()
}

/// 레코드 헤더에 나타나는 타임스탬프를 파싱합니다.
///
/// 지원 형식: RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]`, `YYYY-MM-DDTHH:MM:SS[.f]`
/// (오프셋이 없으면 UTC로 간주).
pub fn parse_header_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() || s == "-" {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // journalctl short-iso: 2024-01-15T12:00:00+0900
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// BSD syslog 타임스탬프를 파싱합니다.
///
/// 형식: `MMM DD HH:MM:SS` (예: `Jan 15 12:00:00`)
/// 연도 정보가 없으므로 현재 연도를 가정합니다.
pub fn parse_bsd_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let with_year = format!("{} {}", Utc::now().year(), s);
    NaiveDateTime::parse_from_str(&with_year, "%Y %b %d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// SINCE 필터 피연산자를 정규 문자열로 변환합니다.
///
/// 지원 형식:
/// - `today`, `yesterday` (UTC 자정)
/// - RFC 3339
/// - `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`
/// - `YYYY-MM-DD`
///
/// # Errors
/// 어느 형식에도 맞지 않으면 `INVALID_ARGUMENT`.
pub fn parse_since(operand: &str, now: DateTime<Utc>) -> Result<String, BlkwatchError> {
    let trimmed = operand.trim();
    let today = now.date_naive();
    let dt = match trimmed.to_ascii_lowercase().as_str() {
        "today" => Some(midnight(today)),
        "yesterday" => today.checked_sub_days(Days::new(1)).map(midnight),
        _ => parse_header_timestamp(trimmed).or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .map(midnight)
        }),
    };

    dt.map(|dt| canonical(&dt)).ok_or_else(|| {
        BlkwatchError::InvalidArgument(format!(
            "invalid since timestamp '{operand}', expected RFC 3339, \
             'YYYY-MM-DD HH:MM:SS', 'YYYY-MM-DD', 'today' or 'yesterday'"
        ))
    })
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 15, 30, 0).unwrap()
    }

    #[test]
    fn canonical_has_fixed_width() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 5, 3, 4, 5).unwrap();
        let s = canonical(&dt);
        assert_eq!(s, "2024-01-05T03:04:05.000000Z");
        assert_eq!(s.len(), UNPARSEABLE_TIMESTAMP.len());
    }

    #[test]
    fn marker_sorts_before_real_timestamps() {
        let dt = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        assert!(UNPARSEABLE_TIMESTAMP < canonical(&dt).as_str());
    }

    #[test]
    fn header_rfc3339_with_offset_is_normalized_to_utc() {
        let dt = parse_header_timestamp("2024-01-15T21:00:00.5+09:00").unwrap();
        assert_eq!(canonical(&dt), "2024-01-15T12:00:00.500000Z");
    }

    #[test]
    fn header_naive_forms_assume_utc() {
        let a = parse_header_timestamp("2024-01-15 12:00:00").unwrap();
        let b = parse_header_timestamp("2024-01-15T12:00:00").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn header_short_iso_offset() {
        let dt = parse_header_timestamp("2024-01-15T12:00:00+0000").unwrap();
        assert_eq!(canonical(&dt), "2024-01-15T12:00:00.000000Z");
    }

    #[test]
    fn header_rejects_nilvalue_and_garbage() {
        assert!(parse_header_timestamp("-").is_none());
        assert!(parse_header_timestamp("yesterday-ish").is_none());
    }

    #[test]
    fn bsd_timestamp_uses_current_year() {
        let dt = parse_bsd_timestamp("Jan 15 12:00:00").unwrap();
        assert_eq!(dt.year(), Utc::now().year());
        assert!(parse_bsd_timestamp("Foo 15 12:00:00").is_none());
    }

    #[test]
    fn since_accepts_rfc3339() {
        let s = parse_since("2024-01-01T00:00:00Z", fixed_now()).unwrap();
        assert_eq!(s, "2024-01-01T00:00:00.000000Z");
    }

    #[test]
    fn since_accepts_date_only() {
        let s = parse_since("2024-02-29", fixed_now()).unwrap();
        assert_eq!(s, "2024-02-29T00:00:00.000000Z");
    }

    #[test]
    fn since_accepts_relative_days() {
        assert_eq!(
            parse_since("today", fixed_now()).unwrap(),
            "2024-03-10T00:00:00.000000Z"
        );
        assert_eq!(
            parse_since("Yesterday", fixed_now()).unwrap(),
            "2024-03-09T00:00:00.000000Z"
        );
    }

    #[test]
    fn since_rejects_malformed_operand() {
        let err = parse_since("2024-13-45", fixed_now()).unwrap_err();
        assert_eq!(err.code(), blkwatch_core::ErrorCode::InvalidArgument);
        assert!(parse_since("", fixed_now()).is_err());
        assert!(parse_since("last week", fixed_now()).is_err());
    }
}
