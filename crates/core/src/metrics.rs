//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 엔진은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다. 익스포터 설치는 임베딩하는 쪽의 몫입니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `blkwatch_`
//! - 접미어: `_total` (counter), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(blkwatch_core::metrics::RECORDS_READ_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 레코드 형식 레이블 키 (text, json)
pub const LABEL_FORMAT: &str = "format";

/// 에러 코드 레이블 키 (`LOG_SEVERITY_PARSE_ERROR` 등)
pub const LABEL_ERROR_CODE: &str = "code";

/// 서브시스템 레이블 키
pub const LABEL_SUBSYSTEM: &str = "subsystem";

// ─── 이벤트 엔진 메트릭 ────────────────────────────────────────────

/// 해석에 성공한 레코드 수 (counter, label: format)
pub const RECORDS_READ_TOTAL: &str = "blkwatch_records_read_total";

/// 해석에 실패한 레코드 수 (counter, label: code)
pub const PARSE_ERRORS_TOTAL: &str = "blkwatch_parse_errors_total";

/// 반환된 이벤트 수 (counter, label: subsystem)
pub const EVENTS_YIELDED_TOTAL: &str = "blkwatch_events_yielded_total";

/// 필터 체인에서 걸러진 이벤트 수 (counter)
pub const EVENTS_FILTERED_TOTAL: &str = "blkwatch_events_filtered_total";

/// 사이클 때문에 거부된 소유 관계 수 (counter)
pub const LINKS_REJECTED_TOTAL: &str = "blkwatch_links_rejected_total";

/// 레지스트리에 있는 블록 장치 수 (gauge)
pub const REGISTRY_BLOCKS: &str = "blkwatch_registry_blocks";

/// 로그 소스 읽기 실패 수 (counter)
pub const SOURCE_ERRORS_TOTAL: &str = "blkwatch_source_errors_total";

/// 모든 메트릭의 설명을 등록합니다.
///
/// 익스포터를 설치한 뒤 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        RECORDS_READ_TOTAL,
        "Records pulled from the log source and parsed, by record format"
    );
    describe_counter!(
        PARSE_ERRORS_TOTAL,
        "Records that could not be attributed to any event"
    );
    describe_counter!(
        EVENTS_YIELDED_TOTAL,
        "Events returned to the caller after filtering"
    );
    describe_counter!(
        EVENTS_FILTERED_TOTAL,
        "Events rejected by the filter chain"
    );
    describe_counter!(
        LINKS_REJECTED_TOTAL,
        "Ownership edges rejected because they would close a cycle"
    );
    describe_gauge!(REGISTRY_BLOCKS, "Block devices known to the registry");
    describe_counter!(SOURCE_ERRORS_TOTAL, "Fatal log source read failures");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_share_prefix() {
        for name in [
            RECORDS_READ_TOTAL,
            PARSE_ERRORS_TOTAL,
            EVENTS_YIELDED_TOTAL,
            EVENTS_FILTERED_TOTAL,
            LINKS_REJECTED_TOTAL,
            REGISTRY_BLOCKS,
            SOURCE_ERRORS_TOTAL,
        ] {
            assert!(name.starts_with("blkwatch_"), "{name}");
        }
    }

    #[test]
    fn describe_all_without_recorder_is_noop() {
        describe_all();
    }
}
