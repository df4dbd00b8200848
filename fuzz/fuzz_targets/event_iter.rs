#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use blkwatch_core::config::BlkwatchConfig;
use blkwatch_event_engine::{EventIter, FilterKind, IterState, MemoryLogSource, RecordParser};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// 필터 (종류 번호, 피연산자)
    filters: Vec<(i32, String)>,
    /// 로그 레코드 (최대 64개로 제한)
    records: Vec<Vec<u8>>,
}

fuzz_target!(|input: FuzzInput| {
    let Ok(parser) = RecordParser::from_config(&BlkwatchConfig::default()) else {
        return;
    };
    let records: Vec<Vec<u8>> = input.records.into_iter().take(64).collect();
    let total = records.len();
    let mut iter = EventIter::new(MemoryLogSource::new(records), parser);

    for (kind, operand) in input.filters.iter().take(8) {
        if let Ok(kind) = FilterKind::try_from(*kind) {
            let _ = iter.add_filter(kind, operand);
        }
    }

    // 레코드마다 최대 한 번 호출되므로 total + 1 번 안에 끝나야 한다
    for _ in 0..=total {
        match iter.next_event() {
            Ok(Some(event)) => {
                if let Some(id) = event.block() {
                    assert!(iter.registry().get(id).is_some());
                }
            }
            Ok(None) => break,
            Err(_) => {}
        }
    }
    assert_eq!(iter.state(), IterState::Exhausted);
    iter.close();
});
