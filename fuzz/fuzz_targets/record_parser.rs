#![no_main]

use blkwatch_core::config::ParserConfig;
use blkwatch_event_engine::RecordParser;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(parser) = RecordParser::new(&ParserConfig::default()) else {
        return;
    };

    // 크래시나 패닉 없이 Ok 또는 Err을 반환해야 한다
    let _ = parser.parse_line(data);
});
