//! 레코드 파서 / 반복자 벤치마크
//!
//! 형식별 파싱 처리량과 레지스트리 등록을 포함한 반복자 처리량을 측정합니다.

use blkwatch_core::config::ParserConfig;
use blkwatch_event_engine::{EventIter, FilterKind, MemoryLogSource, RecordParser};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

/// RFC 5424 SCSI 레코드 (토큰 포함)
const RFC5424_SCSI: &[u8] = b"<11>1 2024-01-15T12:00:00Z storage01 kernel - - - sd 2:0:0:1: [sdb] rejecting I/O to offline device wwid=3600a0b80001234 txn=42";

/// RFC 3164 multipathd 레코드
const RFC3164_MPATH: &[u8] =
    b"<27>Jan 15 12:00:00 storage01 multipathd[812]: checker failed path 8:16 in map mpatha";

/// kmsg 레코드
const KMSG_DM: &[u8] = b"3,1024,5000000,-;device-mapper: multipath: Failing path 8:32.";

/// JSON 레코드 (block 객체 포함)
const JSON_BLOCK: &[u8] = br#"{"hostname":"storage01","severity":"err","subsystem":"multipath","timestamp":"2024-01-15T12:00:00Z","message":"mpatha: remaining active paths: 1","block":{"wwid":"MPATH1","preferred_path":"/dev/mapper/mpatha","owners":[],"members":["W1","W2"]}}"#;

/// 패턴이 맞지 않는 레코드 (전체 패턴 테이블 순회)
const UNCLASSIFIED: &[u8] =
    b"<14>1 2024-01-15T12:00:00Z storage01 systemd - - - Started Session 42 of user root.";

fn bench_formats(c: &mut Criterion) {
    let parser = RecordParser::new(&ParserConfig::default()).unwrap();
    let mut group = c.benchmark_group("record_parser");
    group.throughput(Throughput::Elements(1));

    for (name, input) in [
        ("rfc5424_scsi", RFC5424_SCSI),
        ("rfc3164_multipathd", RFC3164_MPATH),
        ("kmsg_dm", KMSG_DM),
        ("json_block", JSON_BLOCK),
        ("unclassified", UNCLASSIFIED),
    ] {
        group.bench_with_input(BenchmarkId::new("format", name), &input, |b, &input| {
            b.iter(|| parser.parse_line(black_box(input)).unwrap())
        });
    }

    group.finish();
}

fn bench_iterator(c: &mut Criterion) {
    let parser = RecordParser::new(&ParserConfig::default()).unwrap();
    let records: Vec<String> = (0..1000)
        .map(|i| {
            format!(
                "<11>1 2024-01-15T12:00:00Z storage01 kernel - - - sd 2:0:0:{}: [sd{}] rejecting I/O to offline device wwid=W{}",
                i % 8,
                ["a", "b", "c", "d"][i % 4],
                i % 64
            )
        })
        .collect();

    let mut group = c.benchmark_group("event_iter");
    group.throughput(Throughput::Elements(records.len() as u64));

    group.bench_function("drain_1000", |b| {
        b.iter(|| {
            let source = MemoryLogSource::new(records.iter().cloned());
            let mut iter = EventIter::new(source, parser.clone());
            let mut count = 0;
            while let Ok(Some(event)) = iter.next_event() {
                black_box(event);
                count += 1;
            }
            count
        })
    });

    group.bench_function("drain_1000_severity_filter", |b| {
        b.iter(|| {
            let source = MemoryLogSource::new(records.iter().cloned());
            let mut iter = EventIter::new(source, parser.clone());
            iter.add_filter(FilterKind::Severity, "warning").unwrap();
            let mut count = 0;
            while let Ok(Some(event)) = iter.next_event() {
                black_box(event);
                count += 1;
            }
            count
        })
    });

    group.finish();
}

criterion_group!(benches, bench_formats, bench_iterator);
criterion_main!(benches);
