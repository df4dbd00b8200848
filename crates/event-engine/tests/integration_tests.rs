//! 통합 테스트 -- 로그 파일에서 필터링된 이벤트까지 전체 흐름 검증

use std::io::Write;

use blkwatch_core::config::{BlkwatchConfig, PatternConfig};
use blkwatch_core::{ErrorCode, Severity};
use blkwatch_event_engine::{
    Event, EventIter, FileLogSource, FilterKind, IterState, MemoryLogSource, RecordParser,
};

const SCSI_OFFLINE: &str = "<11>1 2024-01-01T10:00:00Z host kernel - - - sd 2:0:0:1: [sdb] rejecting I/O to offline device wwid=W1";
const MPATH_REMAINING: &str = "<11>1 2024-01-01T10:00:01Z host multipathd - - - mpatha: remaining active paths: 1 wwid=MPATH1 paths=W1";
const DEBUG_NOISE: &str = "<15>1 2024-01-01T10:00:02Z host kernel - - - sd 2:0:0:1: [sdb] Spinning up disk...";

fn write_log(lines: &[&str]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    for line in lines {
        writeln!(file, "{line}").expect("write log line");
    }
    file
}

fn config_for(file: &tempfile::NamedTempFile) -> BlkwatchConfig {
    let mut config = BlkwatchConfig::default();
    config.source.path = file.path().display().to_string();
    config
}

fn drain(iter: &mut EventIter<FileLogSource>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Some(event) = iter.next_event().expect("next event") {
        events.push(event);
    }
    events
}

/// 심각도 필터 + 멀티패스 소유 관계 시나리오
#[test]
fn severity_filter_with_multipath_ownership() {
    let file = write_log(&[SCSI_OFFLINE, MPATH_REMAINING, DEBUG_NOISE]);
    let mut iter = EventIter::open(&config_for(&file)).expect("open iterator");
    iter.add_filter(FilterKind::Severity, "ERROR").expect("add filter");

    let events = drain(&mut iter);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_id(), "SCSI_REJECTING_IO_OFFLINE_DEVICE");
    assert_eq!(events[0].subsystem(), "scsi");
    assert_eq!(events[1].event_id(), "MULTIPATHD_REMAINING_ACTIVE_PATHS");
    assert_eq!(events[1].subsystem(), "multipath");
    assert_eq!(iter.state(), IterState::Exhausted);

    let disk = iter.block_info(&events[0]).expect("disk block");
    assert_eq!(disk.wwid(), "W1");
    assert_eq!(disk.path(), "/dev/sdb");
    let owners: Vec<&str> = iter
        .registry()
        .owners(disk.id())
        .iter()
        .map(|b| b.wwid())
        .collect();
    assert_eq!(owners, vec!["MPATH1"]);

    let map = iter.block_info(&events[1]).expect("multipath block");
    assert_eq!(map.preferred_path(), "/dev/mapper/mpatha");
    assert_eq!(map.blk_type().as_str(), "Device Mapper Multipath");
    iter.close();
}

/// WWID 필터는 소유 장치의 WWID로도 매칭된다
#[test]
fn wwid_filter_follows_owner_chain() {
    let file = write_log(&[MPATH_REMAINING, SCSI_OFFLINE, DEBUG_NOISE]);
    let mut iter = EventIter::open(&config_for(&file)).expect("open iterator");
    iter.add_filter(FilterKind::Wwid, "MPATH1").expect("add filter");

    let ids: Vec<String> = drain(&mut iter)
        .iter()
        .map(|e| e.event_id().to_owned())
        .collect();
    assert_eq!(
        ids,
        vec![
            "MULTIPATHD_REMAINING_ACTIVE_PATHS",
            "SCSI_REJECTING_IO_OFFLINE_DEVICE",
            "SCSI_SPINNING_UP_DISK",
        ]
    );
}

/// 필터 체인은 모든 조건을 만족해야 한다
#[test]
fn filters_combine_as_conjunction() {
    let file = write_log(&[SCSI_OFFLINE, MPATH_REMAINING, DEBUG_NOISE]);
    let mut iter = EventIter::open(&config_for(&file)).expect("open iterator");
    iter.add_filter(FilterKind::Subsystem, "scsi").expect("subsystem filter");
    iter.add_filter(FilterKind::Severity, "err").expect("severity filter");
    iter.add_filter(FilterKind::Since, "2024-01-01").expect("since filter");

    let events = drain(&mut iter);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].severity(), Severity::Error);
    assert_eq!(iter.filters().len(), 3);
}

/// 경로로만 알려졌던 장치가 WWID와 함께 다시 보이면 같은 노드로 합쳐진다
#[test]
fn path_only_device_gains_wwid_and_keeps_edges() {
    let file = write_log(&[
        "<11>1 2024-01-01T09:00:00Z host kernel - - - sdb: sdb1",
        "<11>1 2024-01-01T09:00:01Z host kernel - - - sd 2:0:0:1: [sdb] rejecting I/O to offline device wwid=W1",
    ]);
    let mut iter = EventIter::open(&config_for(&file)).expect("open iterator");
    let events = drain(&mut iter);
    assert_eq!(events.len(), 2);

    let first = iter.block_info(&events[0]).expect("block of first event");
    let second = iter.block_info(&events[1]).expect("block of second event");
    assert_eq!(first.id(), second.id());
    assert_eq!(first.wwid(), "W1");
    assert_eq!(first.blk_type().as_str(), "SCSI");

    let partition = iter.registry().lookup("/dev/sdb1").expect("partition");
    assert_eq!(partition.blk_type().as_str(), "Partition");
    assert_eq!(
        iter.registry().lookup("W1").expect("by wwid").owners(),
        &[partition.id()]
    );
}

/// 사용자 정의 패턴은 설정 파일에서 읽혀 내장 패턴보다 먼저 적용된다
#[test]
fn custom_pattern_from_toml() {
    let file = write_log(&["<12>Jan 15 12:00:00 host zfs: pool tank degraded vdev sdc"]);
    let toml = format!(
        r#"
[source]
path = "{}"

[[parser.patterns]]
app = "zfs"
regex = '^pool (?P<pool>\S+) degraded vdev (?P<kdev>\S+)$'
subsystem = "other"
event_type = "pool-degraded"
event_id = "ZFS_POOL_DEGRADED"
"#,
        file.path().display()
    );
    let config = BlkwatchConfig::parse(&toml).expect("config");
    let mut iter = EventIter::open(&config).expect("open iterator");
    let events = drain(&mut iter);

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_id(), "ZFS_POOL_DEGRADED");
    assert_eq!(events[0].severity(), Severity::Warning);
    assert_eq!(events[0].extension().get("pool").map(String::as_str), Some("tank"));
    assert_eq!(
        iter.block_info(&events[0]).expect("vdev").path(),
        "/dev/sdc"
    );
}

/// 열 수 없는 로그 파일
#[test]
fn open_missing_log_is_log_access_error() {
    let mut config = BlkwatchConfig::default();
    config.source.path = "/nonexistent/blkwatch/messages".to_owned();
    let err = EventIter::open(&config).expect_err("open must fail");
    assert_eq!(err.code(), ErrorCode::LogAccessError);
    assert_eq!(err.code().as_i32(), 10);
}

/// skip_unparseable 설정은 잘못된 레코드를 건너뛴다
#[test]
fn skip_unparseable_from_config() {
    let file = write_log(&["<11>", SCSI_OFFLINE]);
    let mut config = config_for(&file);
    config.engine.skip_unparseable = true;
    let mut iter = EventIter::open(&config).expect("open iterator");
    assert_eq!(drain(&mut iter).len(), 1);
}

/// JSON 출력은 다시 로그 소스로 읽어도 같은 이벤트와 장치 그래프가 된다
#[test]
fn json_output_reads_back_as_records() {
    let parser = RecordParser::new(&Default::default()).expect("parser");
    let mut first = EventIter::new(
        MemoryLogSource::new([SCSI_OFFLINE, MPATH_REMAINING]),
        parser.clone(),
    );
    let mut events = Vec::new();
    while let Some(event) = first.next_event().expect("next") {
        events.push(event);
    }
    // 소유 관계가 모두 등록된 뒤의 레지스트리로 직렬화한다
    let lines: Vec<String> = events
        .iter()
        .map(|event| event.to_json_string(first.registry()).expect("json"))
        .collect();

    let mut second = EventIter::new(MemoryLogSource::new(lines), parser);
    let mut replayed = Vec::new();
    while let Some(event) = second.next_event().expect("next") {
        replayed.push(event);
    }

    assert_eq!(replayed.len(), 2);
    assert_eq!(replayed[0].event_id(), "SCSI_REJECTING_IO_OFFLINE_DEVICE");
    assert_eq!(replayed[0].severity(), Severity::Error);
    assert_eq!(replayed[0].timestamp(), "2024-01-01T10:00:00.000000Z");
    assert_eq!(replayed[0].hostname(), "host");

    let w1 = second.registry().lookup("W1").expect("W1 replayed");
    let owners: Vec<&str> = second
        .registry()
        .owners(w1.id())
        .iter()
        .map(|b| b.wwid())
        .collect();
    assert_eq!(owners, vec!["MPATH1"]);
}
