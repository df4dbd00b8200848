//! C ABI 통합 테스트 -- 설정 파일 경로를 환경변수로 넘겨 실제 로그 파일을 읽는다

use std::ffi::{CStr, CString, c_char};
use std::io::Write;
use std::ptr;

use serial_test::serial;

use blkwatch::*;

const SCSI_OFFLINE: &str = "<11>1 2024-01-01T10:00:00Z host kernel - - - sd 2:0:0:1: [sdb] rejecting I/O to offline device wwid=W1";
const MPATH_REMAINING: &str = "<11>1 2024-01-01T10:00:01Z host multipathd - - - mpatha: remaining active paths: 1 wwid=MPATH1 paths=W1";
const DEBUG_NOISE: &str = "<15>1 2024-01-01T10:00:02Z host kernel - - - sd 2:0:0:1: [sdb] Spinning up disk...";

struct Fixture {
    _dir: tempfile::TempDir,
}

/// 로그 파일과 설정 파일을 만들고 `BLKWATCH_CONFIG`를 설정합니다.
fn fixture(lines: &[&str]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("messages");
    let mut log = std::fs::File::create(&log_path).unwrap();
    for line in lines {
        writeln!(log, "{line}").unwrap();
    }

    let config_path = dir.path().join("blkwatch.toml");
    std::fs::write(
        &config_path,
        format!("[source]\npath = \"{}\"\n", log_path.display()),
    )
    .unwrap();
    // SAFETY: serial로 실행되므로 다른 테스트와 환경변수가 겹치지 않습니다.
    unsafe { std::env::set_var(CONFIG_ENV, &config_path) };
    Fixture { _dir: dir }
}

fn clear_env() {
    // SAFETY: serial로 실행되므로 다른 테스트와 환경변수가 겹치지 않습니다.
    unsafe { std::env::remove_var(CONFIG_ENV) };
}

unsafe fn text(ptr: *const c_char) -> String {
    assert!(!ptr.is_null());
    unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_owned()
}

unsafe fn next(iter: *mut BlkwatchEventIter) -> *mut BlkwatchEvent {
    let mut event = ptr::null_mut();
    let mut error = ptr::null_mut();
    let code = unsafe { blkwatch_event_get_next(iter, &mut event, &mut error) };
    assert_eq!(code, 0);
    assert!(error.is_null());
    event
}

#[test]
#[serial]
fn severity_filter_over_c_abi() {
    let _fixture = fixture(&[SCSI_OFFLINE, MPATH_REMAINING, DEBUG_NOISE]);
    unsafe {
        let mut error = ptr::null_mut();
        let iter = blkwatch_event_iter_new(&mut error);
        assert!(!iter.is_null());
        assert!(error.is_null());

        let operand = CString::new("ERROR").unwrap();
        assert_eq!(
            blkwatch_event_iter_add_filter(iter, 2, operand.as_ptr(), &mut error),
            0
        );

        let first = next(iter);
        assert_eq!(text(blkwatch_event_id_get(first)), "SCSI_REJECTING_IO_OFFLINE_DEVICE");
        assert_eq!(blkwatch_event_severity_get(first), 3);
        assert_eq!(text(blkwatch_event_severity_str_get(first)), "ERROR");
        assert_eq!(text(blkwatch_event_hostname_get(first)), "host");
        assert!(text(blkwatch_event_raw_msg_get(first)).contains("offline device"));

        let info = blkwatch_event_blk_info_get(first);
        assert_eq!(text(blkwatch_blk_info_wwid_get(info)), "W1");
        assert_eq!(text(blkwatch_blk_info_path_get(info)), "/dev/sdb");
        assert_eq!(blkwatch_blk_info_type_get(info), 2);
        blkwatch_event_free(first);

        let second = next(iter);
        assert_eq!(text(blkwatch_event_subsystem_get(second)), "multipath");
        let info = blkwatch_event_blk_info_get(second);
        assert_eq!(blkwatch_blk_info_type_get(info), 4);
        assert_eq!(text(blkwatch_blk_info_type_str_get(info)), "Device Mapper Multipath");
        blkwatch_event_free(second);

        assert!(next(iter).is_null());
        blkwatch_event_iter_free(iter);
    }
    clear_env();
}

#[test]
#[serial]
fn owners_are_exposed_as_array() {
    let _fixture = fixture(&[MPATH_REMAINING, SCSI_OFFLINE]);
    unsafe {
        let iter = blkwatch_event_iter_new(ptr::null_mut());
        assert!(!iter.is_null());

        blkwatch_event_free(next(iter));
        let disk_event = next(iter);
        let disk = blkwatch_event_blk_info_get(disk_event);

        let mut owners = ptr::null_mut();
        let mut count = 0u32;
        blkwatch_blk_info_owners_get(disk, &mut owners, &mut count);
        assert_eq!(count, 1);
        let owner = *owners;
        assert_eq!(text(blkwatch_blk_info_wwid_get(owner)), "MPATH1");
        assert_eq!(
            text(blkwatch_blk_info_preferred_path_get(owner)),
            "/dev/mapper/mpatha"
        );
        assert_eq!(text(blkwatch_blk_info_uuid_get(owner)), "");

        blkwatch_event_free(disk_event);
        blkwatch_event_iter_free(iter);
    }
    clear_env();
}

#[test]
#[serial]
fn invalid_filter_reports_invalid_argument() {
    let _fixture = fixture(&[SCSI_OFFLINE]);
    unsafe {
        let iter = blkwatch_event_iter_new(ptr::null_mut());
        let mut error = ptr::null_mut();

        let operand = CString::new("loud").unwrap();
        let code = blkwatch_event_iter_add_filter(iter, 2, operand.as_ptr(), &mut error);
        assert_eq!(code, 9);
        assert_eq!(blkwatch_error_code_get(error), 9);
        assert!(text(blkwatch_error_msg_get(error)).contains("loud"));
        blkwatch_error_free(error);

        let code = blkwatch_event_iter_add_filter(iter, 42, operand.as_ptr(), &mut error);
        assert_eq!(code, 9);
        blkwatch_error_free(error);

        // 실패한 필터는 추가되지 않으므로 레코드가 그대로 나온다
        let event = next(iter);
        assert!(!event.is_null());
        blkwatch_event_free(event);
        blkwatch_event_iter_free(iter);
    }
    clear_env();
}

#[test]
#[serial]
fn missing_log_reports_log_access_error() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("blkwatch.toml");
    std::fs::write(&config_path, "[source]\npath = \"/nonexistent/blkwatch/messages\"\n").unwrap();
    // SAFETY: serial로 실행되므로 다른 테스트와 환경변수가 겹치지 않습니다.
    unsafe { std::env::set_var(CONFIG_ENV, &config_path) };

    unsafe {
        let mut error = ptr::null_mut();
        let iter = blkwatch_event_iter_new(&mut error);
        assert!(iter.is_null());
        assert_eq!(blkwatch_error_code_get(error), 10);
        blkwatch_error_free(error);
    }
    clear_env();
}

#[test]
#[serial]
fn broken_config_reports_conf_error() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("blkwatch.toml");
    std::fs::write(&config_path, "[source\n").unwrap();
    // SAFETY: serial로 실행되므로 다른 테스트와 환경변수가 겹치지 않습니다.
    unsafe { std::env::set_var(CONFIG_ENV, &config_path) };

    unsafe {
        let mut error = ptr::null_mut();
        assert!(blkwatch_event_iter_new(&mut error).is_null());
        assert_eq!(blkwatch_error_code_get(error), 2);
        blkwatch_error_free(error);
    }
    clear_env();
}
