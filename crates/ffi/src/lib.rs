//! blkwatch C ABI
//!
//! `include/blkwatch.h`에 선언된 함수들의 구현입니다. 모든 핸들은 불투명
//! 포인터이며, `*_free` 함수로만 해제합니다. 해제 함수는 NULL을 받아도 됩니다.
//!
//! # 소유권 규칙
//! - `blkwatch_event_iter_new`, `blkwatch_event_get_next`가 돌려준 핸들과
//!   에러 출력 인자로 받은 에러는 호출자가 해제합니다.
//! - 이벤트에서 얻은 문자열과 블록 정보는 이벤트가 해제될 때까지 유효합니다.
//! - 블록 정보는 이벤트가 반환된 시점의 레지스트리 스냅샷입니다.

use std::collections::HashMap;
use std::ffi::{CStr, CString, c_char, c_int};
use std::ptr;
use std::rc::Rc;

use tracing::debug;

use blkwatch_core::config::BlkwatchConfig;
use blkwatch_core::error::BlkwatchError;
use blkwatch_core::types::{BlkType, Severity};
use blkwatch_event_engine::{
    BlockId, BlockInfo, BlockRegistry, Event, EventIter, FileLogSource, FilterKind,
};

/// 설정 파일 경로를 지정하는 환경변수
pub const CONFIG_ENV: &str = "BLKWATCH_CONFIG";

/// 이벤트 반복자 핸들 (`struct blkwatch_event_iter`)
pub struct BlkwatchEventIter {
    inner: EventIter<FileLogSource>,
}

/// 이벤트 핸들 (`struct blkwatch_event`)
pub struct BlkwatchEvent {
    hostname: CString,
    severity: Severity,
    severity_str: CString,
    subsystem: CString,
    timestamp: CString,
    event_id: CString,
    event_type: CString,
    msg: CString,
    raw_msg: CString,
    blk_info: Option<Rc<BlkwatchBlkInfo>>,
}

/// 블록 장치 정보 핸들 (`struct blkwatch_blk_info`)
pub struct BlkwatchBlkInfo {
    wwid: CString,
    blk_type: BlkType,
    type_str: CString,
    preferred_path: CString,
    path: CString,
    uuid: CString,
    mount_point: CString,
    transaction_id: CString,
    owners: Vec<Rc<BlkwatchBlkInfo>>,
    owner_ptrs: Vec<*mut BlkwatchBlkInfo>,
}

/// 에러 핸들 (`struct blkwatch_error`)
pub struct BlkwatchErrorHandle {
    msg: CString,
    code: c_int,
}

/// NUL 바이트를 제거하고 C 문자열로 바꿉니다.
fn to_cstring(s: &str) -> CString {
    CString::new(s.replace('\0', "")).unwrap_or_default()
}

impl BlkwatchBlkInfo {
    /// 같은 이벤트 안에서 여러 번 나오는 소유 장치는 한 번만 만들어 공유합니다.
    fn snapshot(
        registry: &BlockRegistry,
        info: &BlockInfo,
        memo: &mut HashMap<BlockId, Rc<Self>>,
    ) -> Rc<Self> {
        if let Some(done) = memo.get(&info.id()) {
            return Rc::clone(done);
        }
        // 소유 관계 그래프는 DAG이므로 재귀가 끝납니다.
        let owners: Vec<Rc<Self>> = registry
            .owners(info.id())
            .into_iter()
            .map(|owner| Self::snapshot(registry, owner, memo))
            .collect();
        let owner_ptrs = owners
            .iter()
            .map(|owner| Rc::as_ptr(owner).cast_mut())
            .collect();

        let snapshot = Rc::new(Self {
            wwid: to_cstring(info.wwid()),
            blk_type: info.blk_type(),
            type_str: to_cstring(info.blk_type().as_str()),
            preferred_path: to_cstring(info.preferred_path()),
            path: to_cstring(info.path()),
            uuid: to_cstring(info.uuid().unwrap_or_default()),
            mount_point: to_cstring(info.mount_point().unwrap_or_default()),
            transaction_id: to_cstring(info.transaction_id()),
            owners,
            owner_ptrs,
        });
        memo.insert(info.id(), Rc::clone(&snapshot));
        snapshot
    }
}

impl BlkwatchEvent {
    fn snapshot(event: &Event, iter: &EventIter<FileLogSource>) -> Box<Self> {
        let blk_info = iter
            .block_info(event)
            .map(|info| BlkwatchBlkInfo::snapshot(iter.registry(), info, &mut HashMap::new()));

        Box::new(Self {
            hostname: to_cstring(event.hostname()),
            severity: event.severity(),
            severity_str: to_cstring(event.severity().as_str()),
            subsystem: to_cstring(event.subsystem()),
            timestamp: to_cstring(event.timestamp()),
            event_id: to_cstring(event.event_id()),
            event_type: to_cstring(event.event_type()),
            msg: to_cstring(event.message()),
            raw_msg: to_cstring(event.raw_message()),
            blk_info,
        })
    }
}

impl From<&BlkwatchError> for BlkwatchErrorHandle {
    fn from(err: &BlkwatchError) -> Self {
        Self {
            msg: to_cstring(&err.to_string()),
            code: err.code().as_i32(),
        }
    }
}

/// `$BLKWATCH_CONFIG` 설정 파일을 읽거나, 없으면 기본값에 환경변수를 적용합니다.
fn load_config() -> Result<BlkwatchConfig, BlkwatchError> {
    match std::env::var(CONFIG_ENV) {
        Ok(path) if !path.is_empty() => BlkwatchConfig::load_blocking(path),
        _ => {
            let mut config = BlkwatchConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }
}

/// 에러 출력 인자를 NULL로 초기화합니다.
///
/// # Safety
/// `error`는 NULL이거나 쓰기 가능한 포인터여야 합니다.
unsafe fn clear_error(error: *mut *mut BlkwatchErrorHandle) {
    if !error.is_null() {
        // SAFETY: 호출자가 쓰기 가능함을 보장합니다.
        unsafe { *error = ptr::null_mut() };
    }
}

/// 에러를 출력 인자에 기록하고 코드를 돌려줍니다.
///
/// # Safety
/// `error`는 NULL이거나 쓰기 가능한 포인터여야 합니다.
unsafe fn report_error(error: *mut *mut BlkwatchErrorHandle, err: &BlkwatchError) -> c_int {
    debug!(code = err.code().as_i32(), error = %err, "returning error over C ABI");
    if !error.is_null() {
        let handle = Box::new(BlkwatchErrorHandle::from(err));
        // SAFETY: 호출자가 쓰기 가능함을 보장합니다.
        unsafe { *error = Box::into_raw(handle) };
    }
    err.code().as_i32()
}

/// 이벤트 반복자를 만듭니다. 실패하면 NULL을 돌려주고 `*error`를 채웁니다.
///
/// # Safety
/// `error`는 NULL이거나 쓰기 가능한 포인터여야 합니다.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blkwatch_event_iter_new(
    error: *mut *mut BlkwatchErrorHandle,
) -> *mut BlkwatchEventIter {
    // SAFETY: 호출자 보장을 그대로 전달합니다.
    unsafe { clear_error(error) };

    match load_config().and_then(|config| EventIter::open(&config)) {
        Ok(inner) => Box::into_raw(Box::new(BlkwatchEventIter { inner })),
        Err(err) => {
            // SAFETY: 호출자 보장을 그대로 전달합니다.
            unsafe { report_error(error, &err) };
            ptr::null_mut()
        }
    }
}

/// 반복자를 닫고 해제합니다.
///
/// # Safety
/// `iter`는 NULL이거나 `blkwatch_event_iter_new`가 돌려준, 아직 해제되지 않은 포인터여야 합니다.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blkwatch_event_iter_free(iter: *mut BlkwatchEventIter) {
    if iter.is_null() {
        return;
    }
    // SAFETY: Box::into_raw로 만든 포인터이며 한 번만 해제됩니다.
    let iter = unsafe { Box::from_raw(iter) };
    iter.inner.close();
}

/// 필터를 추가합니다. 반복자는 처음으로 되돌아갑니다.
///
/// `filter_type`은 `enum blkwatch_event_filter_type` 값입니다.
///
/// # Safety
/// `iter`는 유효한 반복자, `operand`는 NULL이거나 NUL로 끝나는 문자열,
/// `error`는 NULL이거나 쓰기 가능한 포인터여야 합니다.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blkwatch_event_iter_add_filter(
    iter: *mut BlkwatchEventIter,
    filter_type: c_int,
    operand: *const c_char,
    error: *mut *mut BlkwatchErrorHandle,
) -> c_int {
    // SAFETY: 호출자 보장을 그대로 전달합니다.
    unsafe { clear_error(error) };

    if iter.is_null() || operand.is_null() {
        let err = BlkwatchError::InvalidArgument("iterator and operand must not be NULL".to_owned());
        // SAFETY: 위와 같음.
        return unsafe { report_error(error, &err) };
    }

    // SAFETY: NULL이 아니며 호출자가 유효한 문자열임을 보장합니다.
    let operand = unsafe { CStr::from_ptr(operand) };
    // SAFETY: NULL이 아니며 호출자가 유효한 반복자임을 보장합니다.
    let iter = unsafe { &mut *iter };

    let result = FilterKind::try_from(filter_type).and_then(|kind| {
        let operand = operand.to_str().map_err(|e| {
            BlkwatchError::InvalidArgument(format!("filter operand is not UTF-8: {e}"))
        })?;
        iter.inner.add_filter(kind, operand)
    });

    match result {
        Ok(()) => 0,
        // SAFETY: 호출자 보장을 그대로 전달합니다.
        Err(err) => unsafe { report_error(error, &err) },
    }
}

/// 다음 이벤트를 가져옵니다.
///
/// 이벤트가 있으면 `*event`에 핸들을 쓰고 0을 돌려줍니다. 더 읽을 이벤트가
/// 없으면 `*event`는 NULL이고 0을 돌려줍니다. 실패하면 에러 코드를 돌려주고
/// `*error`를 채웁니다.
///
/// # Safety
/// `iter`는 유효한 반복자, `event`는 쓰기 가능한 포인터, `error`는 NULL이거나
/// 쓰기 가능한 포인터여야 합니다.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blkwatch_event_get_next(
    iter: *mut BlkwatchEventIter,
    event: *mut *mut BlkwatchEvent,
    error: *mut *mut BlkwatchErrorHandle,
) -> c_int {
    // SAFETY: 호출자 보장을 그대로 전달합니다.
    unsafe { clear_error(error) };

    if iter.is_null() || event.is_null() {
        let err = BlkwatchError::InvalidArgument("iterator and event must not be NULL".to_owned());
        // SAFETY: 위와 같음.
        return unsafe { report_error(error, &err) };
    }

    // SAFETY: NULL이 아니며 호출자가 유효함을 보장합니다.
    let (iter, event) = unsafe { (&mut *iter, &mut *event) };
    *event = ptr::null_mut();

    match iter.inner.next_event() {
        Ok(Some(next)) => {
            *event = Box::into_raw(BlkwatchEvent::snapshot(&next, &iter.inner));
            0
        }
        Ok(None) => 0,
        // SAFETY: 호출자 보장을 그대로 전달합니다.
        Err(err) => unsafe { report_error(error, &err) },
    }
}

/// 이벤트를 해제합니다.
///
/// # Safety
/// `event`는 NULL이거나 `blkwatch_event_get_next`가 돌려준, 아직 해제되지 않은 포인터여야 합니다.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blkwatch_event_free(event: *mut BlkwatchEvent) {
    if !event.is_null() {
        // SAFETY: Box::into_raw로 만든 포인터이며 한 번만 해제됩니다.
        drop(unsafe { Box::from_raw(event) });
    }
}

/// 핸들의 문자열 필드를 돌려주는 접근자를 만듭니다. 핸들이 NULL이면 NULL.
macro_rules! cstr_getter {
    ($(#[$doc:meta])* $name:ident, $handle:ty, $field:ident) => {
        $(#[$doc])*
        ///
        /// # Safety
        /// 핸들은 NULL이거나 아직 해제되지 않은 유효한 포인터여야 합니다.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $name(handle: *const $handle) -> *const c_char {
            if handle.is_null() {
                return ptr::null();
            }
            // SAFETY: NULL이 아니며 호출자가 유효함을 보장합니다.
            unsafe { (*handle).$field.as_ptr() }
        }
    };
}

cstr_getter!(
    /// 호스트명
    blkwatch_event_hostname_get, BlkwatchEvent, hostname
);
cstr_getter!(
    /// 심각도 이름 (`"ERROR"` 등)
    blkwatch_event_severity_str_get, BlkwatchEvent, severity_str
);
cstr_getter!(
    /// 서브시스템 이름
    blkwatch_event_subsystem_get, BlkwatchEvent, subsystem
);
cstr_getter!(
    /// RFC 3339 타임스탬프
    blkwatch_event_timestamp_get, BlkwatchEvent, timestamp
);
cstr_getter!(blkwatch_event_id_get, BlkwatchEvent, event_id);
cstr_getter!(blkwatch_event_type_get, BlkwatchEvent, event_type);
cstr_getter!(blkwatch_event_msg_get, BlkwatchEvent, msg);
cstr_getter!(
    /// 원본 레코드 텍스트
    blkwatch_event_raw_msg_get, BlkwatchEvent, raw_msg
);

cstr_getter!(blkwatch_blk_info_wwid_get, BlkwatchBlkInfo, wwid);
cstr_getter!(
    /// 장치 종류 이름 (`"Device Mapper Multipath"` 등)
    blkwatch_blk_info_type_str_get, BlkwatchBlkInfo, type_str
);
cstr_getter!(blkwatch_blk_info_preferred_path_get, BlkwatchBlkInfo, preferred_path);
cstr_getter!(blkwatch_blk_info_path_get, BlkwatchBlkInfo, path);
cstr_getter!(
    /// 파일시스템 UUID. 모르면 빈 문자열.
    blkwatch_blk_info_uuid_get, BlkwatchBlkInfo, uuid
);
cstr_getter!(
    /// 마운트 위치. 모르면 빈 문자열.
    blkwatch_blk_info_mount_point_get, BlkwatchBlkInfo, mount_point
);
cstr_getter!(blkwatch_blk_info_transaction_id_get, BlkwatchBlkInfo, transaction_id);
cstr_getter!(blkwatch_error_msg_get, BlkwatchErrorHandle, msg);

/// 심각도 숫자 값 (0..=7, 모르면 255). 핸들이 NULL이면 255.
///
/// # Safety
/// `event`는 NULL이거나 유효한 이벤트여야 합니다.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blkwatch_event_severity_get(event: *const BlkwatchEvent) -> c_int {
    if event.is_null() {
        return c_int::from(Severity::Unknown.as_u8());
    }
    // SAFETY: NULL이 아니며 호출자가 유효함을 보장합니다.
    c_int::from(unsafe { (*event).severity.as_u8() })
}

/// 이벤트가 가리키는 블록 장치. 없으면 NULL. 이벤트가 해제될 때 함께 해제됩니다.
///
/// # Safety
/// `event`는 NULL이거나 유효한 이벤트여야 합니다.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blkwatch_event_blk_info_get(
    event: *mut BlkwatchEvent,
) -> *mut BlkwatchBlkInfo {
    if event.is_null() {
        return ptr::null_mut();
    }
    // SAFETY: NULL이 아니며 호출자가 유효함을 보장합니다.
    match unsafe { (*event).blk_info.as_ref() } {
        Some(info) => Rc::as_ptr(info).cast_mut(),
        None => ptr::null_mut(),
    }
}

/// 장치 종류 숫자 값 (`enum blkwatch_blk_type`). 핸들이 NULL이면 UNKNOWN.
///
/// # Safety
/// `info`는 NULL이거나 유효한 블록 정보여야 합니다.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blkwatch_blk_info_type_get(info: *const BlkwatchBlkInfo) -> c_int {
    if info.is_null() {
        return c_int::from(BlkType::Unknown as u8);
    }
    // SAFETY: NULL이 아니며 호출자가 유효함을 보장합니다.
    c_int::from(unsafe { (*info).blk_type as u8 })
}

/// 직접 소유 장치 배열과 개수를 돌려줍니다.
///
/// 배열과 원소는 `info`가 속한 이벤트가 해제될 때 함께 해제됩니다.
/// 소유 장치가 없거나 `info`가 NULL이면 `*owners`는 NULL, `*count`는 0입니다.
///
/// # Safety
/// `info`는 NULL이거나 유효한 블록 정보, `owners`와 `count`는 NULL이거나
/// 쓰기 가능한 포인터여야 합니다.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blkwatch_blk_info_owners_get(
    info: *mut BlkwatchBlkInfo,
    owners: *mut *mut *mut BlkwatchBlkInfo,
    count: *mut u32,
) {
    let (array, len) = if info.is_null() {
        (ptr::null_mut(), 0)
    } else {
        // SAFETY: NULL이 아니며 호출자가 유효함을 보장합니다.
        let info = unsafe { &*info };
        if info.owner_ptrs.is_empty() {
            (ptr::null_mut(), 0)
        } else {
            let len = u32::try_from(info.owner_ptrs.len()).unwrap_or(u32::MAX);
            (info.owner_ptrs.as_ptr().cast_mut(), len)
        }
    };

    if !owners.is_null() {
        // SAFETY: 호출자가 쓰기 가능함을 보장합니다.
        unsafe { *owners = array };
    }
    if !count.is_null() {
        // SAFETY: 호출자가 쓰기 가능함을 보장합니다.
        unsafe { *count = len };
    }
}

/// 에러 코드. 핸들이 NULL이면 0 (OK).
///
/// # Safety
/// `error`는 NULL이거나 유효한 에러여야 합니다.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blkwatch_error_code_get(error: *const BlkwatchErrorHandle) -> c_int {
    if error.is_null() {
        return 0;
    }
    // SAFETY: NULL이 아니며 호출자가 유효함을 보장합니다.
    unsafe { (*error).code }
}

/// 에러를 해제합니다.
///
/// # Safety
/// `error`는 NULL이거나 이 라이브러리가 돌려준, 아직 해제되지 않은 포인터여야 합니다.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn blkwatch_error_free(error: *mut BlkwatchErrorHandle) {
    if !error.is_null() {
        // SAFETY: Box::into_raw로 만든 포인터이며 한 번만 해제됩니다.
        drop(unsafe { Box::from_raw(error) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_cstring_strips_interior_nul() {
        assert_eq!(to_cstring("a\0b").as_bytes(), b"ab");
        assert_eq!(to_cstring("").as_bytes(), b"");
    }

    #[test]
    fn error_handle_keeps_code_and_message() {
        let err = BlkwatchError::BlockNoExists("W9".to_owned());
        let handle = BlkwatchErrorHandle::from(&err);
        assert_eq!(handle.code, 7);
        assert_eq!(handle.msg.to_str().unwrap(), "block does not exist: W9");
    }

    #[test]
    fn null_handles_are_tolerated() {
        unsafe {
            blkwatch_event_iter_free(ptr::null_mut());
            blkwatch_event_free(ptr::null_mut());
            blkwatch_error_free(ptr::null_mut());
            assert!(blkwatch_event_hostname_get(ptr::null()).is_null());
            assert!(blkwatch_blk_info_wwid_get(ptr::null()).is_null());
            assert!(blkwatch_event_blk_info_get(ptr::null_mut()).is_null());
            assert_eq!(blkwatch_event_severity_get(ptr::null()), 255);
            assert_eq!(blkwatch_blk_info_type_get(ptr::null()), 0);
            assert_eq!(blkwatch_error_code_get(ptr::null()), 0);

            let mut owners = ptr::dangling_mut::<*mut BlkwatchBlkInfo>();
            let mut count = 7u32;
            blkwatch_blk_info_owners_get(ptr::null_mut(), &mut owners, &mut count);
            assert!(owners.is_null());
            assert_eq!(count, 0);
        }
    }

    #[test]
    fn shared_owner_is_snapshotted_once() {
        use blkwatch_event_engine::BlockHint;

        let mut reg = BlockRegistry::new();
        let part = reg.resolve_or_create(&BlockHint::with_path("/dev/sdb1")).unwrap();
        let lv1 = reg.resolve_or_create(&BlockHint::with_wwid("LVM-1")).unwrap();
        let lv2 = reg.resolve_or_create(&BlockHint::with_wwid("LVM-2")).unwrap();
        let fs = reg.resolve_or_create(&BlockHint::with_wwid("FS-1")).unwrap();
        reg.link(part, lv1).unwrap();
        reg.link(part, lv2).unwrap();
        reg.link(lv1, fs).unwrap();
        reg.link(lv2, fs).unwrap();

        let info = reg.get(part).unwrap();
        let snapshot = BlkwatchBlkInfo::snapshot(&reg, info, &mut HashMap::new());
        assert_eq!(snapshot.owners.len(), 2);
        let (left, right) = (&snapshot.owners[0], &snapshot.owners[1]);
        assert_eq!(left.wwid.to_str().unwrap(), "LVM-1");
        assert!(Rc::ptr_eq(&left.owners[0], &right.owners[0]));
        assert_eq!(left.owner_ptrs[0], Rc::as_ptr(&right.owners[0]).cast_mut());
        assert_eq!(left.owners[0].wwid.to_str().unwrap(), "FS-1");
    }

    #[test]
    fn get_next_rejects_null_iterator() {
        let mut event = ptr::null_mut();
        let mut error = ptr::null_mut();
        unsafe {
            let code = blkwatch_event_get_next(ptr::null_mut(), &mut event, &mut error);
            assert_eq!(code, 9);
            assert_eq!(blkwatch_error_code_get(error), 9);
            blkwatch_error_free(error);
        }
    }
}
