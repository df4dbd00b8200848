//! 로그 소스: 원시 레코드를 한 줄씩 공급합니다.
//!
//! # 소스 종류
//! - [`FileLogSource`]: 줄 단위 로그 파일 (선택적으로 `tail -f` 방식 추적)
//! - [`MemoryLogSource`]: 메모리에 있는 레코드 (테스트, 임베딩)
//!
//! # 읽기 결과
//! 소스는 동기적으로 한 번에 한 레코드를 돌려줍니다. 추적 중인 소스에 아직
//! 데이터가 없으면 [`SourceRead::Pending`]을 돌려주며, 대기 시간은 호출자가 정합니다.

pub mod file;
pub mod memory;

pub use file::FileLogSource;
pub use memory::MemoryLogSource;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use blkwatch_core::error::BlkwatchError;

/// 로그 소스에서 읽은 원시 레코드
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    /// 줄바꿈을 뺀 레코드 바이트
    pub data: Bytes,
    /// 소스 식별자 (예: `file:/var/log/messages`)
    pub source: String,
    /// 소스가 알고 있는 기록 시각 (헤더에 타임스탬프가 없을 때 사용)
    pub timestamp: Option<DateTime<Utc>>,
    /// 소스 안에서의 위치 (파일이면 바이트 오프셋, 메모리면 인덱스)
    pub offset: u64,
}

impl SourceRecord {
    /// 타임스탬프 없는 레코드를 만듭니다.
    pub fn new(data: impl Into<Bytes>, source: impl Into<String>, offset: u64) -> Self {
        Self {
            data: data.into(),
            source: source.into(),
            timestamp: None,
            offset,
        }
    }

    /// 소스 타임스탬프를 지정합니다.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// 한 번 읽기의 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRead {
    /// 레코드 하나
    Record(SourceRecord),
    /// 추적 중인 소스에 아직 새 데이터가 없음
    Pending,
    /// 소스 끝
    End,
}

/// 로그 소스 경계
///
/// 반복자는 이 trait만 보고 레코드를 당겨옵니다.
pub trait LogSource {
    /// 소스 식별자
    fn name(&self) -> &str;

    /// 다음 레코드를 읽습니다.
    ///
    /// # Errors
    /// 읽기에 실패하거나 이미 닫힌 소스면 `LOG_ACCESS_ERROR`.
    fn read_record(&mut self) -> Result<SourceRead, BlkwatchError>;

    /// 처음 위치로 되돌립니다.
    ///
    /// # Errors
    /// 되돌릴 수 없거나 이미 닫힌 소스면 `LOG_ACCESS_ERROR`.
    fn rewind(&mut self) -> Result<(), BlkwatchError>;

    /// 소스를 닫습니다. 여러 번 호출해도 안전합니다.
    fn close(&mut self);
}
