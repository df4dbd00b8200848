//! 메모리 로그 소스
//!
//! 미리 준비한 레코드를 순서대로 돌려줍니다. 특정 위치에서 읽기 실패를
//! 일으키도록 설정할 수 있고, 추적 모드처럼 끝에서 `Pending`을 돌려줄 수도 있습니다.

use bytes::Bytes;

use blkwatch_core::error::BlkwatchError;

use super::{LogSource, SourceRead, SourceRecord};

/// 메모리 로그 소스
#[derive(Debug, Clone)]
pub struct MemoryLogSource {
    name: String,
    records: Vec<Bytes>,
    position: usize,
    failure: Option<(usize, BlkwatchError)>,
    live: bool,
    closed: bool,
}

impl MemoryLogSource {
    pub fn new<I, B>(records: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            name: "memory".to_owned(),
            records: records.into_iter().map(Into::into).collect(),
            position: 0,
            failure: None,
            live: false,
            closed: false,
        }
    }

    /// 여러 줄 텍스트를 줄마다 레코드로 만듭니다. 빈 줄은 건너뜁니다.
    pub fn from_lines(text: &str) -> Self {
        Self::new(
            text.lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| Bytes::copy_from_slice(line.as_bytes())),
        )
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// `index`번째 레코드를 읽을 때 `error`를 돌려주게 합니다.
    pub fn with_failure_at(mut self, index: usize, error: BlkwatchError) -> Self {
        self.failure = Some((index, error));
        self
    }

    /// 끝에서 `End` 대신 `Pending`을 돌려주게 합니다.
    pub fn live(mut self) -> Self {
        self.live = true;
        self
    }

    /// 레코드를 뒤에 추가합니다.
    pub fn push(&mut self, record: impl Into<Bytes>) {
        self.records.push(record.into());
    }

    /// 다음에 읽을 레코드 위치
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<(), BlkwatchError> {
        if self.closed {
            return Err(BlkwatchError::LogAccess(format!(
                "{}: log source is closed",
                self.name
            )));
        }
        Ok(())
    }
}

impl LogSource for MemoryLogSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_record(&mut self) -> Result<SourceRead, BlkwatchError> {
        self.ensure_open()?;
        if let Some((index, error)) = &self.failure {
            if *index == self.position {
                return Err(error.clone());
            }
        }

        match self.records.get(self.position) {
            Some(data) => {
                let record = SourceRecord::new(data.clone(), self.name.clone(), self.position as u64);
                self.position += 1;
                Ok(SourceRead::Record(record))
            }
            None if self.live => Ok(SourceRead::Pending),
            None => Ok(SourceRead::End),
        }
    }

    fn rewind(&mut self) -> Result<(), BlkwatchError> {
        self.ensure_open()?;
        self.position = 0;
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
