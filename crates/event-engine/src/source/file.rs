//! 파일 기반 로그 소스
//!
//! 로그 파일을 줄 단위로 읽습니다. 추적 모드(`follow`)에서는 파일 끝에서
//! [`SourceRead::Pending`]을 돌려주고, 다음 호출에서 새로 추가된 줄을 읽습니다.
//!
//! # 추적 모드 동작
//! - 줄바꿈으로 끝나지 않은 마지막 줄은 완성될 때까지 보관합니다.
//! - 파일 크기가 읽은 위치보다 작아지면 (truncation) 처음부터 다시 읽습니다.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, info, warn};

use blkwatch_core::config::SourceConfig;
use blkwatch_core::error::BlkwatchError;

use super::{LogSource, SourceRead, SourceRecord};

/// 파일 기반 로그 소스
#[derive(Debug)]
pub struct FileLogSource {
    path: PathBuf,
    name: String,
    reader: Option<BufReader<File>>,
    follow: bool,
    max_line_length: usize,
    /// 지금까지 읽은 바이트 수
    offset: u64,
    /// 추적 모드에서 아직 줄바꿈을 만나지 못한 바이트
    partial: Vec<u8>,
}

impl FileLogSource {
    /// 로그 파일을 엽니다.
    ///
    /// # Errors
    /// 파일을 열 수 없으면 `LOG_ACCESS_ERROR`.
    pub fn open(
        path: impl AsRef<Path>,
        follow: bool,
        max_line_length: usize,
    ) -> Result<Self, BlkwatchError> {
        let path = path.as_ref().to_path_buf();
        let name = format!("file:{}", path.display());
        let file = File::open(&path).map_err(|e| BlkwatchError::log_access(&name, e))?;
        info!(source = name.as_str(), follow, "log source opened");

        Ok(Self {
            path,
            name,
            reader: Some(BufReader::new(file)),
            follow,
            max_line_length,
            offset: 0,
            partial: Vec::new(),
        })
    }

    /// `[source]` 설정으로 엽니다.
    ///
    /// # Errors
    /// 파일을 열 수 없으면 `LOG_ACCESS_ERROR`.
    pub fn from_config(config: &SourceConfig) -> Result<Self, BlkwatchError> {
        Self::open(&config.path, config.follow, config.max_line_length)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 추적 모드인지
    pub fn is_follow(&self) -> bool {
        self.follow
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    fn closed_error(&self) -> BlkwatchError {
        BlkwatchError::LogAccess(format!("{}: log source is closed", self.name))
    }

    /// 파일이 읽은 위치보다 짧아졌으면 처음으로 돌아갑니다.
    fn detect_truncation(&mut self) -> Result<(), BlkwatchError> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(());
        };
        let len = reader
            .get_ref()
            .metadata()
            .map_err(|e| BlkwatchError::log_access(&self.name, e))?
            .len();
        if len < self.offset {
            info!(
                source = self.name.as_str(),
                previous = self.offset,
                current = len,
                "log file truncated, reading from start"
            );
            reader
                .seek(SeekFrom::Start(0))
                .map_err(|e| BlkwatchError::log_access(&self.name, e))?;
            self.offset = 0;
            self.partial.clear();
        }
        Ok(())
    }
}

impl LogSource for FileLogSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_record(&mut self) -> Result<SourceRead, BlkwatchError> {
        if self.reader.is_none() {
            return Err(self.closed_error());
        }
        if self.follow {
            self.detect_truncation()?;
        }

        loop {
            let Some(reader) = self.reader.as_mut() else {
                return Err(self.closed_error());
            };

            let start = self.offset - self.partial.len() as u64;
            let mut buf = Vec::new();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| BlkwatchError::log_access(&self.name, e))?;
            if read == 0 {
                return Ok(if self.follow {
                    SourceRead::Pending
                } else {
                    SourceRead::End
                });
            }
            self.offset += read as u64;

            let complete = buf.last() == Some(&b'\n');
            if !complete && self.follow {
                self.partial.extend_from_slice(&buf);
                return Ok(SourceRead::Pending);
            }

            let mut line = std::mem::take(&mut self.partial);
            line.extend_from_slice(&buf);
            while matches!(line.last(), Some(b'\n' | b'\r')) {
                line.pop();
            }

            if line.iter().all(u8::is_ascii_whitespace) {
                debug!(source = self.name.as_str(), offset = start, "skipping blank line");
                continue;
            }
            if line.len() > self.max_line_length {
                warn!(
                    source = self.name.as_str(),
                    offset = start,
                    length = line.len(),
                    max = self.max_line_length,
                    "line exceeds max_line_length, truncating"
                );
                line.truncate(self.max_line_length);
            }

            return Ok(SourceRead::Record(SourceRecord::new(
                Bytes::from(line),
                self.name.clone(),
                start,
            )));
        }
    }

    fn rewind(&mut self) -> Result<(), BlkwatchError> {
        let Some(reader) = self.reader.as_mut() else {
            return Err(self.closed_error());
        };
        reader
            .seek(SeekFrom::Start(0))
            .map_err(|e| BlkwatchError::log_access(&self.name, e))?;
        self.offset = 0;
        self.partial.clear();
        debug!(source = self.name.as_str(), "log source rewound");
        Ok(())
    }

    fn close(&mut self) {
        if self.reader.take().is_some() {
            debug!(source = self.name.as_str(), "log source closed");
        }
    }
}
