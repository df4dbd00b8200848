//! 설정 관리: blkwatch.toml 파싱 및 런타임 설정
//!
//! [`BlkwatchConfig`]는 모든 구성 요소의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`BLKWATCH_SOURCE_PATH=/var/log/kern.log` 형식)
//! 3. 설정 파일 (`blkwatch.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), blkwatch_core::error::BlkwatchError> {
//! use blkwatch_core::config::BlkwatchConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = BlkwatchConfig::load("blkwatch.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = BlkwatchConfig::parse("[source]\npath = \"/var/log/kern.log\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::BlkwatchError;
use crate::types::{BlkType, Subsystem};

/// 기본 로그 파일 경로
pub const DEFAULT_LOG_PATH: &str = "/var/log/messages";

/// 레코드 최대 크기 기본값 (64KB)
pub const DEFAULT_MAX_INPUT_SIZE: usize = 64 * 1024;

/// blkwatch 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlkwatchConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 로그 소스 설정
    #[serde(default)]
    pub source: SourceConfig,
    /// 레코드 파서 설정
    #[serde(default)]
    pub parser: ParserConfig,
    /// 이벤트 반복자 설정
    #[serde(default)]
    pub engine: EngineConfig,
}

impl BlkwatchConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, BlkwatchError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, BlkwatchError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BlkwatchError::Conf(format!("config file not found: {}", path.display()))
            } else {
                BlkwatchError::Conf(format!("failed to read {}: {e}", path.display()))
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일을 동기적으로 로드합니다.
    ///
    /// 비동기 런타임이 없는 호출자(C ABI)를 위한 경로입니다.
    /// 환경변수 오버라이드와 검증을 모두 적용합니다.
    pub fn load_blocking(path: impl AsRef<Path>) -> Result<Self, BlkwatchError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BlkwatchError::Conf(format!("failed to read {}: {e}", path.display()))
        })?;
        let mut config = Self::parse(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, BlkwatchError> {
        toml::from_str(toml_str)
            .map_err(|e| BlkwatchError::Conf(format!("failed to parse config: {e}")))
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `BLKWATCH_{SECTION}_{FIELD}`
    /// 예: `BLKWATCH_SOURCE_FOLLOW=true`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "BLKWATCH_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "BLKWATCH_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.hostname, "BLKWATCH_GENERAL_HOSTNAME");

        // Source
        override_string(&mut self.source.path, "BLKWATCH_SOURCE_PATH");
        override_bool(&mut self.source.follow, "BLKWATCH_SOURCE_FOLLOW");
        override_u64(
            &mut self.source.poll_interval_ms,
            "BLKWATCH_SOURCE_POLL_INTERVAL_MS",
        );
        override_usize(
            &mut self.source.max_line_length,
            "BLKWATCH_SOURCE_MAX_LINE_LENGTH",
        );

        // Parser
        override_usize(
            &mut self.parser.max_input_size,
            "BLKWATCH_PARSER_MAX_INPUT_SIZE",
        );

        // Engine
        override_bool(
            &mut self.engine.skip_unparseable,
            "BLKWATCH_ENGINE_SKIP_UNPARSEABLE",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), BlkwatchError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid_value(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid_value(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.source.path.is_empty() {
            return Err(invalid_value("source.path", "must not be empty"));
        }

        if self.source.poll_interval_ms == 0 {
            return Err(invalid_value("source.poll_interval_ms", "must be greater than 0"));
        }

        if self.source.max_line_length == 0 {
            return Err(invalid_value("source.max_line_length", "must be greater than 0"));
        }

        if self.parser.max_input_size == 0 {
            return Err(invalid_value("parser.max_input_size", "must be greater than 0"));
        }

        for (idx, pattern) in self.parser.patterns.iter().enumerate() {
            pattern.validate().map_err(|reason| {
                invalid_value(&format!("parser.patterns[{idx}]"), reason)
            })?;
        }

        Ok(())
    }
}

fn invalid_value(field: &str, reason: impl Into<String>) -> BlkwatchError {
    BlkwatchError::Conf(format!(
        "invalid config value for '{field}': {}",
        reason.into()
    ))
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 레코드에 호스트명이 없을 때 사용할 값
    pub hostname: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
            hostname: "localhost".to_owned(),
        }
    }
}

/// 로그 소스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// 읽을 로그 파일 경로
    pub path: String,
    /// 파일 끝에서 새 레코드를 기다릴지 여부
    pub follow: bool,
    /// follow 모드 폴링 간격 (밀리초)
    pub poll_interval_ms: u64,
    /// 한 줄 최대 길이 (바이트). 초과분은 잘라냅니다.
    pub max_line_length: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_LOG_PATH.to_owned(),
            follow: false,
            poll_interval_ms: 500,
            max_line_length: DEFAULT_MAX_INPUT_SIZE,
        }
    }
}

/// 레코드 파서 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// 레코드 최대 크기 (바이트)
    pub max_input_size: usize,
    /// 사용자 정의 분류 패턴. 내장 패턴보다 먼저 평가됩니다.
    pub patterns: Vec<PatternConfig>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_input_size: DEFAULT_MAX_INPUT_SIZE,
            patterns: Vec::new(),
        }
    }
}

/// 사용자 정의 분류 패턴
///
/// ```toml
/// [[parser.patterns]]
/// starts_with = "blk_update_request"
/// regex = 'I/O error, dev (?P<kdev>sd[a-z]+)'
/// subsystem = "scsi"
/// event_type = "io-error"
/// event_id = "BLK_IO_ERROR"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// 본문 접두어. 지정하면 정규식 평가 전에 빠르게 거릅니다.
    pub starts_with: Option<String>,
    /// 프로그램 태그 (`multipathd` 등). 지정하면 태그가 같아야 합니다.
    pub app: Option<String>,
    /// 본문에 적용할 정규식. 이름 있는 캡처를 사용할 수 있습니다.
    pub regex: String,
    /// 서브시스템 이름
    pub subsystem: String,
    /// 이벤트 분류
    pub event_type: String,
    /// 이벤트 식별자
    pub event_id: String,
    /// `dmname` 캡처로 식별된 장치의 종류
    pub blk_type: Option<String>,
}

impl PatternConfig {
    /// 정규식 컴파일을 제외한 필드 검증
    fn validate(&self) -> Result<(), String> {
        if self.regex.is_empty() {
            return Err("regex must not be empty".to_owned());
        }
        if Subsystem::from_str_loose(&self.subsystem).is_none() {
            return Err(format!("unknown subsystem '{}'", self.subsystem));
        }
        if self.event_type.is_empty() {
            return Err("event_type must not be empty".to_owned());
        }
        if self.event_id.is_empty() {
            return Err("event_id must not be empty".to_owned());
        }
        match &self.blk_type {
            Some(blk_type) if BlkType::from_str_loose(blk_type).is_none() => {
                Err(format!("unknown blk_type '{blk_type}'"))
            }
            _ => Ok(()),
        }
    }
}

/// 이벤트 반복자 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 해석할 수 없는 레코드를 에러로 돌려주지 않고 건너뛸지 여부
    pub skip_unparseable: bool,
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
