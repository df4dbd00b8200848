//! 에러 타입: 고정 에러 코드 체계
//!
//! 모든 경계 연산은 성공 값 또는 [`BlkwatchError`] 중 하나만 반환합니다.
//! 각 변형은 안정적인 숫자 코드([`ErrorCode`])와 메시지를 가집니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 안정적인 숫자 에러 코드
///
/// 값은 C ABI와 공유되므로 절대 바꾸지 않습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ErrorCode {
    Ok = 0,
    LogSeverityParseError = 1,
    ConfError = 2,
    JsonSerializeError = 3,
    JsonDeserializeError = 4,
    NoSupport = 5,
    InternalBug = 6,
    BlockNoExists = 7,
    StorageSubsystemParseError = 8,
    InvalidArgument = 9,
    LogAccessError = 10,
}

impl ErrorCode {
    /// 숫자 코드를 반환합니다.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// 숫자 코드에서 변환합니다. 알 수 없는 값이면 `None`.
    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::LogSeverityParseError),
            2 => Some(Self::ConfError),
            3 => Some(Self::JsonSerializeError),
            4 => Some(Self::JsonDeserializeError),
            5 => Some(Self::NoSupport),
            6 => Some(Self::InternalBug),
            7 => Some(Self::BlockNoExists),
            8 => Some(Self::StorageSubsystemParseError),
            9 => Some(Self::InvalidArgument),
            10 => Some(Self::LogAccessError),
            _ => None,
        }
    }

    /// 상수 이름 형태의 문자열 (`LOG_ACCESS_ERROR` 등)
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::LogSeverityParseError => "LOG_SEVERITY_PARSE_ERROR",
            Self::ConfError => "CONF_ERROR",
            Self::JsonSerializeError => "JSON_SERIALIZE_ERROR",
            Self::JsonDeserializeError => "JSON_DESERIALIZE_ERROR",
            Self::NoSupport => "NO_SUPPORT",
            Self::InternalBug => "INTERNAL_BUG",
            Self::BlockNoExists => "BLOCK_NO_EXISTS",
            Self::StorageSubsystemParseError => "STORAGE_SUBSYSTEM_PARSE_ERROR",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::LogAccessError => "LOG_ACCESS_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// blkwatch 최상위 에러 타입
///
/// `Clone`을 구현하므로 sticky 에러 상태에서 같은 에러를 반복해서 돌려줄 수 있습니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlkwatchError {
    /// 레코드에서 이벤트를 식별할 수 없음 (빈 입력, 의미 없는 바이트열)
    #[error("log severity parse error: {0}")]
    LogSeverityParse(String),

    /// 설정 로드/검증 실패
    #[error("config error: {0}")]
    Conf(String),

    /// JSON 직렬화 실패
    #[error("json serialize error: {0}")]
    JsonSerialize(String),

    /// JSON 역직렬화 실패
    #[error("json deserialize error: {0}")]
    JsonDeserialize(String),

    /// 지원하지 않는 연산
    #[error("not supported: {0}")]
    NoSupport(String),

    /// 내부 불변식 위반 (예: 장치 그래프 사이클)
    #[error("internal bug: {0}")]
    InternalBug(String),

    /// 알 수 없는 블록 장치
    #[error("block does not exist: {0}")]
    BlockNoExists(String),

    /// 헤더는 해석했지만 귀속시킬 본문이 없음
    #[error("storage subsystem parse error: {0}")]
    StorageSubsystemParse(String),

    /// 잘못된 인자 (필터 피연산자 등)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// 로그 소스 접근 실패
    #[error("log access error: {0}")]
    LogAccess(String),
}

impl BlkwatchError {
    /// 이 에러의 고정 코드
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::LogSeverityParse(_) => ErrorCode::LogSeverityParseError,
            Self::Conf(_) => ErrorCode::ConfError,
            Self::JsonSerialize(_) => ErrorCode::JsonSerializeError,
            Self::JsonDeserialize(_) => ErrorCode::JsonDeserializeError,
            Self::NoSupport(_) => ErrorCode::NoSupport,
            Self::InternalBug(_) => ErrorCode::InternalBug,
            Self::BlockNoExists(_) => ErrorCode::BlockNoExists,
            Self::StorageSubsystemParse(_) => ErrorCode::StorageSubsystemParseError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::LogAccess(_) => ErrorCode::LogAccessError,
        }
    }

    /// 에러 메시지 (코드 접두어 없이)
    pub fn message(&self) -> &str {
        match self {
            Self::LogSeverityParse(m)
            | Self::Conf(m)
            | Self::JsonSerialize(m)
            | Self::JsonDeserialize(m)
            | Self::NoSupport(m)
            | Self::InternalBug(m)
            | Self::BlockNoExists(m)
            | Self::StorageSubsystemParse(m)
            | Self::InvalidArgument(m)
            | Self::LogAccess(m) => m,
        }
    }

    /// I/O 에러를 로그 접근 에러로 변환합니다.
    pub fn log_access(context: impl fmt::Display, err: std::io::Error) -> Self {
        Self::LogAccess(format!("{context}: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorCode::Ok.as_i32(), 0);
        assert_eq!(ErrorCode::LogSeverityParseError.as_i32(), 1);
        assert_eq!(ErrorCode::ConfError.as_i32(), 2);
        assert_eq!(ErrorCode::JsonSerializeError.as_i32(), 3);
        assert_eq!(ErrorCode::JsonDeserializeError.as_i32(), 4);
        assert_eq!(ErrorCode::NoSupport.as_i32(), 5);
        assert_eq!(ErrorCode::InternalBug.as_i32(), 6);
        assert_eq!(ErrorCode::BlockNoExists.as_i32(), 7);
        assert_eq!(ErrorCode::StorageSubsystemParseError.as_i32(), 8);
        assert_eq!(ErrorCode::InvalidArgument.as_i32(), 9);
        assert_eq!(ErrorCode::LogAccessError.as_i32(), 10);
    }

    #[test]
    fn from_i32_roundtrips_every_code() {
        for code in 0..=10 {
            let parsed = ErrorCode::from_i32(code).unwrap();
            assert_eq!(parsed.as_i32(), code);
        }
        assert!(ErrorCode::from_i32(11).is_none());
        assert!(ErrorCode::from_i32(-1).is_none());
    }

    #[test]
    fn variant_maps_to_code() {
        let err = BlkwatchError::BlockNoExists("W1".to_owned());
        assert_eq!(err.code(), ErrorCode::BlockNoExists);
        assert_eq!(err.message(), "W1");

        let err = BlkwatchError::LogAccess("closed".to_owned());
        assert_eq!(err.code().as_i32(), 10);
    }

    #[test]
    fn display_includes_message() {
        let err = BlkwatchError::InvalidArgument("bad severity 'loud'".to_owned());
        assert_eq!(err.to_string(), "invalid argument: bad severity 'loud'");
    }

    #[test]
    fn code_display_uses_constant_name() {
        assert_eq!(
            ErrorCode::StorageSubsystemParseError.to_string(),
            "STORAGE_SUBSYSTEM_PARSE_ERROR"
        );
    }

    #[test]
    fn log_access_helper_formats_context() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = BlkwatchError::log_access("/var/log/messages", io);
        assert_eq!(err.code(), ErrorCode::LogAccessError);
        assert!(err.message().contains("/var/log/messages"));
    }
}
