#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`source`]: 로그 소스 경계와 파일/메모리 구현
//! - [`parser`]: 레코드 문법 (JSON, RFC 5424/3164, kmsg), 토큰 추출, 패턴 분류
//! - [`registry`]: 블록 장치 DAG
//! - [`filter`]: 필터 체인
//! - [`event`]: 이벤트 타입과 JSON 직렬화
//! - [`iter`]: pull 방식 이벤트 반복자

pub mod event;
pub mod filter;
pub mod iter;
pub mod parser;
pub mod registry;
pub mod source;

// --- 주요 타입 re-export ---

pub use event::Event;
pub use filter::{Filter, FilterChain, FilterKind};
pub use iter::{EventIter, IterState, ParseErrorPolicy};
pub use parser::{DeviceSighting, ParsedRecord, RecordParser};
pub use registry::{BlockHint, BlockId, BlockInfo, BlockRegistry};
pub use source::{FileLogSource, LogSource, MemoryLogSource, SourceRead, SourceRecord};
