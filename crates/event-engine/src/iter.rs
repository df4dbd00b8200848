//! 이벤트 반복자
//!
//! 로그 소스에서 레코드를 당겨와 해석하고, 레지스트리에 장치를 등록/연결한 뒤
//! 필터 체인을 통과한 이벤트만 돌려줍니다. 미리 읽지 않으며, 모든 작업은
//! [`EventIter::next_event`] 호출 안에서 일어납니다.
//!
//! # 상태 전이
//! ```text
//! Created --next_event--> Active --소스 끝--> Exhausted
//!    ^                      |                    |
//!    +------add_filter------+--------------------+
//!
//! 소스 읽기 실패 --> Errored (이후 모든 호출이 같은 에러를 돌려줌)
//! ```

use metrics::counter;
use tracing::{debug, error, info, warn};

use blkwatch_core::config::BlkwatchConfig;
use blkwatch_core::error::BlkwatchError;
use blkwatch_core::metrics as m;

use crate::event::Event;
use crate::filter::{Filter, FilterChain, FilterKind};
use crate::parser::{DeviceSighting, RecordParser};
use crate::registry::{BlockId, BlockInfo, BlockRegistry};
use crate::source::{FileLogSource, LogSource, SourceRead};

/// 반복자 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterState {
    /// 아직 읽지 않음 (또는 필터 추가로 되돌려짐)
    Created,
    /// 읽는 중
    Active,
    /// 소스 끝에 도달
    Exhausted,
    /// 소스 읽기 실패 (되돌릴 수 없음)
    Errored,
}

/// 해석할 수 없는 레코드 처리 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseErrorPolicy {
    /// 호출자에게 에러로 한 번 돌려줌
    #[default]
    Report,
    /// 경고 로그만 남기고 건너뜀
    Skip,
}

/// 저장 장치 이벤트 반복자
#[derive(Debug)]
pub struct EventIter<S: LogSource> {
    source: S,
    parser: RecordParser,
    registry: BlockRegistry,
    filters: FilterChain,
    state: IterState,
    cursor: u64,
    last_error: Option<BlkwatchError>,
    policy: ParseErrorPolicy,
}

impl EventIter<FileLogSource> {
    /// 설정의 `[source]` 로그 파일을 열어 반복자를 만듭니다.
    ///
    /// # Errors
    /// - 파일을 열 수 없으면 `LOG_ACCESS_ERROR`
    /// - 사용자 정의 패턴이 잘못되면 `CONF_ERROR`
    pub fn open(config: &BlkwatchConfig) -> Result<Self, BlkwatchError> {
        let parser = RecordParser::from_config(config)?;
        let source = FileLogSource::from_config(&config.source)?;
        let policy = if config.engine.skip_unparseable {
            ParseErrorPolicy::Skip
        } else {
            ParseErrorPolicy::Report
        };
        Ok(Self::new(source, parser).with_policy(policy))
    }
}

impl<S: LogSource> EventIter<S> {
    /// 열린 소스로 반복자를 만듭니다.
    pub fn new(source: S, parser: RecordParser) -> Self {
        Self {
            source,
            parser,
            registry: BlockRegistry::new(),
            filters: FilterChain::new(),
            state: IterState::Created,
            cursor: 0,
            last_error: None,
            policy: ParseErrorPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ParseErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 필터를 검증해서 추가하고 처음으로 되돌립니다.
    ///
    /// # Errors
    /// - 피연산자가 잘못되면 `INVALID_ARGUMENT` (체인과 위치는 그대로)
    /// - 이미 `Errored` 상태면 저장된 에러
    /// - 소스를 되돌릴 수 없으면 `LOG_ACCESS_ERROR` (이후 `Errored`)
    pub fn add_filter(&mut self, kind: FilterKind, operand: &str) -> Result<(), BlkwatchError> {
        let filter = Filter::parse(kind, operand)?;
        self.add(filter)
    }

    /// 이미 검증된 필터를 추가하고 처음으로 되돌립니다.
    ///
    /// # Errors
    /// [`EventIter::add_filter`] 참고.
    pub fn add(&mut self, filter: Filter) -> Result<(), BlkwatchError> {
        if let Some(err) = self.sticky_error() {
            return Err(err);
        }
        if let Err(err) = self.source.rewind() {
            return Err(self.fail(err));
        }

        info!(filter = %filter, source = self.source.name(), "filter added, iterator rewound");
        self.filters.add(filter);
        self.cursor = 0;
        self.state = IterState::Created;
        Ok(())
    }

    /// 필터를 통과한 다음 이벤트를 돌려줍니다.
    ///
    /// - `Ok(Some(event))`: 이벤트 하나
    /// - `Ok(None)`: 추적 중인 소스에 새 데이터가 없거나 (`Active`), 소스 끝 (`Exhausted`)
    /// - `Err(_)`: 레코드 하나의 실패 (한 번만 돌려주고 다음 레코드로 진행)
    ///   또는 소스 실패 (`Errored`, 이후 계속 같은 에러)
    ///
    /// # Errors
    /// 위 설명 참고.
    pub fn next_event(&mut self) -> Result<Option<Event>, BlkwatchError> {
        match self.state {
            IterState::Errored => {
                return Err(self
                    .sticky_error()
                    .unwrap_or_else(|| BlkwatchError::InternalBug("errored without error".to_owned())));
            }
            IterState::Exhausted => return Ok(None),
            IterState::Created | IterState::Active => self.state = IterState::Active,
        }

        loop {
            let record = match self.source.read_record() {
                Ok(SourceRead::Record(record)) => record,
                Ok(SourceRead::Pending) => return Ok(None),
                Ok(SourceRead::End) => {
                    debug!(source = self.source.name(), cursor = self.cursor, "log source exhausted");
                    self.state = IterState::Exhausted;
                    return Ok(None);
                }
                Err(err) => {
                    counter!(m::SOURCE_ERRORS_TOTAL).increment(1);
                    return Err(self.fail(err));
                }
            };
            self.cursor += 1;

            let parsed = match self.parser.parse(&record) {
                Ok(parsed) => parsed,
                Err(err) => {
                    counter!(m::PARSE_ERRORS_TOTAL, m::LABEL_ERROR_CODE => err.code().as_str())
                        .increment(1);
                    match self.policy {
                        ParseErrorPolicy::Skip => {
                            warn!(
                                source = record.source.as_str(),
                                offset = record.offset,
                                error = %err,
                                "skipping unparseable record"
                            );
                            continue;
                        }
                        ParseErrorPolicy::Report => {
                            warn!(
                                source = record.source.as_str(),
                                offset = record.offset,
                                error = %err,
                                "unparseable record"
                            );
                            self.last_error = Some(err.clone());
                            return Err(err);
                        }
                    }
                }
            };
            counter!(m::RECORDS_READ_TOTAL, m::LABEL_FORMAT => parsed.format).increment(1);

            let mut event = parsed.event;
            if let Some(sighting) = &parsed.device {
                match self.enrich(sighting) {
                    Ok(id) => event.block = Some(id),
                    Err(err) => {
                        warn!(offset = record.offset, error = %err, "device enrichment failed");
                        self.last_error = Some(err.clone());
                        return Err(err);
                    }
                }
            }

            if !self.filters.matches(&event, &self.registry) {
                counter!(m::EVENTS_FILTERED_TOTAL).increment(1);
                debug!(event_id = event.event_id(), offset = record.offset, "event filtered out");
                continue;
            }

            counter!(m::EVENTS_YIELDED_TOTAL, m::LABEL_SUBSYSTEM => event.subsystem().to_owned())
                .increment(1);
            return Ok(Some(event));
        }
    }

    /// 반복자와 소스를 닫습니다. 어떤 상태에서도 안전합니다.
    pub fn close(mut self) {
        self.source.close();
        debug!(source = self.source.name(), cursor = self.cursor, "event iterator closed");
    }

    pub fn state(&self) -> IterState {
        self.state
    }

    /// 처음(또는 마지막 필터 추가) 이후 읽은 레코드 수
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    /// 이벤트가 가리키는 블록 장치
    pub fn block_info(&self, event: &Event) -> Option<&BlockInfo> {
        event.block().and_then(|id| self.registry.get(id))
    }

    /// 마지막으로 돌려준 에러
    pub fn last_error(&self) -> Option<&BlkwatchError> {
        self.last_error.as_ref()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    fn sticky_error(&self) -> Option<BlkwatchError> {
        if self.state == IterState::Errored {
            self.last_error.clone()
        } else {
            None
        }
    }

    /// 소스 실패를 기록하고 `Errored`로 전환합니다.
    fn fail(&mut self, err: BlkwatchError) -> BlkwatchError {
        error!(source = self.source.name(), error = %err, "log source failed, iterator is now errored");
        self.state = IterState::Errored;
        self.last_error = Some(err.clone());
        err
    }

    /// 목격한 장치를 레지스트리에 등록하고 소유 관계를 연결합니다.
    ///
    /// 중간에 실패하면 그 전에 등록된 장치와 관계는 남습니다.
    fn enrich(&mut self, sighting: &DeviceSighting) -> Result<BlockId, BlkwatchError> {
        let id = self.registry.resolve_or_create(&sighting.device)?;
        for owner in sighting.owners.iter().filter(|h| h.has_identity()) {
            let owner_id = self.registry.resolve_or_create(owner)?;
            self.registry.link(id, owner_id)?;
        }
        for member in sighting.members.iter().filter(|h| h.has_identity()) {
            let member_id = self.registry.resolve_or_create(member)?;
            self.registry.link(member_id, id)?;
        }
        Ok(self.registry.canonical(id).unwrap_or(id))
    }
}
