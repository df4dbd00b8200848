//! 저장 장치 이벤트
//!
//! [`Event`]는 레코드 하나를 해석한 결과입니다. 필드는 비공개이며
//! 접근자로만 읽을 수 있습니다. 블록 장치는 레지스트리 핸들로만 들고 있으므로
//! 장치 정보는 [`BlockRegistry`]에서 조회합니다.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use blkwatch_core::error::BlkwatchError;
use blkwatch_core::types::Severity;

use crate::registry::{BlockId, BlockInfo, BlockRegistry};

/// 해석된 저장 장치 이벤트
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub(crate) hostname: String,
    pub(crate) severity: Severity,
    pub(crate) subsystem: String,
    /// 정규화된 UTC 타임스탬프 (`YYYY-MM-DDTHH:MM:SS.ffffffZ`)
    pub(crate) timestamp: String,
    pub(crate) event_id: String,
    pub(crate) event_type: String,
    #[serde(skip)]
    pub(crate) block: Option<BlockId>,
    pub(crate) message: String,
    pub(crate) raw_message: String,
    /// 인식되지 않은 토큰과 패턴 캡처
    #[serde(flatten)]
    pub(crate) extension: BTreeMap<String, String>,
}

impl Event {
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// 서브시스템 이름. 알 수 없는 명시적 값이면 빈 문자열.
    pub fn subsystem(&self) -> &str {
        &self.subsystem
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// 이벤트가 가리키는 블록 장치 핸들
    pub fn block(&self) -> Option<BlockId> {
        self.block
    }

    /// 인식된 토큰을 뺀 메시지
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 원래 레코드 텍스트
    pub fn raw_message(&self) -> &str {
        &self.raw_message
    }

    pub fn extension(&self) -> &BTreeMap<String, String> {
        &self.extension
    }

    /// 블록 장치 정보를 펼친 JSON 한 줄로 직렬화합니다.
    ///
    /// 출력은 JSON 레코드 문법을 따르므로 다시 로그 소스로 읽을 수 있습니다.
    ///
    /// # Errors
    /// 직렬화에 실패하면 `JSON_SERIALIZE_ERROR`.
    pub fn to_json_string(&self, registry: &BlockRegistry) -> Result<String, BlkwatchError> {
        let block = self
            .block
            .and_then(|id| registry.get(id))
            .map(|info| BlockRecord::new(info, registry));
        let record = EventRecord { event: self, block };
        serde_json::to_string(&record)
            .map_err(|e| BlkwatchError::JsonSerialize(format!("event serialization failed: {e}")))
    }

    /// [`Event::to_json_string`] 출력에서 이벤트를 복원합니다.
    ///
    /// 블록 장치는 레지스트리 밖이므로 핸들 없이 복원되고,
    /// `block` 객체는 무시됩니다.
    ///
    /// # Errors
    /// JSON이 잘못되었거나 필드가 빠지면 `JSON_DESERIALIZE_ERROR`.
    pub fn from_json_str(json: &str) -> Result<Self, BlkwatchError> {
        let record: OwnedEventRecord = serde_json::from_str(json).map_err(|e| {
            BlkwatchError::JsonDeserialize(format!("event deserialization failed: {e}"))
        })?;
        Ok(record.event)
    }
}

#[derive(Serialize)]
struct EventRecord<'a> {
    #[serde(flatten)]
    event: &'a Event,
    #[serde(skip_serializing_if = "Option::is_none")]
    block: Option<BlockRecord<'a>>,
}

#[derive(Deserialize)]
struct OwnedEventRecord {
    #[serde(default, rename = "block")]
    _block: Option<serde_json::Value>,
    #[serde(flatten)]
    event: Event,
}

/// 직렬화용 블록 장치 표현. 소유 장치는 WWID(없으면 경로)로 적습니다.
#[derive(Serialize)]
struct BlockRecord<'a> {
    wwid: &'a str,
    blk_type: &'static str,
    preferred_path: &'a str,
    path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    uuid: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mount_point: Option<&'a str>,
    transaction_id: &'a str,
    owners: Vec<&'a str>,
}

impl<'a> BlockRecord<'a> {
    fn new(info: &'a BlockInfo, registry: &'a BlockRegistry) -> Self {
        Self {
            wwid: info.wwid(),
            blk_type: info.blk_type().as_str(),
            preferred_path: info.preferred_path(),
            path: info.path(),
            uuid: info.uuid(),
            mount_point: info.mount_point(),
            transaction_id: info.transaction_id(),
            owners: registry
                .owners(info.id())
                .into_iter()
                .map(BlockInfo::display_key)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::BlockHint;
    use blkwatch_core::ErrorCode;

    fn sample() -> Event {
        Event {
            hostname: "storage01".to_owned(),
            severity: Severity::Error,
            subsystem: "scsi".to_owned(),
            timestamp: "2024-01-01T10:00:00.000000Z".to_owned(),
            event_id: "SCSI_REJECTING_IO_OFFLINE_DEVICE".to_owned(),
            event_type: "path-down".to_owned(),
            block: None,
            message: "sd 2:0:0:1: [sdb] rejecting I/O to offline device".to_owned(),
            raw_message: "<11>raw".to_owned(),
            extension: BTreeMap::from([("scsi_id".to_owned(), "2:0:0:1".to_owned())]),
        }
    }

    #[test]
    fn json_includes_resolved_block_and_owner_keys() {
        let mut reg = BlockRegistry::new();
        let disk = reg
            .resolve_or_create(&BlockHint {
                wwid: Some("W1".to_owned()),
                path: Some("/dev/sdb".to_owned()),
                ..BlockHint::default()
            })
            .unwrap();
        let mpath = reg.resolve_or_create(&BlockHint::with_wwid("MPATH1")).unwrap();
        reg.link(disk, mpath).unwrap();

        let mut event = sample();
        event.block = Some(disk);
        let json = event.to_json_string(&reg).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["severity"], "ERROR");
        assert_eq!(value["scsi_id"], "2:0:0:1");
        assert_eq!(value["block"]["wwid"], "W1");
        assert_eq!(value["block"]["blk_type"], "Unknown");
        assert_eq!(value["block"]["owners"][0], "MPATH1");
        assert!(value["block"].get("uuid").is_none());
    }

    #[test]
    fn json_without_block_omits_key() {
        let json = sample().to_json_string(&BlockRegistry::new()).unwrap();
        assert!(!json.contains("\"block\""));
    }

    #[test]
    fn from_json_ignores_block_object() {
        let mut reg = BlockRegistry::new();
        let id = reg.resolve_or_create(&BlockHint::with_wwid("W1")).unwrap();
        let mut event = sample();
        event.block = Some(id);

        let restored = Event::from_json_str(&event.to_json_string(&reg).unwrap()).unwrap();
        assert_eq!(restored.block(), None);
        assert_eq!(restored.event_id(), event.event_id());
        assert_eq!(restored.extension(), event.extension());
    }

    #[test]
    fn from_json_rejects_garbage() {
        let err = Event::from_json_str("{\"hostname\":1}").unwrap_err();
        assert_eq!(err.code(), ErrorCode::JsonDeserializeError);
    }
}
