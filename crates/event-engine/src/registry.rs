//! 블록 장치 레지스트리
//!
//! 블록 장치([`BlockInfo`])를 arena에 저장하고 [`BlockId`] 핸들로 참조합니다.
//! 장치 사이의 소유 관계(`owners`)는 핸들 목록으로 저장되며 항상 DAG를 유지합니다.
//!
//! # 식별 규칙
//! - WWID가 있으면 WWID로, 없으면 장치 경로로 찾습니다.
//! - 경로로만 알려진 장치에 WWID가 생기면 같은 노드에 WWID 키를 추가합니다.
//! - 같은 장치로 밝혀진 두 노드는 병합합니다. 흡수된 노드의 핸들은
//!   살아남은 노드로 전달되므로 이벤트가 들고 있던 핸들도 계속 유효합니다.
//! - 사이클을 만드는 소유 관계나 병합은 `INTERNAL_BUG`로 거부하며
//!   그래프는 바뀌지 않습니다.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use blkwatch_core::error::BlkwatchError;
use blkwatch_core::types::BlkType;

/// 레지스트리 안의 블록 장치 핸들
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(u32);

impl BlockId {
    /// arena 인덱스
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blk#{}", self.0)
    }
}

/// 블록 장치 하나의 식별 정보와 소유 관계
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockInfo {
    id: BlockId,
    wwid: String,
    blk_type: BlkType,
    preferred_path: String,
    path: String,
    uuid: Option<String>,
    mount_point: Option<String>,
    transaction_id: String,
    owners: Vec<BlockId>,
}

impl BlockInfo {
    fn new(id: BlockId) -> Self {
        Self {
            id,
            wwid: String::new(),
            blk_type: BlkType::Unknown,
            preferred_path: String::new(),
            path: String::new(),
            uuid: None,
            mount_point: None,
            transaction_id: String::new(),
            owners: Vec::new(),
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    /// WWID (알 수 없으면 빈 문자열)
    pub fn wwid(&self) -> &str {
        &self.wwid
    }

    pub fn blk_type(&self) -> BlkType {
        self.blk_type
    }

    /// 영속적인 경로 (예: `/dev/mapper/mpatha`)
    pub fn preferred_path(&self) -> &str {
        &self.preferred_path
    }

    /// 커널 장치 경로 (예: `/dev/sdb`)
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    pub fn mount_point(&self) -> Option<&str> {
        self.mount_point.as_deref()
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    /// 이 장치 바로 위에 있는 장치들의 핸들
    pub fn owners(&self) -> &[BlockId] {
        &self.owners
    }

    /// 사람이 읽을 식별자: WWID, 선호 경로, 경로 순
    pub fn display_key(&self) -> &str {
        [&self.wwid, &self.preferred_path, &self.path]
            .into_iter()
            .find(|s| !s.is_empty())
            .map_or("", String::as_str)
    }
}

/// 레코드에서 얻은 장치 식별 힌트
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockHint {
    pub wwid: Option<String>,
    pub path: Option<String>,
    pub preferred_path: Option<String>,
    pub blk_type: BlkType,
    pub uuid: Option<String>,
    pub mount_point: Option<String>,
    pub transaction_id: Option<String>,
}

impl BlockHint {
    /// WWID만 가진 힌트
    pub fn with_wwid(wwid: impl Into<String>) -> Self {
        Self {
            wwid: Some(wwid.into()),
            ..Self::default()
        }
    }

    /// 경로만 가진 힌트
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// 장치를 식별할 수 있는 값이 하나라도 있는지
    pub fn has_identity(&self) -> bool {
        self.wwid().is_some() || self.path_keys().next().is_some()
    }

    fn wwid(&self) -> Option<&str> {
        self.wwid.as_deref().filter(|s| !s.is_empty())
    }

    fn path_keys(&self) -> impl Iterator<Item = &str> {
        [self.path.as_deref(), self.preferred_path.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Live(BlockInfo),
    /// 병합되어 다른 노드로 전달됨
    Merged(BlockId),
}

/// 블록 장치 arena
///
/// 반복자 하나가 소유하며 그 반복자의 pull 루프만 변경하므로 잠금이 없습니다.
#[derive(Debug, Clone, Default)]
pub struct BlockRegistry {
    slots: Vec<Slot>,
    by_wwid: HashMap<String, BlockId>,
    by_path: HashMap<String, BlockId>,
    live: usize,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 살아 있는 장치 수
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// 병합 전달을 따라간 최종 핸들. 알 수 없는 핸들이면 `None`.
    pub fn canonical(&self, id: BlockId) -> Option<BlockId> {
        let mut current = id;
        // 전달 사슬은 병합 횟수보다 길 수 없다
        for _ in 0..=self.slots.len() {
            match self.slots.get(current.index())? {
                Slot::Live(_) => return Some(current),
                Slot::Merged(next) => current = *next,
            }
        }
        None
    }

    /// 핸들로 장치를 조회합니다. 병합된 핸들은 살아남은 노드로 해석됩니다.
    pub fn get(&self, id: BlockId) -> Option<&BlockInfo> {
        let id = self.canonical(id)?;
        match self.slots.get(id.index()) {
            Some(Slot::Live(info)) => Some(info),
            _ => None,
        }
    }

    /// WWID 또는 경로로 장치를 조회합니다.
    ///
    /// # Errors
    /// 알려지지 않은 장치면 `BLOCK_NO_EXISTS`.
    pub fn lookup(&self, wwid_or_path: &str) -> Result<&BlockInfo, BlkwatchError> {
        self.by_wwid
            .get(wwid_or_path)
            .or_else(|| self.by_path.get(wwid_or_path))
            .and_then(|id| self.get(*id))
            .ok_or_else(|| BlkwatchError::BlockNoExists(wwid_or_path.to_owned()))
    }

    /// 살아 있는 모든 장치 (생성 순서)
    pub fn blocks(&self) -> impl Iterator<Item = &BlockInfo> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Live(info) => Some(info),
            Slot::Merged(_) => None,
        })
    }

    /// 바로 위 소유 장치들
    pub fn owners(&self, id: BlockId) -> Vec<&BlockInfo> {
        self.get(id)
            .map(|info| info.owners.iter().filter_map(|o| self.get(*o)).collect())
            .unwrap_or_default()
    }

    /// 전이적으로 위에 있는 모든 장치 (중복 없음, 너비 우선)
    pub fn all_owners(&self, id: BlockId) -> Vec<&BlockInfo> {
        let Some(start) = self.get(id) else {
            return Vec::new();
        };
        let mut seen: HashSet<BlockId> = HashSet::from([start.id]);
        let mut queue: Vec<BlockId> = start.owners.clone();
        let mut result = Vec::new();
        let mut cursor = 0;
        while cursor < queue.len() {
            let next = queue[cursor];
            cursor += 1;
            let Some(info) = self.get(next) else {
                continue;
            };
            if !seen.insert(info.id) {
                continue;
            }
            queue.extend(info.owners.iter().copied());
            result.push(info);
        }
        result
    }

    /// 장치 자신 또는 전이적 소유 장치 중 WWID가 일치하는 것이 있는지
    pub fn wwid_matches(&self, id: BlockId, wwid: &str) -> bool {
        match self.get(id) {
            Some(info) if info.wwid == wwid => true,
            Some(_) => self.all_owners(id).iter().any(|o| o.wwid == wwid),
            None => false,
        }
    }

    /// 힌트에 해당하는 장치를 찾거나 새로 만듭니다.
    ///
    /// # Errors
    /// - 힌트에 WWID도 경로도 없으면 `INVALID_ARGUMENT`
    /// - 필요한 병합이 사이클을 만들면 `INTERNAL_BUG`
    pub fn resolve_or_create(&mut self, hint: &BlockHint) -> Result<BlockId, BlkwatchError> {
        if !hint.has_identity() {
            return Err(BlkwatchError::InvalidArgument(
                "block hint carries neither wwid nor path".to_owned(),
            ));
        }
        let wwid = hint.wwid();

        let by_wwid = wwid
            .and_then(|w| self.by_wwid.get(w).copied())
            .and_then(|id| self.canonical(id));
        let path_hits: Vec<BlockId> = hint
            .path_keys()
            .filter_map(|key| self.canonical(*self.by_path.get(key)?))
            .collect();

        let existing = by_wwid.or_else(|| {
            path_hits
                .iter()
                .copied()
                .find(|id| wwid.is_none() || self.wwid_of(*id).is_empty())
        });

        // 병합 가능 여부를 먼저 모두 확인해서 부분 변경을 막는다.
        // 병합된 노드들은 하나가 되므로 서로 도달할 수 있으면 사이클이 생긴다.
        let mut to_merge: Vec<BlockId> = Vec::new();
        for id in path_hits {
            if Some(id) == existing || to_merge.contains(&id) {
                continue;
            }
            let mergeable = self.wwid_of(id).is_empty()
                || (wwid.is_none() && existing.is_some_and(|p| self.wwid_of(p).is_empty()));
            if !mergeable {
                continue;
            }
            let closes_cycle = existing
                .into_iter()
                .chain(to_merge.iter().copied())
                .any(|member| self.reaches(member, id) || self.reaches(id, member));
            if closes_cycle {
                warn!(block = %id, "rejected merge that would close an ownership cycle");
                return Err(BlkwatchError::InternalBug(format!(
                    "merging {id} would create an ownership cycle"
                )));
            }
            to_merge.push(id);
        }

        let primary = match existing {
            Some(id) => id,
            None => self.create()?,
        };
        for id in to_merge {
            self.merge(primary, id);
        }

        self.apply_hint(primary, hint);
        Ok(primary)
    }

    /// `owner`를 `owned`의 소유 장치로 추가합니다. 이미 있으면 아무 일도 하지 않습니다.
    ///
    /// # Errors
    /// - 알 수 없는 핸들이면 `INVALID_ARGUMENT`
    /// - 자기 자신이나 사이클을 만드는 관계면 `INTERNAL_BUG` (그래프 변경 없음)
    pub fn link(&mut self, owned: BlockId, owner: BlockId) -> Result<(), BlkwatchError> {
        let owned = self.canonical(owned).ok_or_else(|| unknown_handle(owned))?;
        let owner = self.canonical(owner).ok_or_else(|| unknown_handle(owner))?;

        if owned == owner {
            return Err(BlkwatchError::InternalBug(format!(
                "block {owned} cannot own itself"
            )));
        }
        if self.get(owned).is_some_and(|info| info.owners.contains(&owner)) {
            return Ok(());
        }
        if self.reaches(owner, owned) {
            warn!(owned = %owned, owner = %owner, "rejected ownership edge that would close a cycle");
            metrics::counter!(blkwatch_core::metrics::LINKS_REJECTED_TOTAL).increment(1);
            return Err(BlkwatchError::InternalBug(format!(
                "linking {owner} as owner of {owned} would create an ownership cycle"
            )));
        }

        if let Some(info) = self.live_mut(owned) {
            info.owners.push(owner);
        }
        Ok(())
    }

    // --- 내부 헬퍼 ---

    fn wwid_of(&self, id: BlockId) -> &str {
        self.get(id).map_or("", |info| info.wwid.as_str())
    }

    fn live_mut(&mut self, id: BlockId) -> Option<&mut BlockInfo> {
        match self.slots.get_mut(id.index()) {
            Some(Slot::Live(info)) => Some(info),
            _ => None,
        }
    }

    fn create(&mut self) -> Result<BlockId, BlkwatchError> {
        let index = u32::try_from(self.slots.len()).map_err(|_| {
            BlkwatchError::InternalBug("block registry exhausted its handle space".to_owned())
        })?;
        let id = BlockId(index);
        self.slots.push(Slot::Live(BlockInfo::new(id)));
        self.live += 1;
        metrics::gauge!(blkwatch_core::metrics::REGISTRY_BLOCKS).set(self.live as f64);
        Ok(id)
    }

    /// `from`에서 소유 관계를 따라 `to`에 도달할 수 있는지
    fn reaches(&self, from: BlockId, to: BlockId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(info) = self.get(current) {
                stack.extend(info.owners.iter().copied());
            }
        }
        false
    }

    /// `absorb`를 `keep`에 병합합니다. 호출 전에 사이클 검사를 마쳐야 합니다.
    fn merge(&mut self, keep: BlockId, absorb: BlockId) {
        let Some(Slot::Live(absorbed)) = self
            .slots
            .get_mut(absorb.index())
            .map(|slot| std::mem::replace(slot, Slot::Merged(keep)))
        else {
            return;
        };
        self.live -= 1;
        debug!(keep = %keep, absorb = %absorb, "merging duplicate block records");

        if let Some(info) = self.live_mut(keep) {
            fill_empty(&mut info.wwid, &absorbed.wwid);
            fill_empty(&mut info.path, &absorbed.path);
            fill_empty(&mut info.preferred_path, &absorbed.preferred_path);
            fill_empty(&mut info.transaction_id, &absorbed.transaction_id);
            if info.uuid.is_none() {
                info.uuid = absorbed.uuid.clone();
            }
            if info.mount_point.is_none() {
                info.mount_point = absorbed.mount_point.clone();
            }
            if absorbed.blk_type.specificity() > info.blk_type.specificity() {
                info.blk_type = absorbed.blk_type;
            }
            for owner in &absorbed.owners {
                if *owner != keep && !info.owners.contains(owner) {
                    info.owners.push(*owner);
                }
            }
        }

        // 흡수된 노드를 가리키던 모든 소유 관계와 키를 다시 연결한다
        for slot in &mut self.slots {
            if let Slot::Live(info) = slot {
                for owner in &mut info.owners {
                    if *owner == absorb {
                        *owner = keep;
                    }
                }
                let own_id = info.id;
                let mut seen = HashSet::new();
                info.owners.retain(|o| *o != own_id && seen.insert(*o));
            }
        }
        for id in self.by_wwid.values_mut().chain(self.by_path.values_mut()) {
            if *id == absorb {
                *id = keep;
            }
        }
        if !absorbed.wwid.is_empty() {
            self.by_wwid.insert(absorbed.wwid, keep);
        }
        metrics::gauge!(blkwatch_core::metrics::REGISTRY_BLOCKS).set(self.live as f64);
    }

    fn apply_hint(&mut self, id: BlockId, hint: &BlockHint) {
        let mut new_wwid = None;
        let mut written_paths: Vec<(String, String)> = Vec::new();
        let mut current_paths = Vec::new();

        if let Some(info) = self.live_mut(id) {
            let stale = is_stale(&info.transaction_id, hint.transaction_id.as_deref());

            if let Some(wwid) = hint.wwid() {
                if info.wwid.is_empty() {
                    info.wwid = wwid.to_owned();
                    new_wwid = Some(wwid.to_owned());
                }
            }
            for (field, value) in [
                (&mut info.path, hint.path.as_deref()),
                (&mut info.preferred_path, hint.preferred_path.as_deref()),
            ] {
                let previous = field.clone();
                if update_field(field, value, stale) {
                    written_paths.push((previous, field.clone()));
                }
            }
            update_optional(&mut info.uuid, hint.uuid.as_deref(), stale);
            update_optional(&mut info.mount_point, hint.mount_point.as_deref(), stale);

            let (incoming, current) = (hint.blk_type.specificity(), info.blk_type.specificity());
            let upgrade = incoming > current
                || (!stale && incoming == current && hint.blk_type != BlkType::Unknown);
            if upgrade {
                info.blk_type = hint.blk_type;
            }

            if let Some(txn) = hint.transaction_id.as_deref().filter(|t| !t.is_empty()) {
                if !stale {
                    info.transaction_id = txn.to_owned();
                }
            }

            current_paths = vec![info.path.clone(), info.preferred_path.clone()];
        }

        if let Some(wwid) = new_wwid {
            self.by_wwid.insert(wwid, id);
        }
        // 경로 키는 실제로 기록된 경로만 가리킨다
        for (previous, written) in written_paths {
            let replaced = !previous.is_empty()
                && !current_paths.contains(&previous)
                && self.path_owner(&previous) == Some(id);
            if replaced {
                self.by_path.remove(&previous);
            }
            if let Some(old) = self.by_path.insert(written.clone(), id) {
                if self.canonical(old) != Some(id) {
                    debug!(path = written.as_str(), block = %id, "device path rebound to another block");
                }
            }
        }
    }

    fn path_owner(&self, path: &str) -> Option<BlockId> {
        self.canonical(*self.by_path.get(path)?)
    }
}

fn unknown_handle(id: BlockId) -> BlkwatchError {
    BlkwatchError::InvalidArgument(format!("unknown block handle {id}"))
}

/// 들어온 트랜잭션 ID가 현재 값보다 오래됐는지
///
/// 둘 다 숫자면 숫자로, 아니면 문자열로 비교합니다. 어느 한쪽이 없으면 오래되지 않은 것으로 봅니다.
fn is_stale(current: &str, incoming: Option<&str>) -> bool {
    let Some(incoming) = incoming.filter(|s| !s.is_empty()) else {
        return false;
    };
    if current.is_empty() {
        return false;
    }
    match (current.parse::<u64>(), incoming.parse::<u64>()) {
        (Ok(cur), Ok(inc)) => inc < cur,
        _ => incoming < current,
    }
}

fn fill_empty(target: &mut String, source: &str) {
    if target.is_empty() && !source.is_empty() {
        *target = source.to_owned();
    }
}

/// 값을 기록했으면 `true`
fn update_field(target: &mut String, value: Option<&str>, stale: bool) -> bool {
    match value.filter(|v| !v.is_empty()) {
        Some(v) if !stale || target.is_empty() => {
            *target = v.to_owned();
            true
        }
        _ => false,
    }
}

fn update_optional(target: &mut Option<String>, value: Option<&str>, stale: bool) {
    if let Some(v) = value.filter(|v| !v.is_empty()) {
        if !stale || target.is_none() {
            *target = Some(v.to_owned());
        }
    }
}
