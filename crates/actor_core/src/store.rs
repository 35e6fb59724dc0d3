//! Hash-keyed flag collections with change tracking.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::byml::Byml;
use crate::error::{Result, SyncError};
use crate::flag::{Flag, FlagKind};

/// Names that exist as flags but never go into the save format.
pub const IGNORED_SAVE_FLAGS: [&str; 54] = [
    "AlbumPictureIndex",
    "IsGet_Obj_AmiiboItem",
    "CaptionPictSize",
    "SeakSensorPictureIndex",
    "AoC_HardMode_Enabled",
    "FamouseValue",
    "SaveDistrictName",
    "LastSaveTime_Lower",
    "GameClear",
    "IsChangedByDebug",
    "SaveLocationName",
    "IsSaveByAuto",
    "LastSaveTime_Upper",
    "IsLogicalDelete",
    "GyroOnOff",
    "PlayReport_CtrlMode_Ext",
    "PlayReport_CtrlMode_Free",
    "NexUniqueID_Upper",
    "MiniMapDirection",
    "CameraRLReverse",
    "JumpButtonChange",
    "TextRubyOnOff",
    "VoiceLanguage",
    "PlayReport_CtrlMode_Console_Free",
    "PlayReport_PlayTime_Handheld",
    "BalloonTextOnOff",
    "PlayReport_AudioChannel_Other",
    "PlayReport_AudioChannel_5_1ch",
    "NexIsPosTrackUploadAvailableCache",
    "NexsSaveDataUploadIntervalHoursCache",
    "NexUniqueID_Lower",
    "TrackBlockFileNumber",
    "Option_LatestAoCVerPlayed",
    "NexPosTrackUploadIntervalHoursCache",
    "NexLastUploadTrackBlockHardIndex",
    "MainScreenOnOff",
    "PlayReport_AudioChannel_Stereo",
    "NexIsSaveDataUploadAvailableCache",
    "NexLastUploadSaveDataTime",
    "PlayReport_AllPlayTime",
    "NexLastUploadTrackBlockIndex",
    "PlayReport_CtrlMode_Console_Ext",
    "AmiiboItemOnOff",
    "TrackBlockFileNumber_Hard",
    "StickSensitivity",
    "TextWindowChange",
    "IsLastPlayHardMode",
    "PlayReport_CtrlMode_Console_FullKey",
    "NexLastUploadTrackBlockTime",
    "PlayReport_CtrlMode_FullKey",
    "PlayReport_PlayTime_Console",
    "PlayReport_AudioChannel_Mono",
    "CameraUpDownReverse",
    "PlayReport_CtrlMode_Handheld",
];

/// Key of the save-format file every persistent flag belongs to.
pub const SAVE_FILE_NAME: &str = "game_data.sav";

pub fn is_saved(flag: &Flag) -> bool {
    flag.is_persistent() && !IGNORED_SAVE_FLAGS.contains(&flag.name())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: BTreeSet<i32>,
    pub modified: BTreeSet<i32>,
    pub deleted: BTreeSet<i32>,
}

impl ChangeSet {
    pub fn counts(&self) -> ChangeCounts {
        ChangeCounts {
            new: self.added.len(),
            modified: self.modified.len(),
            deleted: self.deleted.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    fn note_added(&mut self, hash: i32) {
        self.deleted.remove(&hash);
        self.added.insert(hash);
    }

    fn note_modified(&mut self, old: i32, new: i32) {
        if self.added.remove(&old) {
            self.added.insert(new);
        } else {
            self.modified.remove(&old);
            self.modified.insert(new);
        }
    }

    fn note_deleted(&mut self, hash: i32) {
        if self.added.remove(&hash) {
            return;
        }
        self.modified.remove(&hash);
        self.deleted.insert(hash);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangeCounts {
    pub new: usize,
    pub modified: usize,
    pub deleted: usize,
}

impl ChangeCounts {
    pub fn total(&self) -> usize {
        self.new + self.modified + self.deleted
    }
}

impl AddAssign for ChangeCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.new += rhs.new;
        self.modified += rhs.modified;
        self.deleted += rhs.deleted;
    }
}

/// Outcome of [`FlagStore::sync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Added,
    Modified,
    Unchanged,
}

/// Per-kind maps from hash to flag. Every map is ordered by signed hash, which
/// is the order pages are written in.
#[derive(Debug, Clone, Default)]
pub struct FlagStore {
    categories: BTreeMap<FlagKind, BTreeMap<i32, Flag>>,
    changes: BTreeMap<FlagKind, ChangeSet>,
    save_changes: ChangeSet,
}

impl FlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode every record of one category, then insert them. A malformed record
    /// rejects the whole batch. With `overwrite` false, hashes already present win.
    pub fn ingest(
        &mut self,
        kind: FlagKind,
        records: &[Byml],
        is_revival: bool,
        overwrite: bool,
    ) -> Result<usize> {
        let decoded = records
            .iter()
            .map(|doc| Flag::from_decoded(kind, doc, is_revival))
            .collect::<Result<Vec<_>>>()?;

        let map = self.categories.entry(kind).or_default();
        let mut inserted = 0usize;
        for flag in decoded {
            if !overwrite && map.contains_key(&flag.hash()) {
                continue;
            }
            map.insert(flag.hash(), flag);
            inserted += 1;
        }
        debug!(category = %kind, inserted, overwrite, "ingested flags");
        Ok(inserted)
    }

    /// Ingest a whole game-state page: every root key names a category.
    pub fn ingest_page(
        &mut self,
        page_name: &str,
        page: &Byml,
        is_revival: bool,
        overwrite: bool,
    ) -> Result<usize> {
        let root = page.as_hash().ok_or_else(|| {
            SyncError::MalformedDocument(format!("page {page_name} root is not a hash"))
        })?;

        let mut batches = Vec::with_capacity(root.len());
        for (category, records) in root {
            let kind = FlagKind::from_category(category).ok_or_else(|| {
                SyncError::MalformedDocument(format!(
                    "page {page_name} has unknown category {category}"
                ))
            })?;
            let records = records.as_array().ok_or_else(|| {
                SyncError::MalformedDocument(format!(
                    "page {page_name} category {category} is not an array"
                ))
            })?;
            batches.push((kind, records));
        }

        // Stage into a scratch store so a bad category leaves self untouched.
        let mut staged = FlagStore::new();
        for (kind, records) in &batches {
            staged.ingest(*kind, records, is_revival, true)?;
        }
        let mut inserted = 0usize;
        for (kind, flags) in staged.categories {
            let map = self.categories.entry(kind).or_default();
            for (hash, flag) in flags {
                if !overwrite && map.contains_key(&hash) {
                    continue;
                }
                map.insert(hash, flag);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Insert or replace at the flag's hash; the last write wins.
    pub fn add(&mut self, flag: Flag) -> Option<Flag> {
        let kind = flag.kind();
        let hash = flag.hash();
        let saved = is_saved(&flag);
        trace!(category = %kind, name = flag.name(), "add flag");
        let previous = self.categories.entry(kind).or_default().insert(hash, flag);
        if previous.is_none() {
            self.changes.entry(kind).or_default().note_added(hash);
            if saved {
                self.save_changes.note_added(hash);
            }
        }
        previous
    }

    /// Like [`FlagStore::add`], but refuses to replace a flag with a different name.
    pub fn add_checked(&mut self, flag: Flag) -> Result<Option<Flag>> {
        if let Some(existing) = self.find(flag.kind(), flag.hash()) {
            if existing.name() != flag.name() {
                return Err(SyncError::HashCollision {
                    category: flag.kind().category().to_string(),
                    hash: flag.hash(),
                    existing: existing.name().to_string(),
                    incoming: flag.name().to_string(),
                });
            }
        }
        Ok(self.add(flag))
    }

    pub fn find(&self, kind: FlagKind, hash: i32) -> Option<&Flag> {
        self.categories.get(&kind).and_then(|m| m.get(&hash))
    }

    pub fn find_mut(&mut self, kind: FlagKind, hash: i32) -> Option<&mut Flag> {
        self.categories.get_mut(&kind).and_then(|m| m.get_mut(&hash))
    }

    pub fn find_all_by_substring(&self, kind: FlagKind, needle: &str) -> Vec<&Flag> {
        self.categories
            .get(&kind)
            .map(|m| m.values().filter(|f| f.name().contains(needle)).collect())
            .unwrap_or_default()
    }

    pub fn find_all_hashes(&self, kind: FlagKind, needle: &str) -> BTreeSet<i32> {
        self.find_all_by_substring(kind, needle)
            .into_iter()
            .map(Flag::hash)
            .collect()
    }

    /// Move the flag at `old_hash` to `flag`'s hash. Returns false, and changes
    /// nothing, when the hash is unchanged or `old_hash` is absent.
    pub fn modify(&mut self, kind: FlagKind, old_hash: i32, flag: Flag) -> bool {
        if flag.hash() == old_hash || flag.kind() != kind {
            return false;
        }
        let Some(map) = self.categories.get_mut(&kind) else {
            return false;
        };
        let Some(old) = map.remove(&old_hash) else {
            return false;
        };
        let new_hash = flag.hash();
        let saved = is_saved(&flag);
        map.insert(new_hash, flag);

        self.changes
            .entry(kind)
            .or_default()
            .note_modified(old_hash, new_hash);
        match (is_saved(&old), saved) {
            (true, true) => self.save_changes.note_modified(old_hash, new_hash),
            (true, false) => self.save_changes.note_deleted(old_hash),
            (false, true) => self.save_changes.note_added(new_hash),
            (false, false) => {}
        }
        true
    }

    /// Bring the store in line with a desired flag.
    ///
    /// `previous` names hashes the flag may currently live under (for example the
    /// hash of an object's name before it moved). The first one found is replaced
    /// when any parameter differs; with none found the flag is added.
    pub fn sync(&mut self, flag: Flag, previous: &[i32]) -> SyncOutcome {
        let kind = flag.kind();
        let candidates = previous.iter().copied().chain(std::iter::once(flag.hash()));
        let found = candidates
            .filter_map(|h| self.find(kind, h).map(|f| (h, f)))
            .next()
            .map(|(h, f)| (h, f == &flag));

        match found {
            None => {
                self.add(flag);
                SyncOutcome::Added
            }
            Some((_, true)) => SyncOutcome::Unchanged,
            Some((old_hash, false)) => {
                let new_hash = flag.hash();
                if old_hash == new_hash {
                    let saved = is_saved(&flag);
                    if let Some(map) = self.categories.get_mut(&kind) {
                        map.insert(new_hash, flag);
                    }
                    self.changes
                        .entry(kind)
                        .or_default()
                        .note_modified(old_hash, new_hash);
                    if saved {
                        self.save_changes.note_modified(old_hash, new_hash);
                    }
                } else {
                    self.modify(kind, old_hash, flag);
                }
                SyncOutcome::Modified
            }
        }
    }

    pub fn remove(&mut self, kind: FlagKind, hash: i32) -> bool {
        let Some(flag) = self.categories.get_mut(&kind).and_then(|m| m.remove(&hash)) else {
            return false;
        };
        self.changes.entry(kind).or_default().note_deleted(hash);
        if is_saved(&flag) {
            self.save_changes.note_deleted(hash);
        }
        true
    }

    /// Remove `hash` from the first category holding it.
    pub fn remove_everywhere(&mut self, hash: i32) -> Option<FlagKind> {
        let kind = self
            .categories
            .iter()
            .find(|(_, m)| m.contains_key(&hash))
            .map(|(k, _)| *k)?;
        self.remove(kind, hash);
        Some(kind)
    }

    /// Drop every flag of every category, recording each as deleted.
    pub fn remove_all(&mut self) {
        let categories = std::mem::take(&mut self.categories);
        for (kind, flags) in categories {
            let changes = self.changes.entry(kind).or_default();
            for (hash, flag) in flags {
                changes.note_deleted(hash);
                if is_saved(&flag) {
                    self.save_changes.note_deleted(hash);
                }
            }
        }
    }

    pub fn len(&self, kind: FlagKind) -> usize {
        self.categories.get(&kind).map_or(0, BTreeMap::len)
    }

    pub fn total_len(&self) -> usize {
        self.categories.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }

    /// All flags of one kind, ascending by signed hash.
    pub fn iter_kind(&self, kind: FlagKind) -> impl Iterator<Item = &Flag> {
        self.categories
            .get(&kind)
            .into_iter()
            .flat_map(BTreeMap::values)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flag> {
        self.categories.values().flat_map(BTreeMap::values)
    }

    pub fn changes(&self, kind: FlagKind) -> Option<&ChangeSet> {
        self.changes.get(&kind)
    }

    /// Change tallies per category since the last reset.
    pub fn diff_counts(&self) -> BTreeMap<FlagKind, ChangeCounts> {
        self.changes
            .iter()
            .map(|(kind, set)| (*kind, set.counts()))
            .collect()
    }

    pub fn save_diff_counts(&self) -> ChangeCounts {
        self.save_changes.counts()
    }

    pub fn reset_changes(&mut self) {
        self.changes.clear();
        self.save_changes = ChangeSet::default();
    }

    /// Flags of `kind`, optionally narrowed to (or away from) the revival subset.
    pub fn records(&self, kind: FlagKind, revival: Option<bool>) -> Vec<&Flag> {
        self.iter_kind(kind)
            .filter(|f| revival.is_none_or(|r| f.is_revival() == r))
            .collect()
    }

    /// Every flag that belongs in the save format, ascending by signed hash.
    pub fn savedata_records(&self) -> Vec<&Flag> {
        let mut out: Vec<&Flag> = self.iter().filter(|f| is_saved(f)).collect();
        out.sort_by_key(|f| f.hash());
        out
    }
}
