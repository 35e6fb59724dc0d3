use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info};

use crate::actor::{Actor, ActorPack, pack_path};
use crate::actor_info::ActorInfoIndex;
use crate::archive::{Archive, MemoryArchive};
use crate::byml::{self, Byml};
use crate::copy::{VanillaResolver, copy_actor_info, copy_pack};
use crate::error::SyncError;
use crate::flag::FlagKind;
use crate::overrides::OverrideRuleSet;
use crate::pages::{
    self, GAMEDATA_EXT, Page, SAVEDATA_EXT, load_gamedata, write_gamedata, write_savedata,
};
use crate::reader::Endian;
use crate::revival::{MapObject, generate_revival_flags};
use crate::store::{ChangeCounts, FlagStore};

use super::error::{CoreError, CoreErrorCode};
use super::types::{CategoryChange, ChangeReport, FlagSummary};

pub const GAMEDATA_DIR: &str = "GameData/gamedata";
pub const SAVEDATA_DIR: &str = "GameData/savedataformat";
pub const ACTOR_INFO_PATH: &str = "Actor/ActorInfo.product.byml";

#[derive(Debug, Default, Clone)]
pub struct Engine {
    rules: Arc<OverrideRuleSet>,
}

/// One editing session over an archive. Owns the flag pages, the actor index
/// and every actor opened for editing; nothing reaches the archive before
/// [`Session::save`].
#[derive(Debug)]
pub struct Session<A: Archive = MemoryArchive> {
    archive: A,
    endian: Endian,
    flags: FlagStore,
    index: ActorInfoIndex,
    rules: Arc<OverrideRuleSet>,
    actors: BTreeMap<String, Actor>,
}

/// Everything a save will write, fully encoded.
#[derive(Debug, Clone)]
pub struct StagedSave {
    pub files: Vec<(String, Vec<u8>)>,
    pub gamedata: Vec<Page>,
    pub savedata: Vec<Page>,
    pub actor_info: Vec<u8>,
    pub report: ChangeReport,
    flags: FlagStore,
    index: ActorInfoIndex,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: OverrideRuleSet) -> Self {
        Self {
            rules: Arc::new(rules),
        }
    }

    pub fn rules(&self) -> &OverrideRuleSet {
        &self.rules
    }

    /// Read the actor index and game-state pages out of `archive`. Byte order
    /// comes from the actor index, defaulting to little endian.
    pub fn open<A: Archive>(&self, archive: A) -> Result<Session<A>, CoreError> {
        let (index, endian) = match archive.get(ACTOR_INFO_PATH) {
            Some(bytes) => {
                let endian = byml::detect_endian(bytes).unwrap_or_default();
                let doc = byml::from_binary(bytes).map_err(|e| {
                    CoreError::new(
                        CoreErrorCode::Parse,
                        format!("failed to parse {ACTOR_INFO_PATH}: {e}"),
                    )
                })?;
                (ActorInfoIndex::from_document(&doc)?, endian)
            }
            None => {
                return Err(CoreError::new(
                    CoreErrorCode::NotFound,
                    format!("archive has no {ACTOR_INFO_PATH}"),
                ));
            }
        };
        let flags = load_gamedata(&archive, GAMEDATA_DIR)?;
        info!(
            actors = index.len(),
            flags = flags.total_len(),
            ?endian,
            "opened session"
        );
        Ok(Session {
            archive,
            endian,
            flags,
            index,
            rules: Arc::clone(&self.rules),
            actors: BTreeMap::new(),
        })
    }
}

impl<A: Archive> Session<A> {
    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    pub fn flags(&self) -> &FlagStore {
        &self.flags
    }

    pub fn actor_index(&self) -> &ActorInfoIndex {
        &self.index
    }

    pub fn archive(&self) -> &A {
        &self.archive
    }

    pub fn into_archive(self) -> A {
        self.archive
    }

    pub fn actor(&self, name: &str) -> Option<&Actor> {
        self.actors.get(name)
    }

    /// Flags whose name contains `needle`, optionally limited to one kind.
    pub fn search_flags(&self, needle: &str, kind: Option<FlagKind>) -> Vec<FlagSummary> {
        let kinds: Vec<FlagKind> = match kind {
            Some(kind) => vec![kind],
            None => FlagKind::ALL.to_vec(),
        };
        kinds
            .into_iter()
            .flat_map(|k| self.flags.find_all_by_substring(k, needle))
            .map(FlagSummary::from)
            .collect()
    }

    /// Load an actor for editing, or return the one already open.
    pub fn open_actor(&mut self, name: &str) -> Result<&mut Actor, CoreError> {
        if !self.actors.contains_key(name) {
            let actor = Actor::open(&self.archive, &self.index, name, Arc::clone(&self.rules))?;
            self.actors.insert(name.to_string(), actor);
        }
        self.actors
            .get_mut(name)
            .ok_or_else(|| CoreError::new(CoreErrorCode::NotFound, format!("actor {name}")))
    }

    pub fn rename_actor(&mut self, old_name: &str, new_name: &str) -> Result<(), CoreError> {
        if old_name != new_name && self.actors.contains_key(new_name) {
            return Err(CoreError::new(
                CoreErrorCode::UnsupportedOperation,
                format!("actor {new_name} is already open"),
            ));
        }
        self.open_actor(old_name)?;
        let Some(mut actor) = self.actors.remove(old_name) else {
            return Err(CoreError::new(
                CoreErrorCode::NotFound,
                format!("actor {old_name}"),
            ));
        };
        let result = actor.rename(new_name);
        let key = actor.name().to_string();
        self.actors.insert(key, actor);
        result.map_err(CoreError::from)
    }

    pub fn set_actor_link(
        &mut self,
        name: &str,
        link: &str,
        reference: &str,
    ) -> Result<(), CoreError> {
        self.open_actor(name)?
            .set_link(link, reference)
            .map_err(CoreError::from)
    }

    pub fn set_actor_has_far(&mut self, name: &str, enabled: bool) -> Result<bool, CoreError> {
        self.open_actor(name)?
            .set_has_far(enabled)
            .map_err(CoreError::from)
    }

    /// Copy `source` as `target`: pack, index entry and derived flags.
    pub fn copy_actor(
        &mut self,
        source: &str,
        target: &str,
        force: &BTreeSet<String>,
        resolver: &dyn VanillaResolver,
        bfres: Option<&str>,
    ) -> Result<(), CoreError> {
        if self.index.contains(target) || self.actors.contains_key(target) {
            return Err(CoreError::new(
                CoreErrorCode::UnsupportedOperation,
                format!("actor {target} already exists"),
            ));
        }
        let source_pack = match self.actors.get(source) {
            Some(actor) => actor.pack().clone(),
            None => {
                let resident = !self
                    .archive
                    .entries()
                    .iter()
                    .any(|e| e.starts_with(&pack_path(source, false)));
                ActorPack::from_archive(&self.archive, &pack_path(source, resident), source)?
            }
        };
        let pack = copy_pack(&source_pack, target, force, resolver)?;

        let mut index = self.index.clone();
        copy_actor_info(&mut index, source, target, bfres)?;
        let info = index
            .get(target)
            .cloned()
            .ok_or_else(|| SyncError::MissingEntry(format!("actor index entry {target}")))?;
        self.index = index;

        let actor = Actor::new(pack, None, info, None, false, Arc::clone(&self.rules));
        self.actors.insert(target.to_string(), actor);
        Ok(())
    }

    /// Regenerate the revival flags of one map unit, optionally against its stock version.
    pub fn generate_revival(
        &mut self,
        map: &Byml,
        stock: Option<&Byml>,
    ) -> Result<ChangeCounts, CoreError> {
        let objects = crate::revival::map_objects(map)?;
        let stock = stock.map(crate::revival::map_objects).transpose()?;
        Ok(generate_revival_flags(
            &mut self.flags,
            &objects,
            stock.as_deref(),
        ))
    }

    /// Encode every page, pack and index change without touching the archive.
    pub fn stage_save(&self) -> Result<StagedSave, CoreError> {
        if let Some(actor) = self.actors.values().find(|a| a.is_renaming()) {
            return Err(SyncError::RenameInProgress {
                from: actor.original_name().to_string(),
                to: actor.name().to_string(),
            }
            .into());
        }

        let mut flags = self.flags.clone();
        let mut index = self.index.clone();
        let mut files = Vec::new();
        for actor in self.actors.values() {
            for (kind, hashes) in actor.retired_flags() {
                for hash in hashes {
                    flags.remove(*kind, *hash);
                }
            }
            for flag in actor.flags().iter() {
                flags.sync(flag.clone(), &[]);
            }
            let staged = actor.stage(self.endian)?;
            for (name, record) in staged.info {
                index.insert_or_replace(&name, record)?;
            }
            files.extend(staged.files);
        }
        index.validate()?;

        let gamedata = write_gamedata(&flags, self.endian)?;
        let tail = pages::last_two_savedata_pages(&self.archive, SAVEDATA_DIR)?;
        let savedata = write_savedata(&flags, self.endian, &tail)?;
        let actor_info = byml::to_binary(&index.to_document(), self.endian)?;

        let report = ChangeReport {
            categories: flags
                .diff_counts()
                .into_iter()
                .filter(|(_, counts)| counts.total() > 0)
                .map(|(category, counts)| CategoryChange { category, counts })
                .collect(),
            save_data: flags.save_diff_counts(),
            actors: self.actors.keys().cloned().collect(),
            gamedata_pages: gamedata.len(),
            savedata_pages: savedata.len(),
        };
        debug!(
            files = files.len(),
            gamedata = gamedata.len(),
            savedata = savedata.len(),
            "staged save"
        );
        Ok(StagedSave {
            files,
            gamedata,
            savedata,
            actor_info,
            report,
            flags,
            index,
        })
    }

    /// Stage everything, then write it to the archive in one pass. A staging
    /// failure leaves the archive and session untouched.
    pub fn save(&mut self) -> Result<ChangeReport, CoreError> {
        let staged = self.stage_save()?;
        pages::replace_pages(&mut self.archive, GAMEDATA_DIR, GAMEDATA_EXT, &staged.gamedata);
        pages::replace_pages(&mut self.archive, SAVEDATA_DIR, SAVEDATA_EXT, &staged.savedata);
        for (path, data) in staged.files {
            self.archive.set(&path, data);
        }
        self.archive.set(ACTOR_INFO_PATH, staged.actor_info);

        self.flags = staged.flags;
        self.flags.reset_changes();
        self.index = staged.index;
        info!(
            changes = staged.report.totals().total(),
            actors = staged.report.actors.len(),
            "saved session"
        );
        Ok(staged.report)
    }
}
