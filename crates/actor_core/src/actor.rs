//! Actor packs, their link tables, and rename propagation.
//!
//! An actor pack is stored in an archive as a nested container: every file it
//! holds lives under `{pack_path}//{inner_path}`. The link table itself is the
//! `Actor/ActorLink/{name}.bxml` document inside the pack; each non-Dummy link
//! with a parameter file keeps that file at `Actor/{folder}/{ref}{ext}`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info};

use crate::actor_info::ActorInfoIndex;
use crate::archive::{Archive, NESTED_SEPARATOR};
use crate::byml::{self, Byml};
use crate::error::{Result, SyncError};
use crate::flag::{Flag, FlagKind};
use crate::hash::unsigned_hash_of;
use crate::overrides::OverrideRuleSet;
use crate::reader::Endian;
use crate::store::FlagStore;

/// Link value meaning "unused".
pub const DUMMY: &str = "Dummy";

pub const LINKS: [&str; 26] = [
    "ActorNameJpn",
    "AIProgramUser",
    "AIScheduleUser",
    "ASUser",
    "AttentionUser",
    "AwarenessUser",
    "BoneControlUser",
    "ActorCaptureUser",
    "ChemicalUser",
    "DamageParamUser",
    "DropTableUser",
    "ElinkUser",
    "GParamUser",
    "LifeConditionUser",
    "LODUser",
    "ModelUser",
    "PhysicsUser",
    "ProfileUser",
    "RgBlendWeightUser",
    "RgConfigListUser",
    "RecipeUser",
    "ShopDataUser",
    "SlinkUser",
    "UMiiUser",
    "XlinkUser",
    "AnimationInfo",
];

/// Link kinds whose parameter files live inside the pack: `(link, folder, extension)`.
pub const LINK_FILES: [(&str, &str, &str); 20] = [
    ("AIProgramUser", "AIProgram", ".baiprog"),
    ("ASUser", "ASList", ".baslist"),
    ("AttentionUser", "AttClientList", ".batcllist"),
    ("AwarenessUser", "Awareness", ".bawareness"),
    ("BoneControlUser", "BoneControl", ".bbonectrl"),
    ("ChemicalUser", "Chemical", ".bchemical"),
    ("DamageParamUser", "DamageParam", ".bdmgparam"),
    ("DropTableUser", "DropTable", ".bdrop"),
    ("GParamUser", "GeneralParamList", ".bgparamlist"),
    ("LifeConditionUser", "LifeCondition", ".blifecondition"),
    ("LODUser", "LOD", ".blod"),
    ("ModelUser", "ModelList", ".bmodellist"),
    ("PhysicsUser", "Physics", ".bphysics"),
    ("RgBlendWeightUser", "RagdollBlendWeight", ".brgbw"),
    ("RgConfigListUser", "RagdollConfigList", ".brgconfiglist"),
    ("RecipeUser", "Recipe", ".brecipe"),
    ("ShopDataUser", "ShopData", ".bshop"),
    ("UMiiUser", "UMii", ".bumii"),
    ("AIScheduleUser", "AISchedule", ".baischedule"),
    ("AnimationInfo", "AnimationInfo", ".baniminfo"),
];

/// Links shared between an actor and its far variant.
pub const FAR_LINKS: [&str; 3] = ["LifeConditionUser", "ModelUser", "PhysicsUser"];

/// Flags every actor of a type owns, by the first `_`-separated token of its name.
pub const FLAG_TYPES: [(&str, &[&str]); 6] = [
    (
        "Animal",
        &["IsNewPictureBook_", "IsRegisteredPictureBook_", "PictureBookSize_"],
    ),
    ("Armor", &["EquipTime_", "IsGet_", "PorchTime_"]),
    (
        "Enemy",
        &["IsNewPictureBook_", "IsRegisteredPictureBook_", "PictureBookSize_"],
    ),
    (
        "Item",
        &[
            "IsGet_",
            "IsNewPictureBook_",
            "IsRegisteredPictureBook_",
            "PictureBookSize_",
        ],
    ),
    ("Npc", &["_DispNameFlag"]),
    (
        "Weapon",
        &[
            "EquipTime_",
            "IsGet_",
            "IsNewPictureBook_",
            "IsRegisteredPictureBook_",
            "PictureBookSize_",
            "PorchTime_",
        ],
    ),
];

const FLAG_PREFIX_KINDS: [(&str, FlagKind); 7] = [
    ("_DispNameFlag", FlagKind::Bool),
    ("EquipTime_", FlagKind::S32),
    ("IsGet_", FlagKind::Bool),
    ("IsNewPictureBook_", FlagKind::Bool),
    ("IsRegisteredPictureBook_", FlagKind::Bool),
    ("PictureBookSize_", FlagKind::S32),
    ("PorchTime_", FlagKind::S32),
];

/// Actor index keys copied straight from a link when it is not Dummy.
const INFO_LINK_KEYS: [(&str, &str); 4] = [
    ("elink", "ElinkUser"),
    ("profile", "ProfileUser"),
    ("slink", "SlinkUser"),
    ("xlink", "XlinkUser"),
];

const KEY_LINK_TARGET: &str = "LinkTarget";
const KEY_ACTOR_SCALE: &str = "ActorScale";
const KEY_TAGS: &str = "Tags";
const PACK_EXT: &str = ".sbactorpack";
const RESIDENT_PACK: &str = "Pack/TitleBG.pack";

pub fn far_name(name: &str) -> String {
    format!("{name}_Far")
}

/// Archive path of an actor pack; resident actors live inside the title pack.
pub fn pack_path(name: &str, resident: bool) -> String {
    let inner = format!("Actor/Pack/{name}{PACK_EXT}");
    if resident {
        format!("{RESIDENT_PACK}{NESTED_SEPARATOR}{inner}")
    } else {
        inner
    }
}

pub fn link_folder(link: &str) -> Option<(&'static str, &'static str)> {
    LINK_FILES
        .iter()
        .find(|(l, _, _)| *l == link)
        .map(|(_, folder, ext)| (*folder, *ext))
}

/// `Actor/{folder}/{reference}{ext}` for links that own a parameter file.
pub fn link_file_path(link: &str, reference: &str) -> Option<String> {
    let (folder, ext) = link_folder(link)?;
    Some(format!("Actor/{folder}/{reference}{ext}"))
}

fn actor_link_path(name: &str) -> String {
    format!("Actor/ActorLink/{name}.bxml")
}

/// The flags derived from an actor name, with overrides applied.
pub fn derived_flags(name: &str, rules: &OverrideRuleSet) -> Vec<Flag> {
    let actor_type = name.split('_').next().unwrap_or_default();
    let Some((_, prefixes)) = FLAG_TYPES.iter().find(|(t, _)| *t == actor_type) else {
        return Vec::new();
    };
    prefixes
        .iter()
        .filter_map(|prefix| {
            let (_, kind) = FLAG_PREFIX_KINDS.iter().find(|(p, _)| p == prefix)?;
            let flag_name = if prefix.starts_with('_') {
                format!("{name}{prefix}")
            } else {
                format!("{prefix}{name}")
            };
            let mut flag = Flag::new(*kind, flag_name);
            flag.apply_overrides(rules);
            Some(flag)
        })
        .collect()
}

/// Link kind to reference. Kinds never set read as Dummy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkTable {
    links: BTreeMap<String, String>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, link: &str) -> &str {
        self.links.get(link).map_or(DUMMY, String::as_str)
    }

    pub fn set(&mut self, link: &str, reference: &str) -> Result<()> {
        if !LINKS.contains(&link) {
            return Err(SyncError::UnknownLink(link.to_string()));
        }
        self.links.insert(link.to_string(), reference.to_string());
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.links.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Point every link referencing `old` at `new`. Returns the kinds rewritten.
    pub fn rename_references(&mut self, old: &str, new: &str) -> Vec<String> {
        let mut rewritten = Vec::new();
        for (link, reference) in &mut self.links {
            if reference.as_str() == old {
                *reference = new.to_string();
                rewritten.push(link.clone());
            }
        }
        rewritten
    }
}

/// The contents of one actor pack.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorPack {
    name: String,
    links: LinkTable,
    actor_scale: f32,
    tags: BTreeSet<String>,
    link_data: BTreeMap<String, Vec<u8>>,
    misc: BTreeMap<String, Vec<u8>>,
}

impl ActorPack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            links: LinkTable::new(),
            actor_scale: 1.0,
            tags: BTreeSet::new(),
            link_data: BTreeMap::new(),
            misc: BTreeMap::new(),
        }
    }

    /// Read the pack stored under `pack_path`.
    pub fn from_archive<A: Archive + ?Sized>(archive: &A, pack_path: &str, name: &str) -> Result<Self> {
        let prefix = format!("{pack_path}{NESTED_SEPARATOR}");
        let mut files: BTreeMap<String, Vec<u8>> = archive
            .entries()
            .into_iter()
            .filter_map(|path| {
                let inner = path.strip_prefix(&prefix)?.to_string();
                let data = archive.get(&path)?.to_vec();
                Some((inner, data))
            })
            .collect();

        let link_path = actor_link_path(name);
        let link_doc = files
            .remove(&link_path)
            .ok_or_else(|| SyncError::MissingEntry(format!("{prefix}{link_path}")))?;
        let link_doc = byml::from_binary(&link_doc)?;

        let mut pack = Self::new(name);
        pack.read_link_document(&link_doc)?;
        for (link, reference) in pack.links.iter() {
            if reference == DUMMY {
                continue;
            }
            if let Some(path) = link_file_path(link, reference) {
                if let Some(data) = files.remove(&path) {
                    pack.link_data.insert(link.to_string(), data);
                }
            }
        }
        pack.misc = files;
        debug!(
            actor = name,
            links = pack.link_data.len(),
            misc = pack.misc.len(),
            "loaded actor pack"
        );
        Ok(pack)
    }

    fn read_link_document(&mut self, doc: &Byml) -> Result<()> {
        let bad = |reason: &str| SyncError::malformed(actor_link_path(&self.name), reason);
        let target = doc
            .get(KEY_LINK_TARGET)
            .and_then(Byml::as_hash)
            .ok_or_else(|| bad("LinkTarget missing"))?;
        let mut links = LinkTable::new();
        let mut actor_scale = 1.0;
        for (key, value) in target {
            if key == KEY_ACTOR_SCALE {
                actor_scale = value.as_float().ok_or_else(|| bad("ActorScale is not a float"))?;
                continue;
            }
            let reference = value
                .as_str()
                .ok_or_else(|| bad(&format!("link {key} is not a string")))?;
            links.set(key, reference)?;
        }
        let mut tags = BTreeSet::new();
        if let Some(list) = doc.get(KEY_TAGS) {
            let list = list.as_array().ok_or_else(|| bad("Tags is not an array"))?;
            for tag in list {
                tags.insert(tag.as_str().ok_or_else(|| bad("tag is not a string"))?.to_string());
            }
        }
        self.links = links;
        self.actor_scale = actor_scale;
        self.tags = tags;
        Ok(())
    }

    fn link_document(&self) -> Byml {
        let mut target = Byml::new_hash();
        for link in LINKS {
            target.insert(link, self.links.get(link));
        }
        target.insert(KEY_ACTOR_SCALE, self.actor_scale);
        let mut doc = Byml::new_hash();
        doc.insert(KEY_LINK_TARGET, target);
        if !self.tags.is_empty() {
            let tags = self.tags.iter().map(|t| Byml::from(t.as_str())).collect();
            doc.insert(KEY_TAGS, Byml::Array(tags));
        }
        doc
    }

    /// Every file of the pack as `(inner_path, bytes)`.
    pub fn to_files(&self, endian: Endian) -> Result<Vec<(String, Vec<u8>)>> {
        let mut files = vec![(
            actor_link_path(&self.name),
            byml::to_binary(&self.link_document(), endian)?,
        )];
        for (link, data) in &self.link_data {
            if let Some(path) = link_file_path(link, self.links.get(link)) {
                files.push((path, data.clone()));
            }
        }
        files.extend(self.misc.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(files)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn links(&self) -> &LinkTable {
        &self.links
    }

    pub fn link(&self, link: &str) -> &str {
        self.links.get(link)
    }

    /// Setting a link to Dummy drops its parameter file; setting one from Dummy
    /// starts it empty.
    pub fn set_link(&mut self, link: &str, reference: &str) -> Result<()> {
        let old = self.links.get(link).to_string();
        self.links.set(link, reference)?;
        if link_folder(link).is_some() {
            if reference == DUMMY {
                self.link_data.remove(link);
            } else if old == DUMMY {
                self.link_data.entry(link.to_string()).or_default();
            }
        }
        Ok(())
    }

    pub fn link_data(&self, link: &str) -> Option<&[u8]> {
        self.link_data.get(link).map(Vec::as_slice)
    }

    pub fn set_link_data(&mut self, link: &str, data: Vec<u8>) {
        self.link_data.insert(link.to_string(), data);
    }

    pub fn actor_scale(&self) -> f32 {
        self.actor_scale
    }

    pub fn set_actor_scale(&mut self, scale: f32) {
        self.actor_scale = scale;
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn set_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
    }

    pub fn misc_files(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.misc
    }

    pub fn set_misc_file(&mut self, path: &str, data: Vec<u8>) {
        self.misc.insert(path.to_string(), data);
    }

    pub(crate) fn take_misc_file(&mut self, path: &str) -> Option<Vec<u8>> {
        self.misc.remove(path)
    }

    /// Rename the pack. Links referencing the current name follow it, and so
    /// do loose file names containing it. Returns the rewritten link kinds.
    pub fn rename(&mut self, new_name: &str) -> Vec<String> {
        let old = std::mem::replace(&mut self.name, new_name.to_string());
        let rewritten = self.links.rename_references(&old, new_name);
        let misc = std::mem::take(&mut self.misc);
        self.misc = misc
            .into_iter()
            .map(|(path, data)| {
                if path.contains(&old) {
                    (path.replace(&old, new_name), data)
                } else {
                    (path, data)
                }
            })
            .collect();
        rewritten
    }
}

/// Build the actor index record for `pack` on top of its previous record.
pub fn generate_actor_info(pack: &ActorPack, has_far: bool, base: &Byml, renamed: bool) -> Byml {
    let mut entry = if base.as_hash().is_some() {
        base.clone()
    } else {
        Byml::new_hash()
    };
    let Some(map) = entry.as_hash_mut() else {
        return entry;
    };

    map.insert("name".to_string(), Byml::from(pack.name()));
    map.insert("isHasFar".to_string(), Byml::Bool(has_far));
    if pack.link("SlinkUser") != DUMMY {
        map.insert("bugMask".to_string(), Byml::Int(2));
    }
    if renamed {
        if let Some(Byml::Int(key)) = map.get("sortKey") {
            if *key > 0 {
                let next = key + 1;
                map.insert("sortKey".to_string(), Byml::Int(next));
            }
        }
    }
    for (key, link) in INFO_LINK_KEYS {
        match pack.link(link) {
            DUMMY => {
                map.remove(key);
            }
            reference => {
                map.insert(key.to_string(), Byml::from(reference));
            }
        }
    }
    if (pack.actor_scale() - 1.0).abs() > f32::EPSILON {
        map.insert("actorScale".to_string(), Byml::Float(pack.actor_scale()));
    } else {
        map.remove("actorScale");
    }
    if pack.tags().is_empty() {
        map.remove("tags");
    } else {
        let mut tags = Byml::new_hash();
        for tag in pack.tags() {
            let hash = unsigned_hash_of(tag);
            let value = if hash > i32::MAX as u32 {
                Byml::UInt(hash)
            } else {
                Byml::Int(hash as i32)
            };
            tags.insert(format!("tag{hash:x}"), value);
        }
        map.insert("tags".to_string(), tags);
    }
    entry
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameState {
    Idle,
    Renaming { from: String, to: String },
}

/// Files and index records an actor contributes to a save.
#[derive(Debug, Clone, Default)]
pub struct StagedActor {
    pub files: Vec<(String, Vec<u8>)>,
    pub info: Vec<(String, Byml)>,
}

/// One editable actor: its pack, optional far variant, index records, and the
/// flags derived from its name.
#[derive(Debug, Clone)]
pub struct Actor {
    pack: ActorPack,
    far: Option<ActorPack>,
    info: Byml,
    far_info: Byml,
    original_name: String,
    original_far_name: String,
    resident: bool,
    flags: FlagStore,
    derived: BTreeMap<FlagKind, BTreeSet<i32>>,
    retired: BTreeMap<FlagKind, BTreeSet<i32>>,
    rules: Arc<OverrideRuleSet>,
    state: RenameState,
    needs_info_update: bool,
    far_needs_info_update: bool,
}

impl Actor {
    pub fn new(
        pack: ActorPack,
        far: Option<ActorPack>,
        info: Byml,
        far_info: Option<Byml>,
        resident: bool,
        rules: Arc<OverrideRuleSet>,
    ) -> Self {
        let original_name = pack.name().to_string();
        let original_far_name = far
            .as_ref()
            .map_or_else(|| far_name(&original_name), |f| f.name().to_string());
        let mut actor = Self {
            pack,
            far,
            info,
            far_info: far_info.unwrap_or_else(Byml::new_hash),
            original_name,
            original_far_name,
            resident,
            flags: FlagStore::new(),
            derived: BTreeMap::new(),
            retired: BTreeMap::new(),
            rules,
            state: RenameState::Idle,
            needs_info_update: false,
            far_needs_info_update: false,
        };
        actor.set_flags();
        actor
    }

    /// Load `name` and its far variant from `archive`, with index records from `index`.
    pub fn open<A: Archive + ?Sized>(
        archive: &A,
        index: &ActorInfoIndex,
        name: &str,
        rules: Arc<OverrideRuleSet>,
    ) -> Result<Self> {
        let has_pack = |path: &str| {
            let prefix = format!("{path}{NESTED_SEPARATOR}");
            archive.entries().iter().any(|e| e.starts_with(&prefix))
        };
        let resident = if has_pack(&pack_path(name, false)) {
            false
        } else if has_pack(&pack_path(name, true)) {
            true
        } else {
            return Err(SyncError::MissingEntry(pack_path(name, false)));
        };
        let pack = ActorPack::from_archive(archive, &pack_path(name, resident), name)?;

        let far_pack_name = far_name(name);
        let far = if has_pack(&pack_path(&far_pack_name, false)) {
            Some(ActorPack::from_archive(
                archive,
                &pack_path(&far_pack_name, false),
                &far_pack_name,
            )?)
        } else {
            None
        };

        let info = index
            .get(name)
            .cloned()
            .ok_or_else(|| SyncError::MissingEntry(format!("actor index entry {name}")))?;
        let far_info = match &far {
            Some(_) => Some(index.get(&far_pack_name).cloned().ok_or_else(|| {
                SyncError::MissingEntry(format!("actor index entry {far_pack_name}"))
            })?),
            None => None,
        };
        Ok(Self::new(pack, far, info, far_info, resident, rules))
    }

    pub fn name(&self) -> &str {
        self.pack.name()
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn pack(&self) -> &ActorPack {
        &self.pack
    }

    pub fn far(&self) -> Option<&ActorPack> {
        self.far.as_ref()
    }

    pub fn has_far(&self) -> bool {
        self.far.is_some()
    }

    pub fn is_resident(&self) -> bool {
        self.resident
    }

    pub fn state(&self) -> &RenameState {
        &self.state
    }

    pub fn is_renaming(&self) -> bool {
        self.state != RenameState::Idle
    }

    /// The flags derived from the current name.
    pub fn flags(&self) -> &FlagStore {
        &self.flags
    }

    /// Hashes of flags derived from earlier names, per kind.
    pub fn retired_flags(&self) -> &BTreeMap<FlagKind, BTreeSet<i32>> {
        &self.retired
    }

    pub fn link(&self, link: &str) -> &str {
        self.pack.link(link)
    }

    /// On an actor with a far variant, the life condition cannot be Dummy and
    /// the shared links are mirrored onto the far pack.
    pub fn set_link(&mut self, link: &str, reference: &str) -> Result<()> {
        if let Some(far) = &mut self.far {
            if link == "LifeConditionUser" && reference == DUMMY {
                return Err(SyncError::FarVariantConstraint {
                    actor: self.pack.name().to_string(),
                });
            }
            if FAR_LINKS.contains(&link) {
                far.set_link(link, reference)?;
                self.far_needs_info_update = true;
            }
        }
        self.pack.set_link(link, reference)?;
        self.needs_info_update = true;
        Ok(())
    }

    pub fn link_data(&self, link: &str) -> Option<&[u8]> {
        self.pack.link_data(link)
    }

    pub fn set_link_data(&mut self, link: &str, data: Vec<u8>) {
        self.pack.set_link_data(link, data);
        self.needs_info_update = true;
    }

    pub fn set_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pack.set_tags(tags);
        self.needs_info_update = true;
    }

    /// Returns false when nothing changed. A new far pack takes the model and
    /// physics links (not the life condition) with their files.
    pub fn set_has_far(&mut self, enabled: bool) -> Result<bool> {
        match (enabled, self.far.is_some()) {
            (true, false) => {
                let mut far = ActorPack::new(far_name(self.name()));
                for link in FAR_LINKS.iter().filter(|l| **l != "LifeConditionUser") {
                    let reference = self.pack.link(link);
                    if reference == DUMMY {
                        continue;
                    }
                    far.set_link(link, reference)?;
                    if let Some(data) = self.pack.link_data(link) {
                        far.set_link_data(link, data.to_vec());
                    }
                }
                self.far = Some(far);
                self.far_info = Byml::new_hash();
                self.far_needs_info_update = true;
                self.resident = false;
            }
            (false, true) => {
                self.far = None;
            }
            _ => return Ok(false),
        }
        self.needs_info_update = true;
        Ok(true)
    }

    /// Rename the actor, its far variant, self links and derived flags.
    pub fn rename(&mut self, new_name: &str) -> Result<()> {
        if let RenameState::Renaming { from, to } = &self.state {
            return Err(SyncError::RenameInProgress {
                from: from.clone(),
                to: to.clone(),
            });
        }
        let old_name = self.name().to_string();
        if old_name == new_name {
            return Ok(());
        }
        self.state = RenameState::Renaming {
            from: old_name.clone(),
            to: new_name.to_string(),
        };
        let result = self.apply_rename(&old_name, new_name);
        self.state = RenameState::Idle;
        let rewritten = result?;

        info!(from = %old_name, to = new_name, links = rewritten.len(), "renamed actor");
        Ok(())
    }

    fn apply_rename(&mut self, old_name: &str, new_name: &str) -> Result<Vec<String>> {
        let rewritten = self.pack.rename(new_name);
        if let Some(far) = &mut self.far {
            far.rename(&far_name(new_name));
            for link in FAR_LINKS {
                if far.link(link) == old_name {
                    far.set_link(link, new_name)?;
                }
            }
            self.far_needs_info_update = true;
        }
        self.set_flags();
        self.needs_info_update = true;
        self.resident = false;
        Ok(rewritten)
    }

    /// Drop the flags derived from the previous name and derive the current set.
    fn set_flags(&mut self) {
        let previous = std::mem::take(&mut self.derived);
        for (kind, hashes) in previous {
            for hash in hashes {
                if self.flags.remove(kind, hash) {
                    self.retired.entry(kind).or_default().insert(hash);
                }
            }
        }
        for flag in derived_flags(self.pack.name(), &self.rules) {
            let (kind, hash) = (flag.kind(), flag.hash());
            if let Some(retired) = self.retired.get_mut(&kind) {
                retired.remove(&hash);
            }
            self.derived.entry(kind).or_default().insert(hash);
            self.flags.add(flag);
        }
        debug!(
            actor = self.pack.name(),
            flags = self.flags.total_len(),
            "derived actor flags"
        );
    }

    pub fn actor_info(&self) -> Byml {
        if !self.needs_info_update {
            return self.info.clone();
        }
        generate_actor_info(
            &self.pack,
            self.far.is_some(),
            &self.info,
            self.original_name != self.pack.name(),
        )
    }

    pub fn far_actor_info(&self) -> Option<Byml> {
        let far = self.far.as_ref()?;
        if !self.far_needs_info_update {
            return Some(self.far_info.clone());
        }
        Some(generate_actor_info(
            far,
            false,
            &self.far_info,
            self.original_far_name != far.name(),
        ))
    }

    /// Encode the packs and index records for a save.
    pub fn stage(&self, endian: Endian) -> Result<StagedActor> {
        if let RenameState::Renaming { from, to } = &self.state {
            return Err(SyncError::RenameInProgress {
                from: from.clone(),
                to: to.clone(),
            });
        }
        let mut staged = StagedActor::default();
        let path = pack_path(self.name(), self.resident);
        for (inner, data) in self.pack.to_files(endian)? {
            staged
                .files
                .push((format!("{path}{NESTED_SEPARATOR}{inner}"), data));
        }
        staged
            .info
            .push((self.name().to_string(), self.actor_info()));

        if let (Some(far), Some(far_info)) = (&self.far, self.far_actor_info()) {
            let path = pack_path(far.name(), false);
            for (inner, data) in far.to_files(endian)? {
                staged
                    .files
                    .push((format!("{path}{NESTED_SEPARATOR}{inner}"), data));
            }
            staged.info.push((far.name().to_string(), far_info));
        }
        Ok(staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_prefixes_append_to_the_name() {
        let names: Vec<String> = derived_flags("Npc_Tester", &OverrideRuleSet::empty())
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        assert_eq!(names, vec!["Npc_Tester_DispNameFlag".to_string()]);
    }

    #[test]
    fn untyped_names_derive_nothing() {
        assert!(derived_flags("Obj_Box", &OverrideRuleSet::empty()).is_empty());
    }

    #[test]
    fn dummy_link_drops_its_file() {
        let mut pack = ActorPack::new("Weapon_Sword_001");
        pack.set_link("PhysicsUser", "Weapon_Sword_001").expect("set");
        assert_eq!(pack.link_data("PhysicsUser"), Some(&[][..]));
        pack.set_link("PhysicsUser", DUMMY).expect("set");
        assert_eq!(pack.link_data("PhysicsUser"), None);
    }

    #[test]
    fn unknown_link_kind_is_rejected() {
        let mut links = LinkTable::new();
        assert!(matches!(
            links.set("NotALink", "x"),
            Err(SyncError::UnknownLink(_))
        ));
    }
}
