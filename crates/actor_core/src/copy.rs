//! Duplicating an actor pack and its index entry under a new name.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::actor::{ActorPack, DUMMY, link_file_path};
use crate::actor_info::ActorInfoIndex;
use crate::byml::Byml;
use crate::error::{Result, SyncError};

/// Links whose parameter file can move to the copy's own name.
pub const COPY_USERS: [&str; 9] = [
    "DamageParamUser",
    "DropTableUser",
    "GParamUser",
    "LifeConditionUser",
    "ModelUser",
    "PhysicsUser",
    "RecipeUser",
    "ShopDataUser",
    "UMiiUser",
];

/// Supplies the reference an unmodified game actor uses for a link.
pub trait VanillaResolver {
    fn fallback(&self, link: &str, actor: &str) -> Option<String>;
}

/// Resolver backed by a JSON table: `{actor: {link: reference}}`.
#[derive(Debug, Clone, Default)]
pub struct MapResolver {
    refs: HashMap<String, HashMap<String, String>>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let refs = serde_json::from_str(text)
            .map_err(|e| SyncError::MalformedDocument(format!("invalid vanilla table: {e}")))?;
        Ok(Self { refs })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    pub fn insert(&mut self, actor: &str, link: &str, reference: &str) {
        self.refs
            .entry(actor.to_string())
            .or_default()
            .insert(link.to_string(), reference.to_string());
    }
}

impl VanillaResolver for MapResolver {
    fn fallback(&self, link: &str, actor: &str) -> Option<String> {
        self.refs.get(actor)?.get(link).cloned()
    }
}

/// Copy `source` as `target`. Links naming the source follow the new name, and
/// every link in `force` gets a file of its own under the target name.
pub fn copy_pack(
    source: &ActorPack,
    target: &str,
    force: &BTreeSet<String>,
    resolver: &dyn VanillaResolver,
) -> Result<ActorPack> {
    if let Some(link) = force.iter().find(|l| !COPY_USERS.contains(&l.as_str())) {
        return Err(SyncError::UnknownLink(link.clone()));
    }
    let mut pack = source.clone();
    let renamed = pack.rename(target);

    for link in force {
        if pack.link(link) == target {
            continue;
        }
        let data = match pack.link(link) {
            DUMMY => None,
            _ => pack.link_data(link).map(<[u8]>::to_vec),
        };
        let data = match data {
            Some(data) => data,
            None => {
                let reference = resolver.fallback(link, source.name()).ok_or_else(|| {
                    SyncError::MissingEntry(format!("vanilla {link} for {}", source.name()))
                })?;
                let path = link_file_path(link, &reference)
                    .ok_or_else(|| SyncError::UnknownLink(link.clone()))?;
                pack.take_misc_file(&path)
                    .ok_or_else(|| SyncError::MissingEntry(path.clone()))?
            }
        };
        pack.set_link(link, target)?;
        pack.set_link_data(link, data);
        debug!(link = %link, target, "forced link onto copy");
    }

    info!(
        source = source.name(),
        target,
        renamed = renamed.len(),
        forced = force.len(),
        "copied actor pack"
    );
    Ok(pack)
}

/// Copy the index entry of `source` under `target`. With `bfres`, a record
/// that names a model is pointed at that model and sorted after the source.
pub fn copy_actor_info(
    index: &mut ActorInfoIndex,
    source: &str,
    target: &str,
    bfres: Option<&str>,
) -> Result<()> {
    if !index.copy_entry(source, target)? {
        return Err(SyncError::MissingEntry(format!("actor index entry {source}")));
    }
    let Some(bfres) = bfres else {
        return Ok(());
    };
    let Some(entry) = index.get_mut(target) else {
        return Ok(());
    };
    if entry.get("bfres").is_none() {
        return Ok(());
    }
    entry.insert("bfres", bfres);
    entry.insert("mainModel", target);
    if let Some(key) = entry.get("sortKey").and_then(Byml::as_int) {
        entry.insert("sortKey", key + 1);
    }
    Ok(())
}
