//! Revival flags for placed map objects.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::byml::Byml;
use crate::error::{Result, SyncError};
use crate::flag::{Flag, FlagKind};
use crate::hash::hash_of;
use crate::store::{ChangeCounts, FlagStore, SyncOutcome};

/// Objects whose config name contains one of these never get a flag.
pub const SKIPPED_OBJECTS: [&str; 3] = ["Area", "Sphere", "LinkTag"];

const REVIVAL_RESET_POLICY: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapObject {
    pub unit_config_name: String,
    pub hash_id: u32,
    pub no_flag: bool,
    pub links_to_obj: bool,
}

impl MapObject {
    pub fn from_byml(doc: &Byml) -> Result<Self> {
        let unit_config_name = doc
            .get("UnitConfigName")
            .and_then(Byml::as_str)
            .ok_or_else(|| SyncError::MalformedDocument("map object without UnitConfigName".into()))?
            .to_string();
        let hash_id = match doc.get("HashId") {
            Some(Byml::UInt(v)) => *v,
            Some(Byml::Int(v)) => *v as u32,
            _ => {
                return Err(SyncError::MalformedDocument(format!(
                    "map object {unit_config_name} without HashId"
                )));
            }
        };
        let no_flag = doc
            .get("!Parameters")
            .and_then(|p| p.get("NoFlag"))
            .and_then(Byml::as_bool)
            .unwrap_or(false);
        Ok(Self {
            unit_config_name,
            hash_id,
            no_flag,
            links_to_obj: doc.get("LinksToObj").is_some(),
        })
    }

    pub fn flag_name(&self) -> String {
        format!("MainField_{}_{}", self.unit_config_name, self.hash_id)
    }

    pub fn flag_hash(&self) -> i32 {
        hash_of(&self.flag_name())
    }

    pub fn is_skipped(&self) -> bool {
        SKIPPED_OBJECTS
            .iter()
            .any(|s| self.unit_config_name.contains(s))
    }

    pub fn revival_flag(&self) -> Flag {
        let mut flag = Flag::with_defaults(FlagKind::Bool, self.flag_name(), true);
        let header = flag.header_mut();
        header.is_event_associated = self.links_to_obj;
        header.is_persistent = true;
        header.reset_policy = REVIVAL_RESET_POLICY;
        flag
    }
}

/// The `Objs` array of a map unit document.
pub fn map_objects(doc: &Byml) -> Result<Vec<MapObject>> {
    doc.get("Objs")
        .and_then(Byml::as_array)
        .ok_or_else(|| SyncError::MalformedDocument("map unit without Objs".into()))?
        .iter()
        .map(MapObject::from_byml)
        .collect()
}

fn revive(store: &mut FlagStore, object: &MapObject, previous: &MapObject, tally: &mut ChangeCounts) {
    if object.no_flag {
        for hash in [previous.flag_hash(), object.flag_hash()] {
            if store.remove(FlagKind::Bool, hash) {
                tally.deleted += 1;
            }
        }
        return;
    }
    match store.sync(object.revival_flag(), &[previous.flag_hash()]) {
        SyncOutcome::Added => tally.new += 1,
        SyncOutcome::Modified => tally.modified += 1,
        SyncOutcome::Unchanged => {}
    }
}

/// Bring the revival flags in `store` in line with `objects`.
///
/// With a `stock` map, objects the stock map already has only get a new flag
/// when their name or event association changed, and stock objects missing
/// from `objects` lose theirs.
pub fn generate_revival_flags(
    store: &mut FlagStore,
    objects: &[MapObject],
    stock: Option<&[MapObject]>,
) -> ChangeCounts {
    let mut tally = ChangeCounts::default();
    let stock_by_id: BTreeMap<u32, &MapObject> = stock
        .unwrap_or_default()
        .iter()
        .map(|o| (o.hash_id, o))
        .collect();
    let kept: BTreeSet<i32> = objects.iter().map(MapObject::flag_hash).collect();

    for object in objects {
        if object.is_skipped() {
            continue;
        }
        match stock_by_id.get(&object.hash_id) {
            None => revive(store, object, object, &mut tally),
            Some(original) => {
                let renamed = object.unit_config_name != original.unit_config_name;
                let relinked = object.links_to_obj != original.links_to_obj;
                if renamed || relinked {
                    revive(store, object, original, &mut tally);
                }
            }
        }
    }

    if let Some(stock) = stock {
        let present: BTreeSet<u32> = objects.iter().map(|o| o.hash_id).collect();
        for original in stock.iter().filter(|o| !present.contains(&o.hash_id)) {
            let hash = original.flag_hash();
            if !kept.contains(&hash) && store.remove(FlagKind::Bool, hash) {
                tally.deleted += 1;
            }
        }
    }

    debug!(objects = objects.len(), "processed map objects");
    info!(
        new = tally.new,
        modified = tally.modified,
        deleted = tally.deleted,
        "generated revival flags"
    );
    tally
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(name: &str, id: u32) -> MapObject {
        MapObject {
            unit_config_name: name.to_string(),
            hash_id: id,
            no_flag: false,
            links_to_obj: false,
        }
    }

    #[test]
    fn skips_area_like_objects() {
        assert!(object("AreaObj", 1).is_skipped());
        assert!(object("LinkTagAnd", 1).is_skipped());
        assert!(!object("Obj_TreeApple_A_01", 1).is_skipped());
    }

    #[test]
    fn flag_name_uses_decimal_hash_id() {
        assert_eq!(object("Obj_Box", 3_000_000_000).flag_name(), "MainField_Obj_Box_3000000000");
    }
}
