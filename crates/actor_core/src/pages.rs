//! Fixed-capacity page sets for game-state and save-state flags.
//!
//! Game-state pages are named `/{prefix}_{idx}.bgdata` and hold at most
//! [`GAMEDATA_PAGE_CAPACITY`] records under a single category key. Save-state
//! pages are named `/saveformat_{idx}.bgsvdata` and hold at most
//! [`SAVEDATA_PAGE_CAPACITY`] name/hash pairs; the last two save pages are
//! opaque and carried over byte for byte.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::archive::Archive;
use crate::byml::{self, Byml};
use crate::error::{Result, SyncError};
use crate::flag::{Flag, FlagKind};
use crate::reader::Endian;
use crate::store::{FlagStore, SAVE_FILE_NAME};

pub const GAMEDATA_PAGE_CAPACITY: usize = 4096;
pub const SAVEDATA_PAGE_CAPACITY: usize = 8192;
pub const GAMEDATA_EXT: &str = ".bgdata";
pub const SAVEDATA_EXT: &str = ".bgsvdata";
pub const SAVEDATA_PREFIX: &str = "saveformat";
pub const SAVE_REVISION: i32 = 18203;

/// Page prefix, the category it draws from, and which revival subset it takes.
pub const GAMEDATA_PREFIXES: [(&str, FlagKind, Option<bool>); 18] = [
    ("bool_array_data", FlagKind::BoolArray, None),
    ("bool_data", FlagKind::Bool, Some(false)),
    ("f32_array_data", FlagKind::F32Array, None),
    ("f32_data", FlagKind::F32, None),
    ("revival_bool_data", FlagKind::Bool, Some(true)),
    ("revival_s32_data", FlagKind::S32, Some(true)),
    ("s32_array_data", FlagKind::S32Array, None),
    ("s32_data", FlagKind::S32, Some(false)),
    ("string256_array_data", FlagKind::String256Array, None),
    ("string256_data", FlagKind::String256, None),
    ("string32_data", FlagKind::String32, None),
    ("string64_array_data", FlagKind::String64Array, None),
    ("string64_data", FlagKind::String64, None),
    ("vector2f_array_data", FlagKind::Vec2Array, None),
    ("vector2f_data", FlagKind::Vec2, None),
    ("vector3f_array_data", FlagKind::Vec3Array, None),
    ("vector3f_data", FlagKind::Vec3, None),
    ("vector4f_data", FlagKind::Vec4, None),
];

pub fn gamedata_source(prefix: &str) -> Option<(FlagKind, Option<bool>)> {
    GAMEDATA_PREFIXES
        .iter()
        .find(|(p, _, _)| *p == prefix)
        .map(|(_, kind, revival)| (*kind, *revival))
}

/// An encoded page. `name` starts with `/` and is appended to its directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub name: String,
    pub data: Vec<u8>,
}

impl FlagStore {
    /// Records for one game-state page prefix, or `None` for an unknown prefix.
    pub fn gamedata_records(&self, prefix: &str) -> Option<Vec<&Flag>> {
        let (kind, revival) = gamedata_source(prefix)?;
        Some(self.records(kind, revival))
    }
}

pub fn gamedata_page_name(prefix: &str, index: usize) -> String {
    format!("/{prefix}_{index}{GAMEDATA_EXT}")
}

pub fn savedata_page_name(index: usize) -> String {
    format!("/{SAVEDATA_PREFIX}_{index}{SAVEDATA_EXT}")
}

/// Encode every non-empty category into pages, in prefix order.
pub fn write_gamedata(store: &FlagStore, endian: Endian) -> Result<Vec<Page>> {
    let mut pages = Vec::new();
    for (prefix, kind, revival) in GAMEDATA_PREFIXES {
        let records = store.records(kind, revival);
        for (index, chunk) in records.chunks(GAMEDATA_PAGE_CAPACITY).enumerate() {
            let encoded = chunk.iter().map(|f| f.to_encoded()).collect();
            let mut root = Byml::new_hash();
            root.insert(kind.category(), Byml::Array(encoded));
            pages.push(Page {
                name: gamedata_page_name(prefix, index),
                data: byml::to_binary(&root, endian)?,
            });
        }
        if !records.is_empty() {
            debug!(prefix, records = records.len(), "paginated game-state flags");
        }
    }
    info!(pages = pages.len(), "encoded game-state pages");
    Ok(pages)
}

fn save_file_header() -> Byml {
    let mut header = Byml::new_hash();
    header.insert("IsCommon", false);
    header.insert("IsCommonAtSameAccount", false);
    header.insert("IsSaveSecureCode", true);
    header.insert("file_name", SAVE_FILE_NAME);
    header
}

/// Encode the persistent flags into save-format pages, followed by the two
/// opaque `tail` pages unchanged.
pub fn write_savedata(store: &FlagStore, endian: Endian, tail: &[Vec<u8>; 2]) -> Result<Vec<Page>> {
    let records = store.savedata_records();
    let chunks: Vec<&[&Flag]> = records.chunks(SAVEDATA_PAGE_CAPACITY).collect();
    let directory_num = i32::try_from(chunks.len() + 2)
        .map_err(|_| SyncError::MalformedDocument("too many save-format pages".to_string()))?;

    let mut save_info = Byml::new_hash();
    save_info.insert("directory_num", directory_num);
    save_info.insert("is_build_machine", true);
    save_info.insert("revision", SAVE_REVISION);

    let mut pages = Vec::with_capacity(chunks.len() + 2);
    for (index, chunk) in chunks.iter().enumerate() {
        let encoded = chunk.iter().map(|f| f.to_save_encoded()).collect();
        let mut root = Byml::new_hash();
        root.insert(
            "file_list",
            Byml::Array(vec![save_file_header(), Byml::Array(encoded)]),
        );
        root.insert("save_info", Byml::Array(vec![save_info.clone()]));
        pages.push(Page {
            name: savedata_page_name(index),
            data: byml::to_binary(&root, endian)?,
        });
    }
    let n = pages.len();
    for (offset, data) in tail.iter().enumerate() {
        pages.push(Page {
            name: savedata_page_name(n + offset),
            data: data.clone(),
        });
    }
    info!(records = records.len(), pages = pages.len(), "encoded save-state pages");
    Ok(pages)
}

/// Index of a page named `{prefix}_{idx}{ext}` (with or without a directory).
fn page_index<'a>(path: &'a str, ext: &str) -> Option<(&'a str, usize)> {
    let file = path.rsplit('/').next()?;
    let stem = file.strip_suffix(ext)?;
    let (prefix, index) = stem.rsplit_once('_')?;
    Some((prefix, index.parse().ok()?))
}

/// Indices must be exactly `0..n`.
pub fn validate_page_indices(prefix: &str, indices: &[usize]) -> Result<()> {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    for (expected, actual) in sorted.iter().enumerate() {
        if *actual != expected {
            return Err(SyncError::MissingPage(format!(
                "{prefix}: expected page {expected}, found {actual}"
            )));
        }
    }
    Ok(())
}

/// Group the page entries under `dir` by prefix and check each group is contiguous.
fn collect_pages<A: Archive + ?Sized>(
    archive: &A,
    dir: &str,
    ext: &str,
) -> Result<BTreeMap<String, Vec<(usize, String)>>> {
    let mut groups: BTreeMap<String, Vec<(usize, String)>> = BTreeMap::new();
    for path in archive.entries_under(dir) {
        if let Some((prefix, index)) = page_index(&path, ext) {
            groups
                .entry(prefix.to_string())
                .or_default()
                .push((index, path.clone()));
        }
    }
    for (prefix, pages) in &mut groups {
        pages.sort();
        let indices: Vec<usize> = pages.iter().map(|(i, _)| *i).collect();
        validate_page_indices(prefix, &indices)?;
    }
    Ok(groups)
}

/// Decode every game-state page under `dir` into a fresh store.
pub fn load_gamedata<A: Archive + ?Sized>(archive: &A, dir: &str) -> Result<FlagStore> {
    let mut store = FlagStore::new();
    for (prefix, pages) in collect_pages(archive, dir, GAMEDATA_EXT)? {
        let Some((_, revival)) = gamedata_source(&prefix) else {
            return Err(SyncError::MalformedDocument(format!(
                "unknown game-state page prefix {prefix}"
            )));
        };
        let is_revival = revival == Some(true);
        for (_, path) in pages {
            let bytes = archive
                .get(&path)
                .ok_or_else(|| SyncError::MissingPage(path.clone()))?;
            let doc = byml::from_binary(bytes)?;
            // The first page holding a hash keeps it.
            store.ingest_page(&path, &doc, is_revival, false)?;
        }
    }
    store.reset_changes();
    debug!(dir, flags = store.total_len(), "loaded game-state pages");
    Ok(store)
}

/// The two opaque pages that end the save-state page set under `dir`.
pub fn last_two_savedata_pages<A: Archive + ?Sized>(archive: &A, dir: &str) -> Result<[Vec<u8>; 2]> {
    let groups = collect_pages(archive, dir, SAVEDATA_EXT)?;
    let pages = groups
        .get(SAVEDATA_PREFIX)
        .ok_or_else(|| SyncError::MissingPage(format!("{dir}{}", savedata_page_name(0))))?;
    let exists = |i: usize| pages.iter().any(|(idx, _)| *idx == i);
    let Some(first) = (0..pages.len()).find(|&i| exists(i) && !exists(i + 2)) else {
        return Err(SyncError::MissingPage(format!("{dir}: save-format tail")));
    };
    let read = |i: usize| {
        let path = format!("{dir}{}", savedata_page_name(i));
        archive
            .get(&path)
            .map(<[u8]>::to_vec)
            .ok_or(SyncError::MissingPage(path))
    };
    Ok([read(first)?, read(first + 1)?])
}

/// Drop the existing pages under `dir` with extension `ext`, then write `pages`.
pub fn replace_pages<A: Archive + ?Sized>(archive: &mut A, dir: &str, ext: &str, pages: &[Page]) {
    for path in archive.entries_under(dir) {
        if path.ends_with(ext) {
            archive.remove(&path);
        }
    }
    for page in pages {
        archive.set(&format!("{dir}{}", page.name), page.data.clone());
    }
}
