//! File containers holding actor packs, flag pages and the actor index.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

/// Separator between an outer container path and a path inside it.
pub const NESTED_SEPARATOR: &str = "//";

/// Directory names on disk that stand for a nested container.
pub const CONTAINER_EXTS: [&str; 4] = [".pack", ".sbactorpack", ".sarc", ".ssarc"];

pub trait Archive {
    fn get(&self, path: &str) -> Option<&[u8]>;
    fn set(&mut self, path: &str, data: Vec<u8>);
    fn remove(&mut self, path: &str) -> Option<Vec<u8>>;
    fn entries(&self) -> Vec<String>;

    fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Entry paths below `dir` (exclusive of the trailing slash), sorted.
    fn entries_under(&self, dir: &str) -> Vec<String> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.entries()
            .into_iter()
            .filter(|e| e.starts_with(&prefix))
            .collect()
    }
}

/// A path like `Pack/TitleBG.pack//Actor/Pack/Npc_A.sbactorpack`, split into
/// the container chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedPath {
    pub outer: Vec<String>,
    pub inner: String,
}

impl NestedPath {
    pub fn parse(path: &str) -> Self {
        let mut parts: Vec<String> = path
            .split(NESTED_SEPARATOR)
            .map(|p| p.trim_start_matches('/').to_string())
            .collect();
        let inner = parts.pop().unwrap_or_default();
        Self {
            outer: parts,
            inner,
        }
    }

    pub fn is_nested(&self) -> bool {
        !self.outer.is_empty()
    }

    pub fn join(&self) -> String {
        let mut parts = self.outer.clone();
        parts.push(self.inner.clone());
        parts.join(NESTED_SEPARATOR)
    }
}

/// Flat map of path to bytes. Nested paths are stored under their full joined
/// form, so a nested container is modelled as a directory prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryArchive {
    files: BTreeMap<String, Vec<u8>>,
    removed: BTreeSet<String>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Read every file below `root`. Paths use `/` and are relative to `root`.
    pub fn load_dir(root: &Path) -> io::Result<Self> {
        let mut archive = Self::new();
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                if entry.file_type()?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let relative = path
                    .strip_prefix(root)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
                archive
                    .files
                    .insert(archive_key(relative), fs::read(&path)?);
            }
        }
        debug!(root = %root.display(), files = archive.len(), "loaded archive directory");
        Ok(archive)
    }

    /// Write every file below `root`, creating directories as needed, and
    /// delete files removed since loading. Nested separators become plain
    /// directory separators on disk.
    pub fn write_dir(&self, root: &Path) -> io::Result<()> {
        for key in &self.removed {
            let path = root.join(key.replace(NESTED_SEPARATOR, "/"));
            if path.is_file() {
                fs::remove_file(&path)?;
            }
        }
        for (key, data) in &self.files {
            let path = root.join(key.replace(NESTED_SEPARATOR, "/"));
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, data)?;
        }
        Ok(())
    }
}

/// Archive key for a relative path on disk. A directory named like a container
/// opens a nested path.
fn archive_key(relative: &Path) -> String {
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let mut key = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            let parent = &parts[i - 1];
            if CONTAINER_EXTS.iter().any(|ext| parent.ends_with(ext)) {
                key.push_str(NESTED_SEPARATOR);
            } else {
                key.push('/');
            }
        }
        key.push_str(part);
    }
    key
}

impl Archive for MemoryArchive {
    fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    fn set(&mut self, path: &str, data: Vec<u8>) {
        self.removed.remove(path);
        self.files.insert(path.to_string(), data);
    }

    fn remove(&mut self, path: &str) -> Option<Vec<u8>> {
        let data = self.files.remove(path)?;
        self.removed.insert(path.to_string());
        Some(data)
    }

    fn entries(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_path_splits_containers() {
        let path = NestedPath::parse("Pack/TitleBG.pack//Actor/Pack/Npc_A.sbactorpack");
        assert_eq!(path.outer, vec!["Pack/TitleBG.pack".to_string()]);
        assert_eq!(path.inner, "Actor/Pack/Npc_A.sbactorpack");
        assert!(path.is_nested());
        assert_eq!(path.join(), "Pack/TitleBG.pack//Actor/Pack/Npc_A.sbactorpack");

        let flat = NestedPath::parse("Actor/ActorInfo.product.byml");
        assert!(!flat.is_nested());
    }

    #[test]
    fn container_directories_open_nested_paths() {
        let key = archive_key(Path::new("Actor/Pack/Npc_A.sbactorpack/Actor/ActorLink/Npc_A.bxml"));
        assert_eq!(key, "Actor/Pack/Npc_A.sbactorpack//Actor/ActorLink/Npc_A.bxml");
    }

    #[test]
    fn removal_is_remembered_until_rewritten() {
        let mut archive = MemoryArchive::new();
        archive.set("a", vec![1]);
        assert_eq!(archive.remove("a"), Some(vec![1]));
        assert!(archive.removed.contains("a"));
        archive.set("a", vec![2]);
        assert!(!archive.removed.contains("a"));
    }

    #[test]
    fn entries_under_filters_by_directory() {
        let mut archive = MemoryArchive::new();
        archive.set("GameData/gamedata/bool_data_0.bgdata", vec![1]);
        archive.set("GameData/gamedataX/other", vec![2]);
        assert_eq!(
            archive.entries_under("GameData/gamedata"),
            vec!["GameData/gamedata/bool_data_0.bgdata".to_string()]
        );
    }
}
