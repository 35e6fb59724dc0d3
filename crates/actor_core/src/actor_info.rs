//! The actor metadata index: a sorted hash array with an index-aligned record array.

use std::collections::BTreeMap;

use tracing::debug;

use crate::byml::Byml;
use crate::error::{Result, SyncError};
use crate::hash::unsigned_hash_of;

const KEY_ACTORS: &str = "Actors";
const KEY_HASHES: &str = "Hashes";
const KEY_NAME: &str = "name";

/// Hashes are compared as raw unsigned bit patterns. `Hashes[i]` is always the
/// hash of `Actors[i]["name"]` and the hash array is strictly ascending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActorInfoIndex {
    hashes: Vec<u32>,
    actors: Vec<Byml>,
    extra: BTreeMap<String, Byml>,
}

impl ActorInfoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(doc: &Byml) -> Result<Self> {
        let root = doc
            .as_hash()
            .ok_or_else(|| SyncError::MalformedIndex("root is not a hash".to_string()))?;
        let hashes = root
            .get(KEY_HASHES)
            .and_then(Byml::as_array)
            .ok_or_else(|| SyncError::MalformedIndex(format!("{KEY_HASHES} array missing")))?;
        let actors = root
            .get(KEY_ACTORS)
            .and_then(Byml::as_array)
            .ok_or_else(|| SyncError::MalformedIndex(format!("{KEY_ACTORS} array missing")))?;
        if hashes.len() != actors.len() {
            return Err(SyncError::MalformedIndex(format!(
                "{} hashes for {} actors",
                hashes.len(),
                actors.len()
            )));
        }

        let hashes = hashes
            .iter()
            .enumerate()
            .map(|(i, node)| match node {
                Byml::Int(v) => Ok(*v as u32),
                Byml::UInt(v) => Ok(*v),
                other => Err(SyncError::MalformedIndex(format!(
                    "hash {i} is {}, not an integer",
                    other.type_name()
                ))),
            })
            .collect::<Result<Vec<u32>>>()?;

        let extra = root
            .iter()
            .filter(|(k, _)| k.as_str() != KEY_HASHES && k.as_str() != KEY_ACTORS)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let index = Self {
            hashes,
            actors: actors.to_vec(),
            extra,
        };
        index.validate()?;
        debug!(actors = index.len(), "loaded actor index");
        Ok(index)
    }

    /// Hashes above `i32::MAX` are written as unsigned values, the rest as signed.
    pub fn to_document(&self) -> Byml {
        let hashes = self
            .hashes
            .iter()
            .map(|&h| {
                if h > i32::MAX as u32 {
                    Byml::UInt(h)
                } else {
                    Byml::Int(h as i32)
                }
            })
            .collect();
        let mut root = self.extra.clone();
        root.insert(KEY_HASHES.to_string(), Byml::Array(hashes));
        root.insert(KEY_ACTORS.to_string(), Byml::Array(self.actors.clone()));
        Byml::Hash(root)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hashes.len() != self.actors.len() {
            return Err(SyncError::MalformedIndex(format!(
                "{} hashes for {} actors",
                self.hashes.len(),
                self.actors.len()
            )));
        }
        for (i, pair) in self.hashes.windows(2).enumerate() {
            if pair[0] >= pair[1] {
                return Err(SyncError::MalformedIndex(format!(
                    "hashes not strictly ascending at {}: {:#010x} then {:#010x}",
                    i + 1,
                    pair[0],
                    pair[1]
                )));
            }
        }
        for (i, (hash, actor)) in self.hashes.iter().zip(&self.actors).enumerate() {
            let name = actor.get(KEY_NAME).and_then(Byml::as_str).ok_or_else(|| {
                SyncError::MalformedIndex(format!("actor {i} has no string {KEY_NAME}"))
            })?;
            if unsigned_hash_of(name) != *hash {
                return Err(SyncError::MalformedIndex(format!(
                    "actor {i} ({name}) is stored under hash {hash:#010x}"
                )));
            }
        }
        Ok(())
    }

    pub fn find_position(&self, hash: u32) -> Option<usize> {
        self.hashes.binary_search(&hash).ok()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find_position(unsigned_hash_of(name)).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Byml> {
        self.find_position(unsigned_hash_of(name))
            .map(|i| &self.actors[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Byml> {
        self.find_position(unsigned_hash_of(name))
            .map(|i| &mut self.actors[i])
    }

    /// Replace the record stored for `name`, or insert it at its sorted position.
    /// The record's `name` field is forced to `name`. Returns the record's index.
    pub fn insert_or_replace(&mut self, name: &str, mut record: Byml) -> Result<usize> {
        if !record.insert(KEY_NAME, name) {
            return Err(SyncError::MalformedIndex(format!(
                "record for {name} is {}, not a hash",
                record.type_name()
            )));
        }
        let hash = unsigned_hash_of(name);
        match self.hashes.binary_search(&hash) {
            Ok(i) => {
                self.actors[i] = record;
                Ok(i)
            }
            Err(i) => {
                self.hashes.insert(i, hash);
                self.actors.insert(i, record);
                debug!(name, index = i, "inserted actor index entry");
                Ok(i)
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Byml> {
        let i = self.find_position(unsigned_hash_of(name))?;
        self.hashes.remove(i);
        Some(self.actors.remove(i))
    }

    /// Deep-copy `source`'s record under `target`. Returns false when `source` is absent.
    pub fn copy_entry(&mut self, source: &str, target: &str) -> Result<bool> {
        let Some(record) = self.get(source).cloned() else {
            return Ok(false);
        };
        self.insert_or_replace(target, record)?;
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn hashes(&self) -> &[u32] {
        &self.hashes
    }

    pub fn actors(&self) -> &[Byml] {
        &self.actors
    }
}
