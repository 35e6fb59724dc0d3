//! Typed key-value documents and their binary (BYML v2) encoding.
//!
//! Flag pages, save-format pages and the actor index are all stored as these
//! documents. Hash keys are kept in a `BTreeMap` because the binary format
//! requires keys in sorted byte order.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Cursor};

use crate::error::{Result, SyncError};
use crate::reader::{ByteReader, Endian};

const NODE_STRING: u8 = 0xA0;
const NODE_ARRAY: u8 = 0xC0;
const NODE_HASH: u8 = 0xC1;
const NODE_STRING_TABLE: u8 = 0xC2;
const NODE_BOOL: u8 = 0xD0;
const NODE_INT: u8 = 0xD1;
const NODE_FLOAT: u8 = 0xD2;
const NODE_UINT: u8 = 0xD3;
const NODE_NULL: u8 = 0xFF;

const HEADER_LEN: usize = 16;
const VERSION: u16 = 2;
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Byml {
    Null,
    Bool(bool),
    Int(i32),
    UInt(u32),
    Float(f32),
    String(String),
    Array(Vec<Byml>),
    Hash(BTreeMap<String, Byml>),
}

impl Byml {
    pub fn new_hash() -> Self {
        Byml::Hash(BTreeMap::new())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Byml::Null => "null",
            Byml::Bool(_) => "bool",
            Byml::Int(_) => "int",
            Byml::UInt(_) => "uint",
            Byml::Float(_) => "float",
            Byml::String(_) => "string",
            Byml::Array(_) => "array",
            Byml::Hash(_) => "hash",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Byml::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Byml::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u32> {
        match self {
            Byml::UInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Byml::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Byml::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Byml]> {
        match self {
            Byml::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_hash(&self) -> Option<&BTreeMap<String, Byml>> {
        match self {
            Byml::Hash(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_hash_mut(&mut self) -> Option<&mut BTreeMap<String, Byml>> {
        match self {
            Byml::Hash(v) => Some(v),
            _ => None,
        }
    }

    /// Look up `key` when this node is a hash.
    pub fn get(&self, key: &str) -> Option<&Byml> {
        self.as_hash().and_then(|h| h.get(key))
    }

    /// Insert into a hash node. Returns false for non-hash nodes.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Byml>) -> bool {
        match self.as_hash_mut() {
            Some(h) => {
                h.insert(key.into(), value.into());
                true
            }
            None => false,
        }
    }

    fn is_container(&self) -> bool {
        matches!(self, Byml::Array(_) | Byml::Hash(_))
    }

    fn node_type(&self) -> u8 {
        match self {
            Byml::Null => NODE_NULL,
            Byml::Bool(_) => NODE_BOOL,
            Byml::Int(_) => NODE_INT,
            Byml::UInt(_) => NODE_UINT,
            Byml::Float(_) => NODE_FLOAT,
            Byml::String(_) => NODE_STRING,
            Byml::Array(_) => NODE_ARRAY,
            Byml::Hash(_) => NODE_HASH,
        }
    }
}

impl From<bool> for Byml {
    fn from(v: bool) -> Self {
        Byml::Bool(v)
    }
}

impl From<i32> for Byml {
    fn from(v: i32) -> Self {
        Byml::Int(v)
    }
}

impl From<u32> for Byml {
    fn from(v: u32) -> Self {
        Byml::UInt(v)
    }
}

impl From<f32> for Byml {
    fn from(v: f32) -> Self {
        Byml::Float(v)
    }
}

impl From<&str> for Byml {
    fn from(v: &str) -> Self {
        Byml::String(v.to_string())
    }
}

impl From<String> for Byml {
    fn from(v: String) -> Self {
        Byml::String(v)
    }
}

impl From<Vec<Byml>> for Byml {
    fn from(v: Vec<Byml>) -> Self {
        Byml::Array(v)
    }
}

impl From<BTreeMap<String, Byml>> for Byml {
    fn from(v: BTreeMap<String, Byml>) -> Self {
        Byml::Hash(v)
    }
}

/// Encode a document. The root must be an array or a hash.
pub fn to_binary(root: &Byml, endian: Endian) -> Result<Vec<u8>> {
    if !root.is_container() {
        return Err(SyncError::MalformedDocument(format!(
            "root node must be an array or hash, got {}",
            root.type_name()
        )));
    }

    let mut keys = BTreeSet::new();
    let mut strings = BTreeSet::new();
    collect_strings(root, &mut keys, &mut strings);

    let mut writer = Writer {
        buf: Vec::with_capacity(HEADER_LEN),
        endian,
        keys: keys.into_iter().collect(),
        strings: strings.into_iter().collect(),
    };

    writer
        .buf
        .extend_from_slice(if endian.is_big() { b"BY" } else { b"YB" });
    writer.put_u16(VERSION);
    writer.put_u32(0);
    writer.put_u32(0);
    writer.put_u32(0);

    if !writer.keys.is_empty() {
        let table = writer.keys.clone();
        let offset = writer.write_string_table(&table)?;
        writer.patch_u32(4, offset);
    }
    if !writer.strings.is_empty() {
        let table = writer.strings.clone();
        let offset = writer.write_string_table(&table)?;
        writer.patch_u32(8, offset);
    }
    let root_offset = writer.write_container(root)?;
    writer.patch_u32(12, root_offset);

    Ok(writer.buf)
}

/// Decode a document, detecting byte order from the magic.
pub fn from_binary(bytes: &[u8]) -> Result<Byml> {
    decode(bytes).map_err(|e| SyncError::MalformedDocument(e.to_string()))
}

/// Byte order recorded in an encoded document's magic, if it has one.
pub fn detect_endian(bytes: &[u8]) -> Option<Endian> {
    match bytes.get(0..2) {
        Some(b"BY") => Some(Endian::Big),
        Some(b"YB") => Some(Endian::Little),
        _ => None,
    }
}

fn collect_strings<'a>(
    node: &'a Byml,
    keys: &mut BTreeSet<&'a str>,
    strings: &mut BTreeSet<&'a str>,
) {
    match node {
        Byml::String(s) => {
            strings.insert(s);
        }
        Byml::Array(items) => {
            for item in items {
                collect_strings(item, keys, strings);
            }
        }
        Byml::Hash(map) => {
            for (k, v) in map {
                keys.insert(k);
                collect_strings(v, keys, strings);
            }
        }
        _ => {}
    }
}

struct Writer<'a> {
    buf: Vec<u8>,
    endian: Endian,
    keys: Vec<&'a str>,
    strings: Vec<&'a str>,
}

impl Writer<'_> {
    fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn put_u16(&mut self, v: u16) {
        let b = self.endian.u16_bytes(v);
        self.buf.extend_from_slice(&b);
    }

    fn put_u24(&mut self, v: u32) {
        let b = self.endian.u24_bytes(v);
        self.buf.extend_from_slice(&b);
    }

    fn put_u32(&mut self, v: u32) {
        let b = self.endian.u32_bytes(v);
        self.buf.extend_from_slice(&b);
    }

    fn patch_u32(&mut self, at: usize, v: u32) {
        let b = self.endian.u32_bytes(v);
        self.buf[at..at + 4].copy_from_slice(&b);
    }

    fn align4(&mut self) {
        while self.buf.len() % 4 != 0 {
            self.buf.push(0);
        }
    }

    fn offset(&self) -> Result<u32> {
        u32::try_from(self.buf.len())
            .map_err(|_| SyncError::MalformedDocument("document exceeds 4 GiB".to_string()))
    }

    fn count(len: usize) -> Result<u32> {
        if len > 0x00FF_FFFF {
            return Err(SyncError::MalformedDocument(format!(
                "container with {len} entries exceeds the 24-bit count limit"
            )));
        }
        Ok(len as u32)
    }

    fn write_string_table(&mut self, table: &[&str]) -> Result<u32> {
        self.align4();
        let start = self.buf.len();
        let start_offset = self.offset()?;
        self.put_u8(NODE_STRING_TABLE);
        self.put_u24(Self::count(table.len())?);

        let slots = self.buf.len();
        for _ in 0..=table.len() {
            self.put_u32(0);
        }
        for (i, s) in table.iter().enumerate() {
            let rel = (self.buf.len() - start) as u32;
            self.patch_u32(slots + i * 4, rel);
            self.buf.extend_from_slice(s.as_bytes());
            self.buf.push(0);
        }
        let end = (self.buf.len() - start) as u32;
        self.patch_u32(slots + table.len() * 4, end);
        self.align4();
        Ok(start_offset)
    }

    fn inline_value(&self, node: &Byml) -> Result<u32> {
        Ok(match node {
            Byml::Null => 0,
            Byml::Bool(v) => u32::from(*v),
            Byml::Int(v) => *v as u32,
            Byml::UInt(v) => *v,
            Byml::Float(v) => v.to_bits(),
            Byml::String(s) => self.string_index(s)?,
            Byml::Array(_) | Byml::Hash(_) => 0,
        })
    }

    fn string_index(&self, s: &str) -> Result<u32> {
        self.strings
            .binary_search(&s)
            .map(|i| i as u32)
            .map_err(|_| SyncError::MalformedDocument(format!("string {s:?} missing from table")))
    }

    fn key_index(&self, key: &str) -> Result<u32> {
        self.keys
            .binary_search(&key)
            .map(|i| i as u32)
            .map_err(|_| SyncError::MalformedDocument(format!("key {key:?} missing from table")))
    }

    fn write_container(&mut self, node: &Byml) -> Result<u32> {
        self.align4();
        let start = self.offset()?;
        let mut pending: Vec<(usize, &Byml)> = Vec::new();

        match node {
            Byml::Array(items) => {
                self.put_u8(NODE_ARRAY);
                self.put_u24(Self::count(items.len())?);
                for item in items {
                    self.put_u8(item.node_type());
                }
                self.align4();
                for item in items {
                    if item.is_container() {
                        pending.push((self.buf.len(), item));
                    }
                    let value = self.inline_value(item)?;
                    self.put_u32(value);
                }
            }
            Byml::Hash(map) => {
                self.put_u8(NODE_HASH);
                self.put_u24(Self::count(map.len())?);
                for (key, value) in map {
                    let index = self.key_index(key)?;
                    self.put_u24(index);
                    self.put_u8(value.node_type());
                    if value.is_container() {
                        pending.push((self.buf.len(), value));
                    }
                    let raw = self.inline_value(value)?;
                    self.put_u32(raw);
                }
            }
            other => {
                return Err(SyncError::MalformedDocument(format!(
                    "{} is not a container node",
                    other.type_name()
                )));
            }
        }

        for (slot, child) in pending {
            let child_offset = self.write_container(child)?;
            self.patch_u32(slot, child_offset);
        }
        Ok(start)
    }
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

fn decode(bytes: &[u8]) -> io::Result<Byml> {
    if bytes.len() < HEADER_LEN {
        return Err(invalid(format!(
            "document is {} bytes, shorter than its header",
            bytes.len()
        )));
    }
    let endian = detect_endian(bytes).ok_or_else(|| invalid("bad magic"))?;
    let mut r = ByteReader::new(Cursor::new(bytes), endian);
    r.seek_to(2)?;
    let version = r.read_u16()?;
    if !(1..=4).contains(&version) {
        return Err(invalid(format!("unsupported version {version}")));
    }
    let key_table = r.read_u32()?;
    let string_table = r.read_u32()?;
    let root = r.read_u32()?;

    let keys = read_string_table(&mut r, key_table)?;
    let strings = read_string_table(&mut r, string_table)?;
    if root == 0 {
        return Ok(Byml::new_hash());
    }

    // Each encoded value takes at least five bytes, so a document that yields
    // more values than it has bytes is reusing nodes to expand itself.
    let mut decoder = Decoder {
        r,
        keys,
        strings,
        budget: bytes.len(),
    };
    decoder.read_container(root, 0)
}

fn read_string_table(r: &mut ByteReader<Cursor<&[u8]>>, offset: u32) -> io::Result<Vec<String>> {
    if offset == 0 {
        return Ok(Vec::new());
    }
    let base = u64::from(offset);
    r.seek_to(base)?;
    let node = r.read_u8()?;
    if node != NODE_STRING_TABLE {
        return Err(invalid(format!(
            "expected string table at {offset:#x}, found node {node:#04x}"
        )));
    }
    let count = r.read_u24()? as usize;
    let mut offsets = Vec::with_capacity(count);
    for _ in 0..count {
        offsets.push(r.read_u32()?);
    }
    let mut out = Vec::with_capacity(count);
    for rel in offsets {
        r.seek_to(base + u64::from(rel))?;
        out.push(r.read_null_terminated_string()?);
    }
    Ok(out)
}

struct Decoder<'a> {
    r: ByteReader<Cursor<&'a [u8]>>,
    keys: Vec<String>,
    strings: Vec<String>,
    budget: usize,
}

impl Decoder<'_> {
    fn read_container(&mut self, offset: u32, depth: usize) -> io::Result<Byml> {
        if depth > MAX_DEPTH {
            return Err(invalid("container nesting too deep"));
        }
        let base = u64::from(offset);
        self.r.seek_to(base)?;
        let node = self.r.read_u8()?;
        let count = self.r.read_u24()? as usize;

        match node {
            NODE_ARRAY => {
                let types = self.r.read_bytes(count)?;
                let values_at = base + 4 + (count as u64).next_multiple_of(4);
                let mut items = Vec::with_capacity(count);
                for (i, ty) in types.into_iter().enumerate() {
                    self.r.seek_to(values_at + 4 * i as u64)?;
                    let raw = self.r.read_u32()?;
                    items.push(self.read_value(ty, raw, depth)?);
                }
                Ok(Byml::Array(items))
            }
            NODE_HASH => {
                let mut map = BTreeMap::new();
                for i in 0..count {
                    self.r.seek_to(base + 4 + 8 * i as u64)?;
                    let key_index = self.r.read_u24()? as usize;
                    let ty = self.r.read_u8()?;
                    let raw = self.r.read_u32()?;
                    let key = self
                        .keys
                        .get(key_index)
                        .cloned()
                        .ok_or_else(|| invalid(format!("key index {key_index} out of range")))?;
                    let value = self.read_value(ty, raw, depth)?;
                    map.insert(key, value);
                }
                Ok(Byml::Hash(map))
            }
            other => Err(invalid(format!(
                "expected container at {offset:#x}, found node {other:#04x}"
            ))),
        }
    }

    fn read_value(&mut self, ty: u8, raw: u32, depth: usize) -> io::Result<Byml> {
        self.budget = self
            .budget
            .checked_sub(1)
            .ok_or_else(|| invalid("document expands past its node budget"))?;
        Ok(match ty {
            NODE_STRING => Byml::String(
                self.strings
                    .get(raw as usize)
                    .cloned()
                    .ok_or_else(|| invalid(format!("string index {raw} out of range")))?,
            ),
            NODE_ARRAY | NODE_HASH => self.read_container(raw, depth + 1)?,
            NODE_BOOL => Byml::Bool(raw != 0),
            NODE_INT => Byml::Int(raw as i32),
            NODE_FLOAT => Byml::Float(f32::from_bits(raw)),
            NODE_UINT => Byml::UInt(raw),
            NODE_NULL => Byml::Null,
            other => return Err(invalid(format!("unsupported node type {other:#04x}"))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_table_offsets_are_relative_to_node() {
        let mut root = Byml::new_hash();
        root.insert("a", "x");
        let bytes = to_binary(&root, Endian::Big).expect("encode");
        // header(16) then key table at 16: type, count(1), two offsets
        assert_eq!(&bytes[0..2], b"BY");
        assert_eq!(bytes[16], NODE_STRING_TABLE);
        assert_eq!(&bytes[17..20], &[0, 0, 1]);
        assert_eq!(&bytes[20..24], &12u32.to_be_bytes());
    }

    #[test]
    fn shared_nodes_cannot_expand_without_bound() {
        // 40 arrays, each holding the next one twice.
        const LINKS: u32 = 40;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"YB");
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&16u32.to_le_bytes());
        for i in 0..LINKS {
            let next = 16 + 16 * (i + 1);
            bytes.extend_from_slice(&[NODE_ARRAY, 2, 0, 0, NODE_ARRAY, NODE_ARRAY, 0, 0]);
            bytes.extend_from_slice(&next.to_le_bytes());
            bytes.extend_from_slice(&next.to_le_bytes());
        }
        bytes.extend_from_slice(&[NODE_ARRAY, 0, 0, 0]);

        let err = from_binary(&bytes).expect_err("expansion is refused");
        assert!(err.to_string().contains("node budget"));
    }

    #[test]
    fn rejects_scalar_root() {
        assert!(to_binary(&Byml::Int(1), Endian::Little).is_err());
    }
}
