//! Typed game-state flag records.
//!
//! A [`Flag`] is a shared [`FlagHeader`] plus one [`FlagValue`] payload. The
//! header's hash is derived from its name and can never be set on its own.

mod element;
mod kind;

use std::collections::BTreeMap;

use crate::byml::Byml;
use crate::error::{Result, SyncError};
use crate::hash::hash_of;
use crate::overrides::OverrideRuleSet;

pub(crate) use element::FlagElement;
pub use kind::FlagKind;

const KEY_CATEGORY: &str = "Category";
const KEY_NAME: &str = "DataName";
const KEY_DELETE_REV: &str = "DeleteRev";
const KEY_HASH: &str = "HashValue";
const KEY_INIT: &str = "InitValue";
const KEY_EVENT: &str = "IsEventAssociated";
const KEY_ONE_TRIGGER: &str = "IsOneTrigger";
const KEY_READABLE: &str = "IsProgramReadable";
const KEY_WRITABLE: &str = "IsProgramWritable";
const KEY_SAVE: &str = "IsSave";
const KEY_MAX: &str = "MaxValue";
const KEY_MIN: &str = "MinValue";
const KEY_RESET: &str = "ResetType";
const KEY_VALUES: &str = "Values";

const UNNAMED: &str = "<unnamed>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagHeader {
    name: String,
    hash: i32,
    pub delete_revision: i32,
    pub is_event_associated: bool,
    pub is_one_shot: bool,
    pub is_readable: bool,
    pub is_writable: bool,
    pub is_persistent: bool,
    pub reset_policy: i32,
}

impl FlagHeader {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            hash: hash_of(&name),
            name,
            delete_revision: -1,
            is_event_associated: false,
            is_one_shot: false,
            is_readable: true,
            is_writable: true,
            is_persistent: false,
            reset_policy: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash(&self) -> i32 {
        self.hash
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.hash = hash_of(&self.name);
    }
}

/// Scalar payload: initial value and inclusive bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounded<T> {
    pub init: T,
    pub max: T,
    pub min: T,
}

/// Array payload: a list of initial values sharing one pair of bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedArray<T> {
    pub init: Vec<T>,
    pub max: T,
    pub min: T,
}

fn bounded<T>(init: T, max: T, min: T) -> Bounded<T> {
    Bounded { init, max, min }
}

fn bounded_array<T>(init: T, max: T, min: T) -> BoundedArray<T> {
    BoundedArray {
        init: vec![init],
        max,
        min,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlagValue {
    Bool {
        category: Option<i32>,
        range: Bounded<bool>,
    },
    BoolArray(BoundedArray<bool>),
    S32(Bounded<i32>),
    S32Array(BoundedArray<i32>),
    F32(Bounded<f32>),
    F32Array(BoundedArray<f32>),
    String32(Bounded<String>),
    String64(Bounded<String>),
    String64Array(BoundedArray<String>),
    String256(Bounded<String>),
    String256Array(BoundedArray<String>),
    Vec2(Bounded<[f32; 2]>),
    Vec2Array(BoundedArray<[f32; 2]>),
    Vec3(Bounded<[f32; 3]>),
    Vec3Array(BoundedArray<[f32; 3]>),
    Vec4(Bounded<[f32; 4]>),
}

impl FlagValue {
    pub fn default_for(kind: FlagKind) -> Self {
        let empty = String::new;
        match kind {
            FlagKind::Bool => Self::Bool {
                category: None,
                range: bounded(false, true, false),
            },
            FlagKind::BoolArray => Self::BoolArray(bounded_array(false, true, false)),
            FlagKind::S32 => Self::S32(bounded(0, i32::MAX, 0)),
            FlagKind::S32Array => Self::S32Array(bounded_array(0, 6_553_500, -1)),
            FlagKind::F32 => Self::F32(bounded(0.0, 1_000_000.0, 0.0)),
            FlagKind::F32Array => Self::F32Array(bounded_array(0.0, 360.0, -1.0)),
            FlagKind::String32 => Self::String32(bounded(empty(), empty(), empty())),
            FlagKind::String64 => Self::String64(bounded(empty(), empty(), empty())),
            FlagKind::String64Array => {
                Self::String64Array(bounded_array(empty(), empty(), empty()))
            }
            FlagKind::String256 => Self::String256(bounded(empty(), empty(), empty())),
            FlagKind::String256Array => {
                Self::String256Array(bounded_array(empty(), empty(), empty()))
            }
            FlagKind::Vec2 => Self::Vec2(bounded([0.0; 2], [255.0; 2], [0.0; 2])),
            FlagKind::Vec2Array => Self::Vec2Array(bounded_array([0.0; 2], [255.0; 2], [0.0; 2])),
            FlagKind::Vec3 => Self::Vec3(bounded([0.0; 3], [100_000.0; 3], [-100_000.0; 3])),
            FlagKind::Vec3Array => {
                Self::Vec3Array(bounded_array([0.0; 3], [255.0; 3], [0.0; 3]))
            }
            FlagKind::Vec4 => Self::Vec4(bounded([0.0; 4], [255.0; 4], [0.0; 4])),
        }
    }

    pub fn kind(&self) -> FlagKind {
        match self {
            Self::Bool { .. } => FlagKind::Bool,
            Self::BoolArray(_) => FlagKind::BoolArray,
            Self::S32(_) => FlagKind::S32,
            Self::S32Array(_) => FlagKind::S32Array,
            Self::F32(_) => FlagKind::F32,
            Self::F32Array(_) => FlagKind::F32Array,
            Self::String32(_) => FlagKind::String32,
            Self::String64(_) => FlagKind::String64,
            Self::String64Array(_) => FlagKind::String64Array,
            Self::String256(_) => FlagKind::String256,
            Self::String256Array(_) => FlagKind::String256Array,
            Self::Vec2(_) => FlagKind::Vec2,
            Self::Vec2Array(_) => FlagKind::Vec2Array,
            Self::Vec3(_) => FlagKind::Vec3,
            Self::Vec3Array(_) => FlagKind::Vec3Array,
            Self::Vec4(_) => FlagKind::Vec4,
        }
    }

    fn decode(kind: FlagKind, name: &str, fields: &BTreeMap<String, Byml>) -> Result<Self> {
        let d = FieldDecoder { name, fields };
        Ok(match kind {
            FlagKind::Bool => Self::Bool {
                category: d.optional::<i32>(KEY_CATEGORY)?,
                range: d.scalar()?,
            },
            FlagKind::BoolArray => Self::BoolArray(d.array()?),
            FlagKind::S32 => Self::S32(d.scalar()?),
            FlagKind::S32Array => Self::S32Array(d.array()?),
            FlagKind::F32 => Self::F32(d.scalar()?),
            FlagKind::F32Array => Self::F32Array(d.array()?),
            FlagKind::String32 => Self::String32(d.scalar()?),
            FlagKind::String64 => Self::String64(d.scalar()?),
            FlagKind::String64Array => Self::String64Array(d.array()?),
            FlagKind::String256 => Self::String256(d.scalar()?),
            FlagKind::String256Array => Self::String256Array(d.array()?),
            FlagKind::Vec2 => Self::Vec2(d.scalar()?),
            FlagKind::Vec2Array => Self::Vec2Array(d.array()?),
            FlagKind::Vec3 => Self::Vec3(d.scalar()?),
            FlagKind::Vec3Array => Self::Vec3Array(d.array()?),
            FlagKind::Vec4 => Self::Vec4(d.scalar()?),
        })
    }

    fn encode_into(&self, out: &mut BTreeMap<String, Byml>) {
        match self {
            Self::Bool { category, range } => {
                if let Some(category) = category {
                    out.insert(KEY_CATEGORY.to_string(), Byml::Int(*category));
                }
                encode_scalar(range, out);
            }
            Self::BoolArray(v) => encode_array(v, out),
            Self::S32(v) => encode_scalar(v, out),
            Self::S32Array(v) => encode_array(v, out),
            Self::F32(v) => encode_scalar(v, out),
            Self::F32Array(v) => encode_array(v, out),
            Self::String32(v) | Self::String64(v) | Self::String256(v) => encode_scalar(v, out),
            Self::String64Array(v) | Self::String256Array(v) => encode_array(v, out),
            Self::Vec2(v) => encode_scalar(v, out),
            Self::Vec2Array(v) => encode_array(v, out),
            Self::Vec3(v) => encode_scalar(v, out),
            Self::Vec3Array(v) => encode_array(v, out),
            Self::Vec4(v) => encode_scalar(v, out),
        }
    }
}

fn encode_scalar<T: FlagElement>(range: &Bounded<T>, out: &mut BTreeMap<String, Byml>) {
    out.insert(KEY_INIT.to_string(), range.init.encode_init());
    out.insert(KEY_MAX.to_string(), range.max.encode());
    out.insert(KEY_MIN.to_string(), range.min.encode());
}

fn encode_array<T: FlagElement>(range: &BoundedArray<T>, out: &mut BTreeMap<String, Byml>) {
    let values = range.init.iter().map(FlagElement::encode_init).collect();
    let mut holder = BTreeMap::new();
    holder.insert(KEY_VALUES.to_string(), Byml::Array(values));
    out.insert(
        KEY_INIT.to_string(),
        Byml::Array(vec![Byml::Hash(holder)]),
    );
    out.insert(KEY_MAX.to_string(), range.max.encode());
    out.insert(KEY_MIN.to_string(), range.min.encode());
}

struct FieldDecoder<'a> {
    name: &'a str,
    fields: &'a BTreeMap<String, Byml>,
}

impl<'a> FieldDecoder<'a> {
    fn error(&self, key: &str, expected: &str, found: Option<&Byml>) -> SyncError {
        let found = found.map_or("nothing", Byml::type_name);
        SyncError::malformed(self.name, format!("{key} should be {expected}, found {found}"))
    }

    fn with<T>(&self, key: &str, expected: &str, f: impl Fn(&'a Byml) -> Option<T>) -> Result<T> {
        let node = self.fields.get(key);
        node.and_then(f)
            .ok_or_else(|| self.error(key, expected, node))
    }

    fn required<T: FlagElement>(&self, key: &str) -> Result<T> {
        self.with(key, T::SHAPE, T::decode)
    }

    fn optional<T: FlagElement>(&self, key: &str) -> Result<Option<T>> {
        match self.fields.get(key) {
            None => Ok(None),
            Some(node) => T::decode(node)
                .map(Some)
                .ok_or_else(|| self.error(key, T::SHAPE, Some(node))),
        }
    }

    fn scalar<T: FlagElement>(&self) -> Result<Bounded<T>> {
        Ok(Bounded {
            init: self.with(KEY_INIT, T::SHAPE, T::decode_init)?,
            max: self.required(KEY_MAX)?,
            min: self.required(KEY_MIN)?,
        })
    }

    fn array<T: FlagElement>(&self) -> Result<BoundedArray<T>> {
        let values = self.with(KEY_INIT, "[{Values: [...]}]", |node| {
            node.as_array()?.first()?.get(KEY_VALUES)?.as_array()
        })?;
        let init = values
            .iter()
            .map(T::decode_init)
            .collect::<Option<Vec<T>>>()
            .ok_or_else(|| {
                SyncError::malformed(
                    self.name,
                    format!("{KEY_INIT} values should all be {}", T::SHAPE),
                )
            })?;
        Ok(BoundedArray {
            init,
            max: self.required(KEY_MAX)?,
            min: self.required(KEY_MIN)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Flag {
    header: FlagHeader,
    value: FlagValue,
    revival: bool,
}

impl Flag {
    /// A flag of `kind` with every parameter at its default.
    pub fn new(kind: FlagKind, name: impl Into<String>) -> Self {
        Self::with_defaults(kind, name, false)
    }

    /// Like [`Flag::new`]; `is_revival` only sticks for bool and s32 flags.
    pub fn with_defaults(kind: FlagKind, name: impl Into<String>, is_revival: bool) -> Self {
        Self {
            header: FlagHeader::new(name),
            value: FlagValue::default_for(kind),
            revival: is_revival && kind.supports_revival(),
        }
    }

    /// Decode one record of `kind`. Any missing or mis-shaped field rejects the whole record.
    pub fn from_decoded(kind: FlagKind, doc: &Byml, is_revival: bool) -> Result<Self> {
        let fields = doc.as_hash().ok_or_else(|| {
            SyncError::malformed(UNNAMED, format!("record is {}, not a hash", doc.type_name()))
        })?;
        let name = fields
            .get(KEY_NAME)
            .and_then(Byml::as_str)
            .ok_or_else(|| SyncError::malformed(UNNAMED, format!("{KEY_NAME} missing")))?;
        let d = FieldDecoder { name, fields };

        let stored_hash: i32 = d.required(KEY_HASH)?;
        if stored_hash != hash_of(name) {
            return Err(SyncError::malformed(
                name,
                format!(
                    "{KEY_HASH} {stored_hash} does not match the name hash {}",
                    hash_of(name)
                ),
            ));
        }

        let header = FlagHeader {
            name: name.to_string(),
            hash: stored_hash,
            delete_revision: d.required(KEY_DELETE_REV)?,
            is_event_associated: d.required(KEY_EVENT)?,
            is_one_shot: d.required(KEY_ONE_TRIGGER)?,
            is_readable: d.required(KEY_READABLE)?,
            is_writable: d.required(KEY_WRITABLE)?,
            is_persistent: d.required(KEY_SAVE)?,
            reset_policy: d.required(KEY_RESET)?,
        };
        let value = FlagValue::decode(kind, name, fields)?;

        Ok(Self {
            header,
            value,
            revival: is_revival && kind.supports_revival(),
        })
    }

    pub fn to_encoded(&self) -> Byml {
        let h = &self.header;
        let mut out = BTreeMap::new();
        out.insert(KEY_NAME.to_string(), Byml::from(h.name.as_str()));
        out.insert(KEY_DELETE_REV.to_string(), Byml::Int(h.delete_revision));
        out.insert(KEY_HASH.to_string(), Byml::Int(hash_of(&h.name)));
        out.insert(KEY_EVENT.to_string(), Byml::Bool(h.is_event_associated));
        out.insert(KEY_ONE_TRIGGER.to_string(), Byml::Bool(h.is_one_shot));
        out.insert(KEY_READABLE.to_string(), Byml::Bool(h.is_readable));
        out.insert(KEY_WRITABLE.to_string(), Byml::Bool(h.is_writable));
        out.insert(KEY_SAVE.to_string(), Byml::Bool(h.is_persistent));
        out.insert(KEY_RESET.to_string(), Byml::Int(h.reset_policy));
        self.value.encode_into(&mut out);
        Byml::Hash(out)
    }

    /// The save-format entry: name and hash only.
    pub fn to_save_encoded(&self) -> Byml {
        let mut out = BTreeMap::new();
        out.insert(KEY_NAME.to_string(), Byml::from(self.name()));
        out.insert(KEY_HASH.to_string(), Byml::Int(self.hash()));
        Byml::Hash(out)
    }

    pub fn apply_overrides(&mut self, rules: &OverrideRuleSet) {
        rules.apply(self);
    }

    pub fn header(&self) -> &FlagHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut FlagHeader {
        &mut self.header
    }

    pub fn value(&self) -> &FlagValue {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut FlagValue {
        &mut self.value
    }

    pub fn name(&self) -> &str {
        self.header.name()
    }

    pub fn hash(&self) -> i32 {
        self.header.hash()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.header.set_name(name);
    }

    pub fn kind(&self) -> FlagKind {
        self.value.kind()
    }

    pub fn is_revival(&self) -> bool {
        self.revival
    }

    /// Returns false, leaving the flag unchanged, for kinds without a revival subset.
    pub fn set_revival(&mut self, revival: bool) -> bool {
        if revival && !self.kind().supports_revival() {
            return false;
        }
        self.revival = revival;
        true
    }

    pub fn is_persistent(&self) -> bool {
        self.header.is_persistent
    }
}
