//! Name-pattern override rules for flag parameters.
//!
//! The table is JSON keyed by scope (`"standard"` for every kind, or a category
//! name such as `"bool_data"`), then by field, then an ordered list of
//! `[pattern, value]` pairs:
//!
//! ```json
//! {
//!   "standard": { "persistent": [["^IsGet_", true]] },
//!   "bool_data": { "category": [["^IsRegisteredPictureBook_Weapon_", 5]] }
//! }
//! ```
//!
//! Patterns are regular expressions searched anywhere in the flag name, so a
//! plain substring works as a pattern. When several rules for one field match,
//! the last one wins.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::flag::{Bounded, BoundedArray, Flag, FlagElement, FlagKind, FlagValue};

const STANDARD_SCOPE: &str = "standard";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleField {
    EventAssociated,
    OneShot,
    Readable,
    Writable,
    Persistent,
    ResetPolicy,
    Category,
    InitValue,
    MaxValue,
    MinValue,
}

impl RuleField {
    pub fn is_header(&self) -> bool {
        matches!(
            *self,
            Self::EventAssociated
                | Self::OneShot
                | Self::Readable
                | Self::Writable
                | Self::Persistent
                | Self::ResetPolicy
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<RuleValue>),
}

impl RuleValue {
    pub(crate) fn as_f32(&self) -> Option<f32> {
        match *self {
            Self::Float(v) => Some(v as f32),
            Self::Int(v) => Some(v as f32),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OverrideRule {
    pattern: Regex,
    value: RuleValue,
}

impl OverrideRule {
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn value(&self) -> &RuleValue {
        &self.value
    }

    fn matches(&self, name: &str) -> bool {
        self.pattern.is_match(name)
    }
}

type FieldRules = BTreeMap<RuleField, Vec<OverrideRule>>;
type RawTable = BTreeMap<String, BTreeMap<RuleField, Vec<(String, RuleValue)>>>;

/// Immutable rule table, loaded once and shared by every flag built in a session.
#[derive(Debug, Clone, Default)]
pub struct OverrideRuleSet {
    standard: FieldRules,
    kinds: BTreeMap<FlagKind, FieldRules>,
}

/// The rule table shipped in `data/overrides.json`.
const STANDARD_TABLE: &str = include_str!("../../../data/overrides.json");

impl OverrideRuleSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The shipped rule table, compiled into the crate.
    pub fn standard() -> Result<Self> {
        Self::from_json_str(STANDARD_TABLE)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: RawTable = serde_json::from_str(text)
            .map_err(|e| SyncError::RuleTable(format!("invalid rule table: {e}")))?;
        let mut set = Self::default();

        for (scope, fields) in raw {
            let kind = if scope == STANDARD_SCOPE {
                None
            } else {
                Some(FlagKind::from_category(&scope).ok_or_else(|| {
                    SyncError::RuleTable(format!("unknown rule scope {scope:?}"))
                })?)
            };

            let mut compiled = FieldRules::new();
            for (field, rules) in fields {
                if kind.is_none() && !field.is_header() {
                    return Err(SyncError::RuleTable(format!(
                        "{field:?} rules need a flag kind scope, not {STANDARD_SCOPE:?}"
                    )));
                }
                let mut probe = Flag::new(kind.unwrap_or(FlagKind::Bool), "");
                let mut out = Vec::with_capacity(rules.len());
                for (pattern, value) in rules {
                    if !apply_field(&mut probe, field, &value) {
                        return Err(SyncError::RuleTable(format!(
                            "{scope}.{field:?}: value {value:?} does not fit the field"
                        )));
                    }
                    let pattern = Regex::new(&pattern).map_err(|e| {
                        SyncError::RuleTable(format!("{scope}.{field:?}: bad pattern: {e}"))
                    })?;
                    out.push(OverrideRule { pattern, value });
                }
                compiled.insert(field, out);
            }

            match kind {
                None => set.standard = compiled,
                Some(kind) => {
                    set.kinds.insert(kind, compiled);
                }
            }
        }

        debug!(
            standard = set.standard.values().map(Vec::len).sum::<usize>(),
            kinds = set.kinds.len(),
            "loaded override rules"
        );
        Ok(set)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn rules_for(&self, kind: Option<FlagKind>, field: RuleField) -> &[OverrideRule] {
        let table = match kind {
            None => Some(&self.standard),
            Some(kind) => self.kinds.get(&kind),
        };
        table
            .and_then(|t| t.get(&field))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.standard.values().all(Vec::is_empty)
            && self.kinds.values().all(|t| t.values().all(Vec::is_empty))
    }

    /// Standard rules first, then the flag kind's own; within each, fields in declaration order.
    pub fn apply(&self, flag: &mut Flag) {
        let name = flag.name().to_string();
        let scopes = [Some(&self.standard), self.kinds.get(&flag.kind())];
        for table in scopes.into_iter().flatten() {
            for (field, rules) in table {
                if let Some(rule) = rules.iter().rev().find(|r| r.matches(&name)) {
                    apply_field(flag, *field, &rule.value);
                }
            }
        }
    }
}

fn set_from<T: FlagElement>(slot: &mut T, value: &RuleValue) -> bool {
    match T::from_rule(value) {
        Some(v) => {
            *slot = v;
            true
        }
        None => false,
    }
}

fn apply_scalar<T: FlagElement>(range: &mut Bounded<T>, field: RuleField, value: &RuleValue) -> bool {
    match field {
        RuleField::InitValue => set_from(&mut range.init, value),
        RuleField::MaxValue => set_from(&mut range.max, value),
        RuleField::MinValue => set_from(&mut range.min, value),
        _ => false,
    }
}

fn apply_array<T: FlagElement>(
    range: &mut BoundedArray<T>,
    field: RuleField,
    value: &RuleValue,
) -> bool {
    match field {
        RuleField::InitValue => {
            let RuleValue::List(items) = value else {
                return false;
            };
            match items.iter().map(T::from_rule).collect::<Option<Vec<T>>>() {
                Some(values) => {
                    range.init = values;
                    true
                }
                None => false,
            }
        }
        RuleField::MaxValue => set_from(&mut range.max, value),
        RuleField::MinValue => set_from(&mut range.min, value),
        _ => false,
    }
}

/// Returns false when `value` does not fit `field` on this flag's kind.
fn apply_field(flag: &mut Flag, field: RuleField, value: &RuleValue) -> bool {
    let header = flag.header_mut();
    match field {
        RuleField::EventAssociated => return set_from(&mut header.is_event_associated, value),
        RuleField::OneShot => return set_from(&mut header.is_one_shot, value),
        RuleField::Readable => return set_from(&mut header.is_readable, value),
        RuleField::Writable => return set_from(&mut header.is_writable, value),
        RuleField::Persistent => return set_from(&mut header.is_persistent, value),
        RuleField::ResetPolicy => return set_from(&mut header.reset_policy, value),
        RuleField::Category | RuleField::InitValue | RuleField::MaxValue | RuleField::MinValue => {}
    }

    match flag.value_mut() {
        FlagValue::Bool { category, range } => {
            if field == RuleField::Category {
                match i32::from_rule(value) {
                    Some(c) => {
                        *category = Some(c);
                        true
                    }
                    None => false,
                }
            } else {
                apply_scalar(range, field, value)
            }
        }
        FlagValue::BoolArray(r) => apply_array(r, field, value),
        FlagValue::S32(r) => apply_scalar(r, field, value),
        FlagValue::S32Array(r) => apply_array(r, field, value),
        FlagValue::F32(r) => apply_scalar(r, field, value),
        FlagValue::F32Array(r) => apply_array(r, field, value),
        FlagValue::String32(r) | FlagValue::String64(r) | FlagValue::String256(r) => {
            apply_scalar(r, field, value)
        }
        FlagValue::String64Array(r) | FlagValue::String256Array(r) => {
            apply_array(r, field, value)
        }
        FlagValue::Vec2(r) => apply_scalar(r, field, value),
        FlagValue::Vec2Array(r) => apply_array(r, field, value),
        FlagValue::Vec3(r) => apply_scalar(r, field, value),
        FlagValue::Vec3Array(r) => apply_array(r, field, value),
        FlagValue::Vec4(r) => apply_scalar(r, field, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_payload_rules_in_standard_scope() {
        let err = OverrideRuleSet::from_json_str(r#"{"standard": {"max_value": [["x", 1]]}}"#)
            .expect_err("payload field in standard scope");
        assert!(matches!(err, SyncError::RuleTable(_)));
    }

    #[test]
    fn rejects_ill_typed_values() {
        let err = OverrideRuleSet::from_json_str(r#"{"vector2f_data": {"max_value": [["x", [1]]]}}"#)
            .expect_err("two-component vector needs two numbers");
        assert!(matches!(err, SyncError::RuleTable(_)));
    }

    #[test]
    fn shipped_table_keeps_acquisition_flags_saved() {
        let rules = OverrideRuleSet::standard().expect("shipped table compiles");
        let mut flag = Flag::new(FlagKind::Bool, "IsGet_Item_Apple");
        flag.apply_overrides(&rules);
        assert!(flag.is_persistent());
        assert!(flag.header().is_one_shot);
    }

    #[test]
    fn category_only_fits_bool_flags() {
        assert!(OverrideRuleSet::from_json_str(r#"{"s32_data": {"category": [["x", 1]]}}"#).is_err());
        assert!(OverrideRuleSet::from_json_str(r#"{"bool_data": {"category": [["x", 1]]}}"#).is_ok());
    }
}
