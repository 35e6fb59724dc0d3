use serde::{Deserialize, Serialize};

use crate::flag::{Flag, FlagKind};
use crate::store::ChangeCounts;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryChange {
    pub category: FlagKind,
    pub counts: ChangeCounts,
}

/// What a save wrote, for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReport {
    pub categories: Vec<CategoryChange>,
    pub save_data: ChangeCounts,
    pub actors: Vec<String>,
    pub gamedata_pages: usize,
    pub savedata_pages: usize,
}

impl ChangeReport {
    pub fn totals(&self) -> ChangeCounts {
        let mut totals = ChangeCounts::default();
        for change in &self.categories {
            totals += change.counts;
        }
        totals
    }

    pub fn is_empty(&self) -> bool {
        self.totals().total() == 0 && self.save_data.total() == 0 && self.actors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlagSummary {
    pub name: String,
    pub hash: i32,
    pub category: FlagKind,
    pub persistent: bool,
    pub revival: bool,
}

impl From<&Flag> for FlagSummary {
    fn from(flag: &Flag) -> Self {
        Self {
            name: flag.name().to_string(),
            hash: flag.hash(),
            category: flag.kind(),
            persistent: flag.is_persistent(),
            revival: flag.is_revival(),
        }
    }
}
