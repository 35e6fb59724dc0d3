use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("malformed record {name}: {reason}")]
    MalformedRecord { name: String, reason: String },

    #[error("actor {actor} has a far variant, its life condition link cannot be Dummy")]
    FarVariantConstraint { actor: String },

    #[error("rename of {from} to {to} has not finished")]
    RenameInProgress { from: String, to: String },

    #[error("hash {hash} in {category} already belongs to {existing}, refusing {incoming}")]
    HashCollision {
        category: String,
        hash: i32,
        existing: String,
        incoming: String,
    },

    #[error("malformed document: {0}")]
    MalformedDocument(String),

    #[error("malformed actor index: {0}")]
    MalformedIndex(String),

    #[error("rule table: {0}")]
    RuleTable(String),

    #[error("missing page {0}")]
    MissingPage(String),

    #[error("unknown link kind {0}")]
    UnknownLink(String),

    #[error("missing entry {0}")]
    MissingEntry(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SyncError {
    pub(crate) fn malformed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        SyncError::MalformedRecord {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
