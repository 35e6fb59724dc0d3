use thiserror::Error;

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreErrorCode {
    Io,
    Parse,
    Constraint,
    NotFound,
    UnsupportedOperation,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code:?}: {message}")]
pub struct CoreError {
    pub code: CoreErrorCode,
    pub message: String,
}

impl CoreError {
    pub fn new(code: CoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<SyncError> for CoreError {
    fn from(err: SyncError) -> Self {
        let code = match &err {
            SyncError::Io(_) => CoreErrorCode::Io,
            SyncError::MalformedRecord { .. }
            | SyncError::MalformedDocument(_)
            | SyncError::MalformedIndex(_)
            | SyncError::RuleTable(_) => CoreErrorCode::Parse,
            SyncError::FarVariantConstraint { .. }
            | SyncError::RenameInProgress { .. }
            | SyncError::HashCollision { .. }
            | SyncError::UnknownLink(_) => CoreErrorCode::Constraint,
            SyncError::MissingPage(_) | SyncError::MissingEntry(_) => CoreErrorCode::NotFound,
        };
        Self::new(code, err.to_string())
    }
}
