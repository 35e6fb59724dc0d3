pub mod actor;
pub mod actor_info;
pub mod archive;
pub mod byml;
pub mod copy;
pub mod core_api;
pub mod error;
pub mod flag;
pub mod hash;
pub mod overrides;
pub mod pages;
pub mod reader;
pub mod revival;
pub mod store;

pub use error::{Result, SyncError};
pub use hash::hash_of;
