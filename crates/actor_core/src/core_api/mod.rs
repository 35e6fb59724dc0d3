mod engine;
mod error;
mod types;

pub use engine::{ACTOR_INFO_PATH, Engine, GAMEDATA_DIR, SAVEDATA_DIR, Session, StagedSave};
pub use error::{CoreError, CoreErrorCode};
pub use types::{CategoryChange, ChangeReport, FlagSummary};
