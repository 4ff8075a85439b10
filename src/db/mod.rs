pub use crate::db::compaction::ManualCompactionHandle;
pub use crate::db::edit_log::{EditLog, MemEditLog};
pub use crate::db::engine::{CompactionEngine, CompactionFailure, LsmEngine};
pub use crate::db::errors::{DError, DResult};
pub use crate::db::file_meta::FileMetaData;
pub use crate::db::level_size::LevelSizeModel;
pub use crate::db::level_state::LevelState;
pub use crate::db::options::{
    CompactionFilter, CompressionOptions, CompressionType, FilterDecision, MergeOperator, Options,
};
pub use crate::db::scorer::LevelScore;
pub use crate::db::version::Version;
pub use crate::db::version_edit::VersionEdit;
pub use crate::db::write_controller::{StallReason, WriteStallState};

#[macro_use]
mod errors;
mod compaction;
mod config;
mod edit_log;
mod engine;
#[cfg(test)]
mod engine_test;
mod file_meta;
mod level_size;
mod level_state;
mod merger;
mod options;
mod picker;
mod scheduler;
mod scorer;
mod version;
mod version_builder;
mod version_edit;
mod version_set;
mod write_controller;
