#![allow(clippy::module_inception)]
#[macro_use]
extern crate lazy_static;
#[macro_use(defer)]
extern crate scopeguard;
#[macro_use]
extern crate quick_error;

pub use crate::db::{
    CompactionEngine, CompactionFailure, CompactionFilter, CompressionOptions, CompressionType,
    DError, DResult, EditLog, FileMetaData, FilterDecision, LevelScore, LevelSizeModel,
    LevelState, LsmEngine, ManualCompactionHandle, MemEditLog, MergeOperator, Options, StallReason,
    Version, VersionEdit, WriteStallState,
};
pub use crate::env::{Env, PosixEnv, TestEnv};
pub use crate::table::{
    Fault, KvIter, MemTableStorage, TableStorage, TableSummary, TableWriteOptions, TableWriter,
};
pub use crate::utils::cmp::{BytewiseComparatorImpl, Comparator};
pub use crate::utils::logger::new_logger;

// export the macros first.
#[macro_use]
mod macros;
mod db;
mod env;
mod table;
mod utils;

pub fn version_info() -> String {
    let fallback = "Unknown env";
    format!(
        "\nRelease Version:   {}\
         \nGit Commit Hash:   {}\
         \nGit Commit Branch: {}",
        option_env!("DAKV_RELEASE").unwrap_or(fallback),
        option_env!("GIT_COMMIT").unwrap_or(fallback),
        option_env!("GIT_BRANCH").unwrap_or(fallback),
    )
}
