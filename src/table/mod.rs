//! The table-storage contract the compaction engine consumes.
//!
//! The byte format of a table is owned by the collaborator; the engine only
//! needs to stream a table's entries in key order and to write new tables.

mod mem_storage;

pub use crate::table::mem_storage::{Fault, MemTableStorage};

use crate::db::{CompressionOptions, CompressionType, DResult};

/// Entries of one table in ascending key order. An `Err` item reports a
/// failure discovered mid-read, e.g. a checksum mismatch.
pub type KvIter = Box<dyn Iterator<Item = DResult<(Vec<u8>, Vec<u8>)>> + Send>;

/// Per-table write settings resolved for the output level.
#[derive(Clone, Copy, Debug)]
pub struct TableWriteOptions {
    pub compression: CompressionType,
    pub compression_opts: CompressionOptions,
    pub block_size: usize,
    pub block_restart_interval: i64,
}

/// What a finished table writer reports back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSummary {
    pub file_number: u64,
    pub file_size: u64,
    pub smallest: Vec<u8>,
    pub largest: Vec<u8>,
}

pub trait TableWriter: Send {
    /// Append an entry; keys arrive in strictly ascending order.
    fn add(&mut self, key: &[u8], value: &[u8]) -> DResult<()>;

    /// Approximate size of the table built so far.
    fn file_size(&self) -> u64;

    fn num_entries(&self) -> u64;

    /// Seal the table and make it durable.
    fn finish(self: Box<Self>) -> DResult<TableSummary>;

    /// Drop everything written so far.
    fn abandon(self: Box<Self>);
}

pub trait TableStorage: Send + Sync {
    fn open_for_read(&self, file_number: u64) -> DResult<KvIter>;

    fn create_writer(
        &self,
        level: usize,
        file_number: u64,
        opt: &TableWriteOptions,
    ) -> DResult<Box<dyn TableWriter>>;

    /// Remove a table that no live version references any more.
    fn delete_table(&self, _file_number: u64) -> DResult<()> {
        Ok(())
    }
}
