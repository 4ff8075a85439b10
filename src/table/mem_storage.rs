use crate::db::{CompressionType, DError, DResult, FileMetaData};
use crate::table::{KvIter, TableStorage, TableSummary, TableWriteOptions, TableWriter};
use hashbrown::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

type Entries = Arc<Vec<(Vec<u8>, Vec<u8>)>>;

/// Failure modes a test can attach to a stored table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Opening the table fails with an I/O error.
    Io,
    /// The first entry reads fine, the next one reports a checksum mismatch.
    Corruption,
}

#[derive(Default)]
struct Inner {
    tables: RwLock<HashMap<u64, Entries>>,
    faults: Mutex<HashMap<u64, Fault>>,
    compression: Mutex<HashMap<u64, CompressionType>>,
    deleted: Mutex<Vec<u64>>,
    fail_writes: AtomicBool,
}

/// Table storage kept entirely in memory. A table's size is the sum of its
/// key and value lengths.
#[derive(Default, Clone)]
pub struct MemTableStorage {
    inner: Arc<Inner>,
}

impl MemTableStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `entries` (sorted here) under `file_number` and return its metadata.
    pub fn insert_table(
        &self,
        file_number: u64,
        mut entries: Vec<(Vec<u8>, Vec<u8>)>,
    ) -> FileMetaData {
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.dedup_by(|a, b| a.0 == b.0);
        let size = entries
            .iter()
            .map(|(k, v)| (k.len() + v.len()) as u64)
            .sum();
        let smallest = entries.first().map(|e| e.0.clone()).unwrap_or_default();
        let largest = entries.last().map(|e| e.0.clone()).unwrap_or_default();
        write_lock!(self.inner.tables).insert(file_number, Arc::new(entries));
        FileMetaData::new(file_number, size, smallest, largest)
    }

    pub fn entries(&self, file_number: u64) -> Option<Vec<(Vec<u8>, Vec<u8>)>> {
        read_lock!(self.inner.tables)
            .get(&file_number)
            .map(|e| e.as_ref().clone())
    }

    pub fn contains(&self, file_number: u64) -> bool {
        read_lock!(self.inner.tables).contains_key(&file_number)
    }

    pub fn deleted(&self) -> Vec<u64> {
        lock!(self.inner.deleted).clone()
    }

    /// Compression the writer of `file_number` was created with.
    pub fn compression_of(&self, file_number: u64) -> Option<CompressionType> {
        lock!(self.inner.compression).get(&file_number).copied()
    }

    pub fn inject_fault(&self, file_number: u64, fault: Fault) {
        lock!(self.inner.faults).insert(file_number, fault);
    }

    pub fn clear_faults(&self) {
        lock!(self.inner.faults).clear();
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::Release);
    }
}

impl TableStorage for MemTableStorage {
    fn open_for_read(&self, file_number: u64) -> DResult<KvIter> {
        let fault = lock!(self.inner.faults).get(&file_number).copied();
        if fault == Some(Fault::Io) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("injected read failure on table {}", file_number),
            )
            .into());
        }
        let entries = read_lock!(self.inner.tables)
            .get(&file_number)
            .cloned()
            .ok_or(DError::NoSuchFile(file_number))?;
        let corrupt_at = match fault {
            Some(Fault::Corruption) => Some(1),
            _ => None,
        };
        Ok(Box::new(MemTableIter {
            entries,
            pos: 0,
            corrupt_at,
            file_number,
        }))
    }

    fn create_writer(
        &self,
        _level: usize,
        file_number: u64,
        opt: &TableWriteOptions,
    ) -> DResult<Box<dyn TableWriter>> {
        if self.inner.fail_writes.load(Ordering::Acquire) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("injected write failure on table {}", file_number),
            )
            .into());
        }
        lock!(self.inner.compression).insert(file_number, opt.compression);
        Ok(Box::new(MemTableWriter {
            inner: self.inner.clone(),
            file_number,
            entries: vec![],
            size: 0,
        }))
    }

    fn delete_table(&self, file_number: u64) -> DResult<()> {
        write_lock!(self.inner.tables).remove(&file_number);
        lock!(self.inner.deleted).push(file_number);
        Ok(())
    }
}

struct MemTableIter {
    entries: Entries,
    pos: usize,
    corrupt_at: Option<usize>,
    file_number: u64,
}

impl Iterator for MemTableIter {
    type Item = DResult<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.corrupt_at == Some(self.pos) && self.pos < self.entries.len() {
            self.pos = self.entries.len();
            return Some(Err(DError::Corruption(format!(
                "block checksum mismatch in table {}",
                self.file_number
            ))));
        }
        let item = self.entries.get(self.pos)?.clone();
        self.pos += 1;
        Some(Ok(item))
    }
}

struct MemTableWriter {
    inner: Arc<Inner>,
    file_number: u64,
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    size: u64,
}

impl TableWriter for MemTableWriter {
    fn add(&mut self, key: &[u8], value: &[u8]) -> DResult<()> {
        if let Some((last, _)) = self.entries.last() {
            if last.as_slice() >= key {
                return Err(DError::InvalidArgument(format!(
                    "keys added out of order to table {}",
                    self.file_number
                )));
            }
        }
        self.size += (key.len() + value.len()) as u64;
        self.entries.push((key.to_vec(), value.to_vec()));
        Ok(())
    }

    fn file_size(&self) -> u64 {
        self.size
    }

    fn num_entries(&self) -> u64 {
        self.entries.len() as u64
    }

    fn finish(self: Box<Self>) -> DResult<TableSummary> {
        let summary = TableSummary {
            file_number: self.file_number,
            file_size: self.size,
            smallest: self.entries.first().map(|e| e.0.clone()).unwrap_or_default(),
            largest: self.entries.last().map(|e| e.0.clone()).unwrap_or_default(),
        };
        write_lock!(self.inner.tables).insert(self.file_number, Arc::new(self.entries));
        Ok(summary)
    }

    fn abandon(self: Box<Self>) {}
}
