use crate::db::config::{BYTES_PER_SEEK, MIN_ALLOWED_SEEKS};
use crate::table::TableSummary;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// meta data of the table file.
pub struct FileMetaData {
    /// seeks allowed until compaction
    /// Actually, only this field can be modified once FileMetaData has been created.
    allowed_seeks: AtomicI64,
    // the number of table file
    file_number: u64,
    // File size in bytes
    file_size: u64,
    // Smallest key served by table
    smallest: Vec<u8>,
    // Largest key served by table
    largest: Vec<u8>,
}

impl FileMetaData {
    pub fn new(file_number: u64, file_size: u64, smallest: Vec<u8>, largest: Vec<u8>) -> Self {
        FileMetaData {
            allowed_seeks: AtomicI64::new(allowed_seeks_for_size(file_size)),
            file_number,
            file_size,
            smallest,
            largest,
        }
    }

    pub fn allow_seeks(&self) -> i64 {
        self.allowed_seeks.load(Ordering::Acquire)
    }

    /// Returns the remaining seeks after the decrement.
    pub fn decrease_seeks(&self) -> i64 {
        self.allowed_seeks.fetch_sub(1, Ordering::AcqRel) - 1
    }

    pub fn get_file_size(&self) -> u64 {
        self.file_size
    }

    pub fn get_file_number(&self) -> u64 {
        self.file_number
    }

    pub fn get_smallest(&self) -> &[u8] {
        &self.smallest
    }

    pub fn get_largest(&self) -> &[u8] {
        &self.largest
    }
}

impl Clone for FileMetaData {
    /// A copy starts with a fresh seek budget.
    fn clone(&self) -> Self {
        FileMetaData::new(
            self.file_number,
            self.file_size,
            self.smallest.clone(),
            self.largest.clone(),
        )
    }
}

impl From<TableSummary> for FileMetaData {
    fn from(t: TableSummary) -> Self {
        FileMetaData::new(t.file_number, t.file_size, t.smallest, t.largest)
    }
}

fn allowed_seeks_for_size(file_size: u64) -> i64 {
    let seeks = (file_size / BYTES_PER_SEEK) as i64;
    seeks.max(MIN_ALLOWED_SEEKS)
}

impl fmt::Debug for FileMetaData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {:?}, {:?}",
            self.file_size,
            self.file_number,
            self.smallest.as_slice(),
            self.largest.as_slice()
        )
    }
}

impl fmt::Display for FileMetaData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}[{} .. {}]",
            self.file_number,
            self.file_size,
            String::from_utf8_lossy(&self.smallest),
            String::from_utf8_lossy(&self.largest)
        )
    }
}
