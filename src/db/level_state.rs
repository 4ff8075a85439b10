use crate::db::file_meta::FileMetaData;
use std::sync::Arc;

/// Bookkeeping for one level of a version: the live files and their
/// aggregate size. Files are kept sorted by smallest key; at levels >= 1
/// their ranges are also disjoint.
#[derive(Clone, Default, Debug)]
pub struct LevelState {
    files: Vec<Arc<FileMetaData>>,
    total_bytes: u64,
}

impl LevelState {
    pub fn new(files: Vec<Arc<FileMetaData>>) -> Self {
        let total_bytes = total_file_size(&files);
        Self { files, total_bytes }
    }

    pub fn files(&self) -> &[Arc<FileMetaData>] {
        &self.files
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, file_number: u64) -> bool {
        self.files
            .iter()
            .any(|f| f.get_file_number() == file_number)
    }
}

pub fn total_file_size<'a, I>(files: I) -> u64
where
    I: IntoIterator<Item = &'a Arc<FileMetaData>>,
{
    let mut sum = 0;
    for i in files {
        sum += i.get_file_size();
    }
    sum
}
