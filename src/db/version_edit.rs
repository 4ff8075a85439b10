use crate::db::file_meta::FileMetaData;
use std::fmt;

type FileNumber = u64;

/// The delta between two versions: files added and removed per level, and
/// the compaction pointers to remember. Applied to a base version by the
/// version builder; handed to the edit log before the result is published.
#[derive(Default, Clone, Debug)]
pub struct VersionEdit {
    new_files: Vec<(usize, FileMetaData)>,
    deleted_files: Vec<(usize, FileNumber)>,
    compact_pointers: Vec<(usize, Vec<u8>)>,
    next_file_number: Option<u64>,
}

impl VersionEdit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.new_files.clear();
        self.deleted_files.clear();
        self.compact_pointers.clear();
        self.next_file_number = None;
    }

    pub fn is_empty(&self) -> bool {
        self.new_files.is_empty() && self.deleted_files.is_empty()
    }

    /// Add the specified file at the specified level.
    pub fn add_file(&mut self, level: usize, f: FileMetaData) {
        self.new_files.push((level, f));
    }

    /// Delete the specified file from the specified level.
    pub fn delete_file(&mut self, level: usize, file_number: u64) {
        if !self.deleted_files.contains(&(level, file_number)) {
            self.deleted_files.push((level, file_number));
        }
    }

    pub fn set_compact_pointer(&mut self, level: usize, key: &[u8]) {
        self.compact_pointers.push((level, key.to_vec()));
    }

    pub(crate) fn set_next_file(&mut self, num: u64) {
        self.next_file_number = Some(num);
    }

    pub fn get_new_files(&self) -> &[(usize, FileMetaData)] {
        &self.new_files
    }

    pub fn get_deleted_files(&self) -> &[(usize, FileNumber)] {
        &self.deleted_files
    }

    pub fn get_compact_pointers(&self) -> &[(usize, Vec<u8>)] {
        &self.compact_pointers
    }

    pub fn next_file_number(&self) -> Option<u64> {
        self.next_file_number
    }

    /// Total bytes of the files this edit adds.
    pub(crate) fn added_bytes(&self) -> u64 {
        self.new_files.iter().map(|(_, f)| f.get_file_size()).sum()
    }
}

impl fmt::Display for VersionEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VersionEdit {{")?;
        if let Some(n) = self.next_file_number {
            write!(f, "\n  NextFile: {}", n)?;
        }
        for (level, key) in &self.compact_pointers {
            write!(
                f,
                "\n  CompactPointer: {} {}",
                level,
                String::from_utf8_lossy(key)
            )?;
        }
        for (level, number) in &self.deleted_files {
            write!(f, "\n  DeleteFile: {} {}", level, number)?;
        }
        for (level, meta) in &self.new_files {
            write!(f, "\n  AddFile: {} {}", level, meta)?;
        }
        write!(f, "\n}}")
    }
}
