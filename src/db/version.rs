use crate::db::file_meta::FileMetaData;
use crate::db::level_size::LevelSizeModel;
use crate::db::level_state::{total_file_size, LevelState};
use crate::db::scorer::LevelScore;
use crate::utils::cmp::Comparator;
use hashbrown::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

/// An immutable snapshot of which files live at which level. Readers hold
/// an `Arc<Version>` for as long as they need a consistent view; the only
/// interior state is the seek-compaction hint, which never changes the
/// file layout.
pub struct Version {
    number: u64,
    levels: Vec<LevelState>,
    cmp: Arc<dyn Comparator + Send + Sync>,
    // Levels ordered by compaction score, computed when the version is built.
    scores: Vec<LevelScore>,
    // file to compact and level
    file_to_compact: Mutex<Option<(usize, Arc<FileMetaData>)>>,
}

impl Version {
    pub(crate) fn new(
        number: u64,
        levels: Vec<LevelState>,
        cmp: Arc<dyn Comparator + Send + Sync>,
        scores: Vec<LevelScore>,
    ) -> Self {
        Self {
            number,
            levels,
            cmp,
            scores,
            file_to_compact: Mutex::new(None),
        }
    }

    /// Position of this version in the publish order.
    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level_state(&self, level: usize) -> &LevelState {
        &self.levels[level]
    }

    pub fn files(&self, level: usize) -> &[Arc<FileMetaData>] {
        self.levels[level].files()
    }

    pub fn num_level_files(&self, level: usize) -> usize {
        self.levels[level].file_count()
    }

    pub fn num_level_bytes(&self, level: usize) -> u64 {
        self.levels[level].total_bytes()
    }

    pub(crate) fn comparator(&self) -> &Arc<dyn Comparator + Send + Sync> {
        &self.cmp
    }

    /// Levels by descending compaction score.
    pub fn compaction_scores(&self) -> &[LevelScore] {
        &self.scores
    }

    pub fn max_score(&self) -> f64 {
        self.scores.first().map_or(0.0, |s| s.score.max(0.0))
    }

    pub fn file_to_compact(&self) -> Option<(usize, Arc<FileMetaData>)> {
        lock!(self.file_to_compact).clone()
    }

    /// Charge a seek miss to `f`. Returns true if `f` has used up its seek
    /// budget and became this version's seek-compaction candidate.
    pub(crate) fn record_seek_miss(&self, level: usize, f: &Arc<FileMetaData>) -> bool {
        if f.decrease_seeks() > 0 {
            return false;
        }
        let mut slot = lock!(self.file_to_compact);
        if slot.is_none() && self.levels[level].contains(f.get_file_number()) {
            *slot = Some((level, f.clone()));
            return true;
        }
        false
    }

    /// Store in the result all files in `level` that overlap [begin, end].
    /// `None` stands for a key before (or after) every key.
    /// Level-0 files may overlap each other, so if a newly added file
    /// expands the range, the search restarts with the wider range.
    pub fn get_overlapping_inputs(
        &self,
        level: usize,
        begin: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Vec<Arc<FileMetaData>> {
        let mut inputs = vec![];
        let mut user_begin = begin.map(|b| b.to_vec());
        let mut user_end = end.map(|e| e.to_vec());
        let files = self.files(level);
        let mut i = 0;
        while i < files.len() {
            let f = &files[i];
            i += 1;
            let file_start = f.get_smallest();
            let file_limit = f.get_largest();
            if let Some(b) = &user_begin {
                if self.cmp.lt(file_limit, b) {
                    // "f" is completely before specified range; skip it
                    continue;
                }
            }
            if let Some(e) = &user_end {
                if self.cmp.gt(file_start, e) {
                    // "f" is completely after specified range; skip it
                    continue;
                }
            }
            inputs.push(f.clone());
            if level == 0 {
                let widen_begin = matches!(&user_begin, Some(b) if self.cmp.lt(file_start, b));
                let widen_end = matches!(&user_end, Some(e) if self.cmp.gt(file_limit, e));
                if widen_begin {
                    user_begin = Some(file_start.to_vec());
                    inputs.clear();
                    i = 0;
                } else if widen_end {
                    user_end = Some(file_limit.to_vec());
                    inputs.clear();
                    i = 0;
                }
            }
        }
        inputs
    }

    /// Returns true if some file in the specified level overlaps
    /// some part of [smallest, largest].
    pub fn overlap_in_level(
        &self,
        level: usize,
        smallest: Option<&[u8]>,
        largest: Option<&[u8]>,
    ) -> bool {
        has_overlapped_files_in_range(
            self.cmp.as_ref(),
            level > 0,
            self.files(level),
            smallest,
            largest,
        )
    }

    /// Return the level at which a flushed table covering
    /// [smallest, largest] should be placed: the deepest level up to
    /// `max_level` where it overlaps nothing there or one level down, and
    /// whose grandparent overlap stays within budget.
    pub(crate) fn pick_level_for_memtable_output(
        &self,
        smallest: &[u8],
        largest: &[u8],
        max_level: usize,
        model: &LevelSizeModel,
    ) -> usize {
        let mut level = 0;
        if self.overlap_in_level(0, Some(smallest), Some(largest)) {
            return level;
        }
        // Push to next level if there is no overlap in next level,
        // and the #bytes overlapping in the level after that are limited.
        while level < max_level && level + 1 < self.num_levels() {
            if self.overlap_in_level(level + 1, Some(smallest), Some(largest)) {
                break;
            }
            if level + 2 < self.num_levels() {
                let overlaps = self.get_overlapping_inputs(level + 2, Some(smallest), Some(largest));
                if total_file_size(&overlaps) > model.max_grandparent_overlap_bytes(level) {
                    break;
                }
            }
            level += 1;
        }
        level
    }

    pub(crate) fn add_live_files(&self, live: &mut HashSet<u64>) {
        for state in &self.levels {
            for f in state.files() {
                live.insert(f.get_file_number());
            }
        }
    }

    /// One-line file count summary, e.g. `files[ 2 0 1 0 0 0 0 ]`.
    pub fn level_summary(&self) -> String {
        let counts: Vec<String> = self
            .levels
            .iter()
            .map(|l| l.file_count().to_string())
            .collect();
        format!("files[ {} ]", counts.join(" "))
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Version")
            .field("number", &self.number)
            .field("levels", &self.levels)
            .field("scores", &self.scores)
            .finish()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (level, state) in self.levels.iter().enumerate() {
            writeln!(f, "--- level {} ---", level)?;
            for file in state.files() {
                writeln!(f, " {}", file)?;
            }
        }
        Ok(())
    }
}

/// Binary search for the earliest index whose largest key >= `key`.
/// Only meaningful for the disjoint, sorted files of levels >= 1.
pub fn find_file(cmp: &dyn Comparator, files: &[Arc<FileMetaData>], key: &[u8]) -> usize {
    let mut left = 0;
    let mut right = files.len();
    while left < right {
        let mid = (left + right) / 2;
        let f = &files[mid];
        if cmp.lt(f.get_largest(), key) {
            left = mid + 1;
        } else {
            right = mid;
        }
    }
    right
}

/// * key is none, return false.
/// * key is greater than file largest key, it should be after file.
fn after_file(cmp: &dyn Comparator, key: Option<&[u8]>, f: &FileMetaData) -> bool {
    key.map_or(false, |k| cmp.gt(k, f.get_largest()))
}

/// * key is none, return false.
/// * key is smaller than file smallest key, it should be before file.
fn before_file(cmp: &dyn Comparator, key: Option<&[u8]>, f: &FileMetaData) -> bool {
    key.map_or(false, |k| cmp.lt(k, f.get_smallest()))
}

/// * level 0 files may overlap each other, so we need check all files.
/// * level n > 0 files are sorted, so we use binary search to check the list.
pub fn has_overlapped_files_in_range(
    cmp: &dyn Comparator,
    disjoint_sorted_files: bool,
    files: &[Arc<FileMetaData>],
    smallest: Option<&[u8]>,
    largest: Option<&[u8]>,
) -> bool {
    if !disjoint_sorted_files {
        // Need to check against all files
        return files
            .iter()
            .any(|f| !(after_file(cmp, smallest, f) || before_file(cmp, largest, f)));
    }
    let index = match smallest {
        Some(s) => find_file(cmp, files, s),
        None => 0,
    };
    if index >= files.len() {
        // beginning of range is after all files, so no overlap.
        return false;
    }
    !before_file(cmp, largest, &files[index])
}

/// The smallest range covering every file in `inputs`.
pub(crate) fn key_range<'a, I>(cmp: &dyn Comparator, inputs: I) -> Option<(Vec<u8>, Vec<u8>)>
where
    I: IntoIterator<Item = &'a Arc<FileMetaData>>,
{
    let mut range: Option<(&[u8], &[u8])> = None;
    for f in inputs {
        range = Some(match range {
            None => (f.get_smallest(), f.get_largest()),
            Some((s, l)) => (
                if cmp.lt(f.get_smallest(), s) { f.get_smallest() } else { s },
                if cmp.gt(f.get_largest(), l) { f.get_largest() } else { l },
            ),
        });
    }
    range.map(|(s, l)| (s.to_vec(), l.to_vec()))
}
