use crate::db::errors::{DError, DResult};
use crate::db::file_meta::FileMetaData;
use crate::db::level_state::total_file_size;
use crate::db::scorer::CompactionReason;
use crate::db::version::{key_range, Version};
use crate::db::version_edit::VersionEdit;
use crate::table::TableWriter;
use crate::utils::cmp::{ranges_overlap, Comparator};
use crossbeam_channel::Sender;
use std::ops::AddAssign;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// The levels and key range a running compaction touches. Two compactions
/// may run together only if their footprints do not conflict.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Footprint {
    pub(crate) level: usize,
    pub(crate) smallest: Vec<u8>,
    pub(crate) largest: Vec<u8>,
}

impl Footprint {
    /// Jobs conflict when they share an input or output level and their
    /// key ranges overlap.
    pub(crate) fn conflicts_with(&self, other: &Footprint, cmp: &dyn Comparator) -> bool {
        let shares_level = self.level.max(other.level) - self.level.min(other.level) <= 1;
        shares_level
            && ranges_overlap(
                cmp,
                &self.smallest,
                &self.largest,
                &other.smallest,
                &other.largest,
            )
    }

    /// True if a table covering [smallest, largest] placed at `level` could
    /// collide with this job's inputs or outputs.
    pub(crate) fn touches(
        &self,
        level: usize,
        smallest: &[u8],
        largest: &[u8],
        cmp: &dyn Comparator,
    ) -> bool {
        (level == self.level || level == self.level + 1)
            && ranges_overlap(cmp, &self.smallest, &self.largest, smallest, largest)
    }
}

/// A compaction job: inputs from `level` and `level+1` are merged into a
/// set of `level+1` files.
pub(crate) struct Compaction {
    level: usize,
    reason: CompactionReason,
    /// Maximum size of files to build during this compaction.
    max_output_file_size: u64,
    /// Bytes of grandparent overlap after which an output file is closed.
    max_grandparent_overlap: u64,
    /// Some output key has been seen
    seen_key: bool,
    /// Bytes of overlap between current output and grandparent files
    overlapped_bytes: u64,
    /// level_ptr holds indices into input_version levels: our state
    /// is that we are positioned at one of the file ranges for each
    /// higher level than the ones involved in this compaction (i.e. for
    /// all L >= level + 2).
    level_ptr: Vec<usize>,
    /// Deleted inputs, added outputs and the compaction pointer to publish.
    edit: VersionEdit,
    /// inputs[0] -> level[n]
    /// inputs[1] -> level[n+1]
    inputs: [Vec<Arc<FileMetaData>>; 2],
    input_version: Arc<Version>,
    /// parent: level + 1, grandparent: level + 2
    grandparents: Vec<Arc<FileMetaData>>,
    /// Index in grandparents
    grandparent_index: usize,
    manual: Option<Arc<ManualCompaction>>,
}

impl Compaction {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        level: usize,
        reason: CompactionReason,
        input_version: Arc<Version>,
        inputs: [Vec<Arc<FileMetaData>>; 2],
        grandparents: Vec<Arc<FileMetaData>>,
        max_output_file_size: u64,
        max_grandparent_overlap: u64,
    ) -> Self {
        let num_levels = input_version.num_levels();
        Self {
            level,
            reason,
            max_output_file_size,
            max_grandparent_overlap,
            seen_key: false,
            overlapped_bytes: 0,
            level_ptr: vec![0; num_levels],
            edit: VersionEdit::new(),
            inputs,
            input_version,
            grandparents,
            grandparent_index: 0,
            manual: None,
        }
    }

    pub(crate) fn level(&self) -> usize {
        self.level
    }

    pub(crate) fn output_level(&self) -> usize {
        self.level + 1
    }

    pub(crate) fn reason(&self) -> CompactionReason {
        self.reason
    }

    pub(crate) fn input_version(&self) -> &Arc<Version> {
        &self.input_version
    }

    pub(crate) fn inputs(&self, which: usize) -> &[Arc<FileMetaData>] {
        &self.inputs[which]
    }

    pub(crate) fn num_input_files(&self, which: usize) -> usize {
        self.inputs[which].len()
    }

    pub(crate) fn input_bytes(&self, which: usize) -> u64 {
        total_file_size(&self.inputs[which])
    }

    pub(crate) fn grandparents(&self) -> &[Arc<FileMetaData>] {
        &self.grandparents
    }

    pub(crate) fn max_output_file_size(&self) -> u64 {
        self.max_output_file_size
    }

    pub(crate) fn edit_mut(&mut self) -> &mut VersionEdit {
        &mut self.edit
    }

    pub(crate) fn manual(&self) -> Option<&Arc<ManualCompaction>> {
        self.manual.as_ref()
    }

    pub(crate) fn set_manual(&mut self, m: Arc<ManualCompaction>) {
        self.manual = Some(m);
    }

    /// Largest key of the level-L inputs; where the next compaction at this
    /// level starts.
    pub(crate) fn compact_pointer(&self) -> Option<Vec<u8>> {
        key_range(self.input_version.comparator().as_ref(), &self.inputs[0]).map(|(_, l)| l)
    }

    pub(crate) fn footprint(&self) -> Footprint {
        let cmp = self.input_version.comparator();
        let (smallest, largest) =
            key_range(cmp.as_ref(), self.inputs[0].iter().chain(self.inputs[1].iter()))
                .unwrap_or_default();
        Footprint {
            level: self.level,
            smallest,
            largest,
        }
    }

    /// Is this a trivial compaction that can be implemented by just
    /// moving a single input file to the next level (no merging or splitting)
    pub(crate) fn is_trivial_move(&self) -> bool {
        self.manual.is_none() && self.num_input_files(0) == 1 && self.num_input_files(1) == 0
    }

    /// Delete all inputs in the edit.
    pub(crate) fn add_input_deletions(&mut self) {
        for which in 0..2 {
            for f in &self.inputs[which] {
                self.edit.delete_file(self.level + which, f.get_file_number());
            }
        }
    }

    /// Returns true if the information we have available guarantees that
    /// the compaction is producing data in `level+1` for which no data exists
    /// in levels greater than `level+1`.
    pub(crate) fn is_base_level_for_key(&mut self, key: &[u8]) -> bool {
        let cmp = self.input_version.comparator().clone();
        for lvl in self.level + 2..self.input_version.num_levels() {
            let files = self.input_version.files(lvl);
            while self.level_ptr[lvl] < files.len() {
                let f = &files[self.level_ptr[lvl]];
                if cmp.le(key, f.get_largest()) {
                    // We've advanced far enough
                    if cmp.ge(key, f.get_smallest()) {
                        // Key falls in this file's range, so definitely not base level
                        return false;
                    }
                    break;
                }
                self.level_ptr[lvl] += 1;
            }
        }
        true
    }

    /// Returns true if we should stop building the current output
    /// before processing `key`.
    pub(crate) fn should_stop_before(&mut self, key: &[u8]) -> bool {
        let cmp = self.input_version.comparator().clone();
        // Scan to find earliest grandparent file that contains key.
        while self.grandparent_index < self.grandparents.len()
            && cmp.gt(key, self.grandparents[self.grandparent_index].get_largest())
        {
            if self.seen_key {
                self.overlapped_bytes += self.grandparents[self.grandparent_index].get_file_size();
            }
            self.grandparent_index += 1;
        }
        self.seen_key = true;
        // Too much overlap for current output; start new output
        if self.overlapped_bytes > self.max_grandparent_overlap {
            self.overlapped_bytes = 0;
            true
        } else {
            false
        }
    }
}

/// State of a compaction while its outputs are written.
pub(crate) struct CompactionState {
    pub(crate) compaction: Compaction,
    pub(crate) outputs: Vec<FileMetaData>,
    /// Number of the output file being written by `builder`.
    pub(crate) current_output: Option<u64>,
    pub(crate) builder: Option<Box<dyn TableWriter>>,
    pub(crate) total_bytes: u64,
}

impl CompactionState {
    pub(crate) fn new(compaction: Compaction) -> Self {
        Self {
            compaction,
            outputs: vec![],
            current_output: None,
            builder: None,
            total_bytes: 0,
        }
    }
}

/// Per level compaction stats. stats[level] stores the stats for
/// compactions that produced data for the specified `level`.
#[derive(Default, Debug, PartialEq, Clone, Copy)]
pub(crate) struct CompactionStats {
    pub(crate) micros: u64,
    pub(crate) read_bytes: u64,
    pub(crate) written_bytes: u64,
    pub(crate) count: u64,
}

impl AddAssign for CompactionStats {
    fn add_assign(&mut self, other: Self) {
        *self = Self {
            micros: self.micros + other.micros,
            read_bytes: self.read_bytes + other.read_bytes,
            written_bytes: self.written_bytes + other.written_bytes,
            count: self.count + other.count,
        };
    }
}

#[derive(Debug)]
struct ManualState {
    /// Level being compacted now.
    level: usize,
    /// Last level whose files are pushed down by this request.
    last_level: usize,
    begin: Option<Vec<u8>>,
    outcome: Option<DResult<()>>,
}

/// A queued request to compact a key range, possibly in several chunks.
#[derive(Debug)]
pub(crate) struct ManualCompaction {
    begin: Option<Vec<u8>>,
    end: Option<Vec<u8>>,
    canceled: AtomicBool,
    state: Mutex<ManualState>,
    done: Condvar,
}

impl ManualCompaction {
    /// Compacts levels `first..=last` over [begin, end].
    pub(crate) fn new(
        first: usize,
        last: usize,
        begin: Option<Vec<u8>>,
        end: Option<Vec<u8>>,
    ) -> Self {
        Self {
            state: Mutex::new(ManualState {
                level: first,
                last_level: last,
                begin: begin.clone(),
                outcome: None,
            }),
            begin,
            end,
            canceled: AtomicBool::new(false),
            done: Condvar::new(),
        }
    }

    /// Level and start key of the next chunk, or None once finished.
    pub(crate) fn next_chunk(&self) -> Option<(usize, Option<Vec<u8>>)> {
        let state = lock!(self.state);
        if state.outcome.is_some() {
            return None;
        }
        Some((state.level, state.begin.clone()))
    }

    pub(crate) fn end(&self) -> Option<&[u8]> {
        self.end.as_deref()
    }

    /// The current level has nothing left in range; move to the next one.
    /// Returns true once every level is done.
    pub(crate) fn level_done(&self) -> bool {
        let finished = {
            let mut state = lock!(self.state);
            if state.level >= state.last_level {
                true
            } else {
                state.level += 1;
                state.begin = self.begin.clone();
                false
            }
        };
        if finished {
            self.finish(Ok(()));
        }
        finished
    }

    /// Continue the current level after `key`.
    pub(crate) fn advance(&self, key: Vec<u8>) {
        lock!(self.state).begin = Some(key);
    }

    pub(crate) fn finish(&self, outcome: DResult<()>) {
        let mut state = lock!(self.state);
        if state.outcome.is_none() {
            state.outcome = Some(outcome);
        }
        self.done.notify_all();
    }

    pub(crate) fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    pub(crate) fn is_done(&self) -> bool {
        lock!(self.state).outcome.is_some()
    }
}

/// Returned by `request_manual_compaction`. Dropping the handle does not
/// cancel the request.
#[derive(Clone, Debug)]
pub struct ManualCompactionHandle {
    inner: Arc<ManualCompaction>,
    /// Wakes a compaction worker so a cancel is noticed.
    wake: Sender<()>,
}

impl ManualCompactionHandle {
    pub(crate) fn new(inner: Arc<ManualCompaction>, wake: Sender<()>) -> Self {
        Self { inner, wake }
    }

    /// Cancel the request. A chunk already running completes; no further
    /// chunk is dequeued.
    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::Release);
        ignore!(self.wake.try_send(()));
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.is_canceled()
    }

    pub fn is_done(&self) -> bool {
        self.inner.is_done()
    }

    /// Block until the request finished, failed or was canceled.
    pub fn wait(&self) -> DResult<()> {
        let mut state = lock!(self.inner.state);
        loop {
            if let Some(outcome) = &state.outcome {
                return outcome.clone();
            }
            state = match self.inner.done.wait_timeout(state, Duration::from_millis(100)) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Like `wait`, but gives up after `timeout` and returns None.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<DResult<()>> {
        let state = lock!(self.inner.state);
        if let Some(outcome) = &state.outcome {
            return Some(outcome.clone());
        }
        let (state, _) = match self.inner.done.wait_timeout(state, timeout) {
            Ok(r) => r,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.outcome.clone()
    }
}

pub(crate) fn canceled_error() -> DError {
    DError::CustomError("manual compaction canceled")
}
