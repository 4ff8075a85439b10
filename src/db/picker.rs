use crate::db::compaction::{Compaction, Footprint};
use crate::db::file_meta::FileMetaData;
use crate::db::level_size::LevelSizeModel;
use crate::db::level_state::total_file_size;
use crate::db::scorer::{Candidate, CompactionReason};
use crate::db::version::{key_range, Version};
use slog::{debug, info, warn, Logger};
use std::sync::Arc;

/// Why a set of start files did not become a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PickError {
    Empty,
    /// The level-(L+1) overlap exceeds the expansion limit.
    TooLarge,
    /// The job would conflict with a running compaction.
    Busy,
}

/// Chooses the input files of a compaction: the level-L files to start
/// from, the overlapping level-(L+1) files, and the level-(L+2) files that
/// bound the size of each output.
///
/// A pick never holds more than `expanded_compaction_limit(L)` bytes at
/// level L+1. When every start file at L would exceed it, the picker
/// compacts the overlapping part of L+1 one level further down first.
/// A start file that conflicts with a running job is never pushed down.
pub(crate) struct CompactionPicker<'a> {
    version: &'a Arc<Version>,
    model: &'a LevelSizeModel,
    log: &'a Logger,
    busy: &'a dyn Fn(&Footprint) -> bool,
}

impl<'a> CompactionPicker<'a> {
    pub(crate) fn new(
        version: &'a Arc<Version>,
        model: &'a LevelSizeModel,
        log: &'a Logger,
        busy: &'a dyn Fn(&Footprint) -> bool,
    ) -> Self {
        Self {
            version,
            model,
            log,
            busy,
        }
    }

    /// Pick the inputs for an automatic candidate. `compact_pointer` is
    /// where the previous compaction at the candidate level ended.
    pub(crate) fn pick(&self, candidate: &Candidate, compact_pointer: &[u8]) -> Option<Compaction> {
        let level = candidate.level;
        if level + 1 >= self.version.num_levels() {
            return None;
        }
        let seeds = match &candidate.seed {
            // reach the allow_seeks limit, just start from the file that needs to compact.
            Some(f) => vec![f.clone()],
            None => self.seeds_after(level, compact_pointer),
        };
        self.pick_at(level, seeds, candidate.reason)
    }

    /// Return a compaction for the range [begin, end] in `level`, or None
    /// if nothing in that level overlaps the range. The result is a job at
    /// a deeper level when the range can not be compacted within the caps
    /// yet.
    pub(crate) fn compact_range(
        &self,
        level: usize,
        begin: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Option<Compaction> {
        if level + 1 >= self.version.num_levels() {
            return None;
        }
        let mut inputs = self.version.get_overlapping_inputs(level, begin, end);
        if inputs.is_empty() {
            return None;
        }
        // Avoid compacting too much in one shot in case the range is large.
        // But we cannot do this for level-0 since level-0 files can overlap
        // and we must not pick one file and drop another older file if the
        // two files overlap.
        self.trim_to_source_cap(level, &mut inputs);
        let shortest = if level == 0 { inputs.len() } else { 1 };
        let mut too_large = true;
        for n in (shortest..=inputs.len()).rev() {
            match self.setup_other_inputs(level, inputs[..n].to_vec(), CompactionReason::Manual) {
                Ok(c) => return Some(c),
                Err(PickError::TooLarge) => {}
                Err(_) => too_large = false,
            }
        }
        if !too_large {
            return None;
        }
        self.push_down(level, &inputs)
    }

    /// Files of `level` in round-robin order, starting with the first file
    /// after `compact_pointer` and wrapping around the key space.
    fn seeds_after(&self, level: usize, compact_pointer: &[u8]) -> Vec<Arc<FileMetaData>> {
        let cmp = self.version.comparator();
        let files = self.version.files(level);
        let start = files
            .iter()
            .position(|f| compact_pointer.is_empty() || cmp.gt(f.get_largest(), compact_pointer))
            .unwrap_or(0);
        files[start..].iter().chain(files[..start].iter()).cloned().collect()
    }

    fn pick_at(
        &self,
        level: usize,
        seeds: Vec<Arc<FileMetaData>>,
        reason: CompactionReason,
    ) -> Option<Compaction> {
        let mut too_large = true;
        for seed in &seeds {
            let inputs0 = if level == 0 {
                // Files in level 0 may overlap each other, so pick up all overlapping ones
                self.version.get_overlapping_inputs(
                    0,
                    Some(seed.get_smallest()),
                    Some(seed.get_largest()),
                )
            } else {
                vec![seed.clone()]
            };
            match self.setup_other_inputs(level, inputs0, reason) {
                Ok(c) => return Some(c),
                Err(PickError::TooLarge) => {}
                Err(_) => too_large = false,
            }
        }
        // A busy start file is retried once the running job publishes.
        if !too_large {
            return None;
        }
        self.push_down(level, &seeds)
    }

    /// Every start file at `level` overlaps too much of `level+1`: compact
    /// the `level+1` files under the first one into `level+2` instead.
    fn push_down(&self, level: usize, seeds: &[Arc<FileMetaData>]) -> Option<Compaction> {
        let first = seeds.first()?;
        if level + 2 >= self.version.num_levels() {
            warn!(
                self.log,
                "level-{} inputs exceed the expansion limit of {} bytes and can not be pushed down",
                level,
                self.model.expanded_compaction_limit(level)
            );
            return None;
        }
        let below = self.version.get_overlapping_inputs(
            level + 1,
            Some(first.get_smallest()),
            Some(first.get_largest()),
        );
        info!(
            self.log,
            "level-{} overlap too large; compacting {} files of level-{} first",
            level,
            below.len(),
            level + 1
        );
        self.pick_at(level + 1, below, CompactionReason::Size)
    }

    fn trim_to_source_cap(&self, level: usize, inputs: &mut Vec<Arc<FileMetaData>>) {
        if level == 0 {
            return;
        }
        let limit = self.model.source_compaction_limit(level);
        let mut total = 0;
        for (i, f) in inputs.iter().enumerate() {
            total += f.get_file_size();
            if total > limit {
                inputs.truncate(i.max(1));
                break;
            }
        }
    }

    /// 1. get key range [smallest,largest] of the level-L inputs.
    /// 2. get overlapping files from level L+1 by that range.
    /// 3. try to add level-L files inside the combined range without
    ///    changing the level-(L+1) inputs.
    /// 4. collect the grandparents overlapping the final range.
    fn setup_other_inputs(
        &self,
        level: usize,
        mut inputs0: Vec<Arc<FileMetaData>>,
        reason: CompactionReason,
    ) -> Result<Compaction, PickError> {
        let cmp = self.version.comparator().as_ref();
        self.trim_to_source_cap(level, &mut inputs0);
        let (smallest, largest) = key_range(cmp, &inputs0).ok_or(PickError::Empty)?;
        let mut inputs1 =
            self.version
                .get_overlapping_inputs(level + 1, Some(&smallest), Some(&largest));
        let inputs1_size = total_file_size(&inputs1);
        let expanded_limit = self.model.expanded_compaction_limit(level);
        if inputs1_size > expanded_limit {
            debug!(
                self.log,
                "level-{} pick over {} overlaps {} bytes of level-{}, limit {}",
                level,
                String::from_utf8_lossy(&smallest),
                inputs1_size,
                level + 1,
                expanded_limit
            );
            return Err(PickError::TooLarge);
        }

        // Get entire range covered by compaction
        let (mut all_start, mut all_limit) =
            key_range(cmp, inputs0.iter().chain(inputs1.iter())).ok_or(PickError::Empty)?;

        // See if we can grow the number of inputs in level L without
        // changing the number of level-(L+1) files we pick up.
        if !inputs1.is_empty() {
            let expanded0 =
                self.version
                    .get_overlapping_inputs(level, Some(&all_start), Some(&all_limit));
            let inputs0_size = total_file_size(&inputs0);
            let expanded0_size = total_file_size(&expanded0);
            let within_source =
                level == 0 || expanded0_size <= self.model.source_compaction_limit(level);
            if expanded0.len() > inputs0.len()
                && inputs1_size + expanded0_size < expanded_limit
                && within_source
            {
                let (new_start, new_limit) =
                    key_range(cmp, &expanded0).ok_or(PickError::Empty)?;
                let expanded1 =
                    self.version
                        .get_overlapping_inputs(level + 1, Some(&new_start), Some(&new_limit));
                if expanded1.len() == inputs1.len() {
                    info!(
                        self.log,
                        "Expanding@{} {}+{} ({}+{} bytes) to {}+{} ({}+{} bytes)",
                        level,
                        inputs0.len(),
                        inputs1.len(),
                        inputs0_size,
                        inputs1_size,
                        expanded0.len(),
                        expanded1.len(),
                        expanded0_size,
                        inputs1_size
                    );
                    inputs0 = expanded0;
                    inputs1 = expanded1;
                    let range = key_range(cmp, inputs0.iter().chain(inputs1.iter()))
                        .ok_or(PickError::Empty)?;
                    all_start = range.0;
                    all_limit = range.1;
                }
            }
        }

        // Compute the set of grandparent files that overlap this compaction
        let grandparents = if level + 2 < self.version.num_levels() {
            self.version
                .get_overlapping_inputs(level + 2, Some(&all_start), Some(&all_limit))
        } else {
            vec![]
        };
        let mut c = Compaction::new(
            level,
            reason,
            self.version.clone(),
            [inputs0, inputs1],
            grandparents,
            self.model.target_file_size(level + 1),
            self.model.max_grandparent_overlap_bytes(level),
        );
        if (self.busy)(&c.footprint()) {
            debug!(self.log, "level-{} pick conflicts with a running compaction", level);
            return Err(PickError::Busy);
        }
        if let Some(pointer) = c.compact_pointer() {
            c.edit_mut().set_compact_pointer(level, &pointer);
        }
        Ok(c)
    }
}
