use crate::db::compaction::{
    canceled_error, Compaction, CompactionState, CompactionStats, Footprint, ManualCompaction,
};
use crate::db::config::{BACKGROUND_ERROR_CAPACITY, WORKER_POLL_MILLIS};
use crate::db::engine::CompactionFailure;
use crate::db::errors::{DError, DResult};
use crate::db::file_meta::FileMetaData;
use crate::db::merger::MergingIterator;
use crate::db::options::{FilterDecision, Options};
use crate::db::picker::CompactionPicker;
use crate::db::scorer::candidates;
use crate::db::version::Version;
use crate::db::version_edit::VersionEdit;
use crate::db::version_set::VersionSet;
use crate::env::Limiter;
use crate::table::{KvIter, TableStorage};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use hashbrown::HashSet;
use slog::{crit, debug, error, info, warn, Logger};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

fn key_or(key: Option<&[u8]>, none: &str) -> String {
    key.map_or_else(|| none.to_owned(), |k| String::from_utf8_lossy(k).into_owned())
}

enum Outcome {
    /// Nothing runnable was found.
    Idle,
    Done,
    Failed,
}

/// A job that failed. Automatic picks skip its range until it may succeed.
struct FailedJob {
    footprint: Footprint,
    /// Transient failures are retried on the next trigger, others once the
    /// layout has changed.
    transient: bool,
    version: u64,
}

#[derive(Default)]
struct ObsoleteFiles {
    /// Every table number a published version has referenced.
    known: HashSet<u64>,
    last_sweep_micros: Option<u64>,
}

/// Runs compactions on a bounded pool of worker threads.
///
/// Workers block on the wake-up channel. A woken worker picks one job whose
/// footprint does not conflict with any running job, publishes its result
/// through the `VersionSet` and asks for another wake-up if more work may
/// be ready.
pub(crate) struct Scheduler {
    options: Arc<Options>,
    log: Logger,
    versions: Arc<VersionSet>,
    storage: Arc<dyn TableStorage>,

    limiter: Limiter,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    shutting_down: AtomicBool,
    /// Set once a corruption is found under paranoid checks.
    bg_error: RwLock<Option<DError>>,
    failures: Sender<CompactionFailure>,

    in_flight: Mutex<Vec<Footprint>>,
    failed: Mutex<Vec<FailedJob>>,
    manual: Mutex<VecDeque<Arc<ManualCompaction>>>,
    pending_outputs: Mutex<HashSet<u64>>,
    stats: Mutex<Vec<CompactionStats>>,
    obsolete: Mutex<ObsoleteFiles>,
}

impl Scheduler {
    pub(crate) fn new(
        versions: Arc<VersionSet>,
        storage: Arc<dyn TableStorage>,
        log: Logger,
    ) -> (Self, Receiver<CompactionFailure>) {
        let options = versions.options().clone();
        let (wake_tx, wake_rx) = crossbeam_channel::unbounded();
        let (failures, failures_rx) = crossbeam_channel::bounded(BACKGROUND_ERROR_CAPACITY);
        let sched = Self {
            limiter: Limiter::new(options.max_background_compactions as i64),
            stats: Mutex::new(vec![CompactionStats::default(); options.num_levels]),
            options,
            log,
            versions,
            storage,
            wake_tx,
            wake_rx,
            shutting_down: AtomicBool::new(false),
            bg_error: RwLock::new(None),
            failures,
            in_flight: Mutex::new(vec![]),
            failed: Mutex::new(vec![]),
            manual: Mutex::new(VecDeque::new()),
            pending_outputs: Mutex::new(HashSet::new()),
            obsolete: Mutex::new(ObsoleteFiles::default()),
        };
        (sched, failures_rx)
    }

    /// The fatal error if one was recorded, else `ShuttingDown` after close.
    pub(crate) fn status(&self) -> DResult<()> {
        if let Some(e) = read_lock!(self.bg_error).as_ref() {
            return Err(e.clone());
        }
        if self.is_shutting_down() {
            return Err(DError::ShuttingDown);
        }
        Ok(())
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    pub(crate) fn waker(&self) -> Sender<()> {
        self.wake_tx.clone()
    }

    pub(crate) fn stats(&self) -> Vec<CompactionStats> {
        lock!(self.stats).clone()
    }

    /// Number of compactions running right now.
    pub(crate) fn running(&self) -> usize {
        lock!(self.in_flight).len()
    }

    /// Called on every outside trigger: flushes, writes, seek misses and
    /// manual requests. Failed ranges become eligible again.
    pub(crate) fn maybe_schedule_compaction(&self) {
        let current = self.versions.current().number();
        lock!(self.failed).retain(|j| !j.transient && j.version == current);
        self.schedule_more();
    }

    /// Wake a worker if there may be work, without retrying failed ranges.
    fn schedule_more(&self) {
        if self.is_shutting_down() {
            // No more background work when shutting down.
            debug!(self.log, "shutting down");
        } else if read_lock!(self.bg_error).is_some() {
            // Already got an error; no more changes
            debug!(self.log, "bg error");
        } else if lock!(self.manual).is_empty()
            && candidates(&self.versions.current(), &self.options).is_empty()
        {
            // No work to be done
        } else if self.wake_tx.len() < self.options.max_background_compactions {
            ignore!(self.wake_tx.send(()));
        }
    }

    /// Body of a compaction worker thread.
    pub(crate) fn run_worker(&self, id: usize) {
        debug!(self.log, "start the compaction worker {}", id);
        let tick = Duration::from_millis(WORKER_POLL_MILLIS);
        loop {
            match self.wake_rx.recv_timeout(tick) {
                Ok(()) => {}
                Err(RecvTimeoutError::Timeout) if !self.is_shutting_down() => continue,
                Err(_) => break,
            }
            // close() sends a fake wake-up to every worker.
            if self.is_shutting_down() {
                break;
            }
            if self.status().is_err() {
                // No more background work after a fatal error.
                continue;
            }
            match self.background_compaction() {
                Outcome::Done => {
                    // Previous compaction may have produced too many files in a level,
                    // so reschedule another compaction if needed.
                    self.schedule_more();
                }
                Outcome::Failed => {
                    // The failed range is skipped until the next trigger;
                    // disjoint work and queued manual requests go on.
                    self.schedule_more();
                }
                Outcome::Idle => {}
            }
            self.versions.notify_waiters();
        }
        info!(self.log, "compaction worker {} shutting down", id);
    }

    /// Stop handing out work and wake every worker and waiter.
    pub(crate) fn shutdown(&self, workers: usize) {
        self.shutting_down.store(true, Ordering::Release);
        for _ in 0..workers {
            ignore!(self.wake_tx.send(()));
        }
        for m in lock!(self.manual).drain(..) {
            m.finish(Err(DError::ShuttingDown));
        }
        self.versions.notify_waiters();
    }

    pub(crate) fn enqueue_manual(&self, m: Arc<ManualCompaction>) {
        lock!(self.manual).push_back(m);
        self.maybe_schedule_compaction();
    }

    /// Publish a flushed table at the deepest level it may be placed at
    /// (`max_level` 0 keeps it in level 0). No new compaction can be picked
    /// meanwhile, so a level is never chosen under a running job.
    pub(crate) fn install_flushed(
        &self,
        file: FileMetaData,
        max_level: usize,
    ) -> DResult<(usize, Arc<Version>)> {
        let in_flight = lock!(self.in_flight);
        let v = self.versions.current();
        let cmp = self.options.comparator.clone();
        let (smallest, largest) = (file.get_smallest(), file.get_largest());
        let mut level = if max_level > 0 {
            v.pick_level_for_memtable_output(smallest, largest, max_level, self.versions.model())
        } else {
            0
        };
        while level > 0
            && in_flight
                .iter()
                .any(|fp| fp.touches(level, smallest, largest, cmp.as_ref()))
        {
            level -= 1;
        }
        self.versions.mark_file_number_used(file.get_file_number());
        let mut edit = VersionEdit::new();
        edit.add_file(level, file);
        let v = self.versions.log_and_apply(&mut edit)?;
        drop(in_flight);
        self.after_publish(&v);
        Ok((level, v))
    }

    /// Housekeeping after a version was published outside of a compaction.
    pub(crate) fn after_publish(&self, v: &Arc<Version>) {
        self.track(v);
        self.delete_obsolete_files();
        self.maybe_schedule_compaction();
    }

    /// Remember the tables of `v` so they are deleted once unreferenced.
    fn track(&self, v: &Version) {
        v.add_live_files(&mut lock!(self.obsolete).known);
    }

    /// Pick and run one compaction.
    fn background_compaction(&self) -> Outcome {
        if !self.limiter.acquire() {
            debug!(self.log, "no free compaction slot");
            return Outcome::Idle;
        }
        defer!(self.limiter.release());
        let (c, footprint) = match self.next_job() {
            Some(job) => job,
            None => return Outcome::Idle,
        };
        defer! {
            lock!(self.in_flight).retain(|f| f != &footprint);
        }
        // Another worker may find a disjoint job meanwhile.
        self.schedule_more();

        let level = c.level();
        let manual = c.manual().cloned();
        let manual_end = c.compact_pointer();
        match self.run_compaction(c) {
            Ok(()) => {
                if let (Some(m), Some(end)) = (&manual, manual_end) {
                    // Compact part of the requested range.
                    m.advance(end);
                }
                self.delete_obsolete_files();
                Outcome::Done
            }
            Err(e) => {
                if let Some(m) = &manual {
                    m.finish(Err(e.clone()));
                } else {
                    self.skip_failed(footprint.clone(), &e);
                }
                self.record_background_error(level, manual.is_some(), e);
                Outcome::Failed
            }
        }
    }

    fn skip_failed(&self, footprint: Footprint, e: &DError) {
        let transient = e.is_transient();
        if !transient {
            warn!(
                self.log,
                "level-{} compaction failed with {}; not retried before the layout changes",
                footprint.level,
                e
            );
        }
        lock!(self.failed).push(FailedJob {
            footprint,
            transient,
            version: self.versions.current().number(),
        });
    }

    /// Choose the next job, manual requests first, and register its
    /// footprint as running. Automatic picks also avoid failed ranges.
    fn next_job(&self) -> Option<(Compaction, Footprint)> {
        let mut in_flight = lock!(self.in_flight);
        let v = self.versions.current();
        let job = {
            let cmp = self.options.comparator.clone();
            let running =
                |fp: &Footprint| in_flight.iter().any(|f| f.conflicts_with(fp, cmp.as_ref()));
            let picker = CompactionPicker::new(&v, self.versions.model(), &self.log, &running);
            match self.pick_manual(&v, &picker, in_flight.is_empty()) {
                Some(c) => Some(c),
                None => {
                    let failed = lock!(self.failed);
                    let busy = |fp: &Footprint| {
                        running(fp)
                            || failed
                                .iter()
                                .any(|j| j.footprint.conflicts_with(fp, cmp.as_ref()))
                    };
                    let picker =
                        CompactionPicker::new(&v, self.versions.model(), &self.log, &busy);
                    self.pick_auto(&v, &picker)
                }
            }
        };
        let c = job?;
        let footprint = c.footprint();
        in_flight.push(footprint.clone());
        if let Some(pointer) = c.compact_pointer() {
            self.versions.set_compact_pointer(c.level(), &pointer);
        }
        Some((c, footprint))
    }

    fn pick_manual(
        &self,
        v: &Arc<Version>,
        picker: &CompactionPicker<'_>,
        idle: bool,
    ) -> Option<Compaction> {
        let mut queue = lock!(self.manual);
        queue.retain(|m| {
            if m.is_canceled() && !m.is_done() {
                info!(self.log, "manual compaction canceled");
                m.finish(Err(canceled_error()));
            }
            !m.is_done()
        });
        while let Some(m) = queue.front().cloned() {
            let (level, begin) = match m.next_chunk() {
                Some(chunk) => chunk,
                None => {
                    queue.pop_front();
                    continue;
                }
            };
            if let Some(mut c) = picker.compact_range(level, begin.as_deref(), m.end()) {
                if c.level() == level {
                    info!(
                        self.log,
                        "Manual compaction at level-{} from {} .. {}; will stop at {}",
                        level,
                        key_or(begin.as_deref(), "(begin)"),
                        key_or(m.end(), "(end)"),
                        key_or(c.compact_pointer().as_deref(), "(end)")
                    );
                    c.set_manual(m.clone());
                }
                return Some(c);
            }
            let pending = level + 1 < v.num_levels()
                && v.overlap_in_level(level, begin.as_deref(), m.end());
            if pending {
                if !idle {
                    // The range is under a running compaction; retry once it is done.
                    return None;
                }
                warn!(
                    self.log,
                    "manual compaction at level-{} can not proceed within the compaction limits; skipping the level",
                    level
                );
            }
            if m.level_done() {
                info!(self.log, "manual compaction done");
                queue.pop_front();
            }
        }
        None
    }

    fn pick_auto(&self, v: &Arc<Version>, picker: &CompactionPicker<'_>) -> Option<Compaction> {
        for candidate in candidates(v, &self.options) {
            let pointer = self.versions.compact_pointer(candidate.level);
            if let Some(c) = picker.pick(&candidate, &pointer) {
                debug!(
                    self.log,
                    "picked {:?} compaction at level-{}",
                    candidate.reason,
                    c.level()
                );
                return Some(c);
            }
        }
        None
    }

    fn run_compaction(&self, mut c: Compaction) -> DResult<()> {
        if c.is_trivial_move() {
            // Move file to next level
            let f = c.inputs(0)[0].clone();
            let level = c.level();
            c.edit_mut().delete_file(level, f.get_file_number());
            c.edit_mut().add_file(level + 1, f.as_ref().clone());
            let ret = self.versions.log_and_apply(c.edit_mut());
            info!(
                self.log,
                "Moved #{} to level-{} {} bytes {}: {}",
                f.get_file_number(),
                level + 1,
                f.get_file_size(),
                if ret.is_ok() { "OK" } else { "failed" },
                self.versions.current().level_summary()
            );
            return ret.map(|_| ());
        }
        let mut compact = CompactionState::new(c);
        let ret = self.do_compaction_work(&mut compact);
        self.cleanup_compaction(&mut compact, ret.is_err());
        ret
    }

    /// Inputs newest first: level-0 files by descending file number, then
    /// the rest of level L, then level L+1.
    fn make_input_iterator(&self, c: &Compaction) -> DResult<MergingIterator> {
        let mut files = c.inputs(0).to_vec();
        if c.level() == 0 {
            files.sort_by(|a, b| b.get_file_number().cmp(&a.get_file_number()));
        }
        let mut children: Vec<KvIter> = Vec::with_capacity(files.len() + c.num_input_files(1));
        for f in files.iter().chain(c.inputs(1).iter()) {
            children.push(self.storage.open_for_read(f.get_file_number())?);
        }
        Ok(MergingIterator::new(self.options.comparator.clone(), children))
    }

    fn do_compaction_work(&self, compact: &mut CompactionState) -> DResult<()> {
        let env = self.options.env.clone();
        let start_micros = env.now_micros();
        info!(
            self.log,
            "Compacting {}@{} + {}@{} files",
            compact.compaction.num_input_files(0),
            compact.compaction.level(),
            compact.compaction.num_input_files(1),
            compact.compaction.level() + 1,
        );
        let cmp = self.options.comparator.clone();
        let filter = self.options.compaction_filter.clone();
        let level = compact.compaction.level();
        let mut last_key: Option<Vec<u8>> = None;
        let mut ret = Ok(());

        for item in self.make_input_iterator(&compact.compaction)? {
            let (key, mut value) = match item {
                Ok(kv) => kv,
                Err(e) => {
                    ret = Err(e);
                    break;
                }
            };
            if self.options.paranoid_checks {
                if let Some(prev) = &last_key {
                    if !cmp.lt(prev, &key) {
                        ret = Err(DError::Corruption(format!(
                            "compaction input at level-{} out of order: {:?} after {:?}",
                            level,
                            String::from_utf8_lossy(&key),
                            String::from_utf8_lossy(prev)
                        )));
                        break;
                    }
                }
                last_key = Some(key.clone());
            }
            if compact.compaction.should_stop_before(&key) && compact.builder.is_some() {
                ret = self.finish_compaction_output_file(compact);
                if ret.is_err() {
                    break;
                }
            }
            if let Some(f) = &filter {
                match f.filter(level, &key, &value) {
                    FilterDecision::Keep => {}
                    FilterDecision::Remove => {
                        // A deeper level may still hold the key.
                        if compact.compaction.is_base_level_for_key(&key) {
                            continue;
                        }
                    }
                    FilterDecision::ChangeValue(v) => value = v,
                }
            }
            // Open output file if necessary
            if compact.builder.is_none() {
                ret = self.open_compaction_output_file(compact);
                if ret.is_err() {
                    break;
                }
            }
            let full = match compact.builder.as_mut() {
                Some(b) => {
                    ret = b.add(&key, &value);
                    b.file_size() >= compact.compaction.max_output_file_size()
                }
                None => false,
            };
            if ret.is_err() {
                break;
            }
            // Close output file if it is big enough
            if full {
                ret = self.finish_compaction_output_file(compact);
                if ret.is_err() {
                    break;
                }
            }
        }
        if ret.is_ok() && compact.builder.is_some() {
            ret = self.finish_compaction_output_file(compact);
        }

        let stats = CompactionStats {
            micros: env.now_micros().saturating_sub(start_micros),
            read_bytes: compact.compaction.input_bytes(0) + compact.compaction.input_bytes(1),
            written_bytes: compact.outputs.iter().map(|o| o.get_file_size()).sum(),
            count: 1,
        };
        if let Some(s) = lock!(self.stats).get_mut(compact.compaction.output_level()) {
            *s += stats;
        }

        if ret.is_ok() {
            ret = self.install_compaction_results(compact);
        }
        info!(
            self.log,
            "compacted to: {}",
            self.versions.current().level_summary()
        );
        ret
    }

    fn open_compaction_output_file(&self, compact: &mut CompactionState) -> DResult<()> {
        let file_number = self.versions.new_file_number();
        lock!(self.pending_outputs).insert(file_number);
        compact.current_output = Some(file_number);
        let output_level = compact.compaction.output_level();
        let opt = self.options.table_write_options(output_level);
        compact.builder = Some(
            self.storage
                .create_writer(output_level, file_number, &opt)?,
        );
        Ok(())
    }

    fn finish_compaction_output_file(&self, compact: &mut CompactionState) -> DResult<()> {
        let builder = match compact.builder.take() {
            Some(b) => b,
            None => return Ok(()),
        };
        let entries = builder.num_entries();
        let summary = builder.finish()?;
        compact.current_output = None;
        compact.total_bytes += summary.file_size;
        info!(
            self.log,
            "Generated table #{}@{}: {} keys, {} bytes",
            summary.file_number,
            compact.compaction.level(),
            entries,
            summary.file_size
        );
        compact.outputs.push(FileMetaData::from(summary));
        Ok(())
    }

    fn install_compaction_results(&self, compact: &mut CompactionState) -> DResult<()> {
        info!(
            self.log,
            "Compacted {}@{} + {}@{} files => {} bytes",
            compact.compaction.num_input_files(0),
            compact.compaction.level(),
            compact.compaction.num_input_files(1),
            compact.compaction.level() + 1,
            compact.total_bytes
        );
        // Add compaction outputs
        compact.compaction.add_input_deletions();
        let output_level = compact.compaction.output_level();
        for out in &compact.outputs {
            compact.compaction.edit_mut().add_file(output_level, out.clone());
        }
        let v = self.versions.log_and_apply(compact.compaction.edit_mut())?;
        self.track(&v);
        Ok(())
    }

    fn cleanup_compaction(&self, compact: &mut CompactionState, failed: bool) {
        if let Some(b) = compact.builder.take() {
            b.abandon();
        }
        let mut numbers: Vec<u64> = compact.outputs.iter().map(|o| o.get_file_number()).collect();
        numbers.extend(compact.current_output.take());
        if failed {
            // Nothing references the outputs of a failed compaction.
            for n in &numbers {
                ignore!(self.storage.delete_table(*n));
            }
        }
        let mut pending = lock!(self.pending_outputs);
        for n in &numbers {
            pending.remove(n);
        }
    }

    fn record_background_error(&self, level: usize, manual: bool, e: DError) {
        if self.is_shutting_down() {
            // Ignore compaction errors found during shutting down
            info!(self.log, "Compaction error during shutdown: {}", e);
            return;
        }
        error!(self.log, "Compaction error at level-{}: {}", level, e);
        let fatal = self.options.paranoid_checks && e.is_corruption();
        if fatal {
            crit!(
                self.log,
                "paranoid check failed during compaction at level-{}: {}; no further writes are admitted",
                level,
                e
            );
            *write_lock!(self.bg_error) = Some(DError::Fatal(e.to_string()));
            self.versions.notify_waiters();
        }
        ignore!(self.failures.try_send(CompactionFailure {
            level,
            manual,
            error: e,
            fatal,
        }));
    }

    /// Delete tables referenced by no live version and not being written.
    fn delete_obsolete_files(&self) {
        if read_lock!(self.bg_error).is_some() {
            // After a fatal error, we don't know which tables are still
            // needed, so we cannot safely garbage collect.
            return;
        }
        let now = self.options.env.now_micros();
        let mut obsolete = lock!(self.obsolete);
        self.versions.current().add_live_files(&mut obsolete.known);
        let period = self.options.delete_obsolete_files_period_micros;
        if let Some(last) = obsolete.last_sweep_micros {
            if period > 0 && now < last.saturating_add(period) {
                return;
            }
        }
        obsolete.last_sweep_micros = Some(now);

        let mut live = self.versions.live_files();
        live.extend(lock!(self.pending_outputs).iter().copied());
        let dead: Vec<u64> = obsolete
            .known
            .iter()
            .filter(|n| !live.contains(*n))
            .copied()
            .collect();
        for n in dead {
            match self.storage.delete_table(n) {
                Ok(()) => {
                    info!(self.log, "Delete table #{}", n);
                    obsolete.known.remove(&n);
                }
                Err(e) => warn!(self.log, "failed to delete table #{}: {}", n, e),
            }
        }
    }
}
