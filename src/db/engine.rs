use crate::db::compaction::{ManualCompaction, ManualCompactionHandle};
use crate::db::config::{
    MAX_SCORE_PROPERTY, NUM_FILES_PROPERTY, PROPERTY_PREFIX, SSTABLES_PROPERTY, STATS_PROPERTY,
};
use crate::db::edit_log::EditLog;
use crate::db::errors::{DError, DResult};
use crate::db::file_meta::FileMetaData;
use crate::db::options::{sanitize_options, Options};
use crate::db::scheduler::Scheduler;
use crate::db::version::Version;
use crate::db::version_edit::VersionEdit;
use crate::db::version_set::VersionSet;
use crate::db::write_controller::{WriteController, WriteStallState};
use crate::table::TableStorage;
use crate::utils::logger::discard_logger;
use crossbeam_channel::Receiver;
use slog::{debug, info, Logger};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// A compaction that failed. The version it started from is left
/// unchanged; unless `fatal`, the same work is retried later.
#[derive(Debug, Clone)]
pub struct CompactionFailure {
    pub level: usize,
    pub manual: bool,
    pub error: DError,
    /// The failure put the engine into its fatal state.
    pub fatal: bool,
}

/// The compaction policy and write admission surface used by the write
/// path, the flush path and the read path of a storage engine.
pub trait CompactionEngine: Send + Sync {
    /// Hold the calling writer per the level-0 triggers and the rate
    /// limit. Returns once the write may be appended.
    fn admit(&self, estimated_bytes: u64) -> DResult<()>;

    /// Like `admit`, for writes carrying merge operands. Fails with
    /// `NotSupported` when no merge operator is configured.
    fn admit_merge(&self, estimated_bytes: u64) -> DResult<()>;

    /// Register a freshly flushed table at level 0.
    fn notify_flushed(&self, file: FileMetaData) -> DResult<Arc<Version>>;

    /// Register a freshly flushed table at the deepest level up to
    /// `max_mem_compaction_level` where it overlaps nothing. Returns the
    /// level chosen.
    fn notify_flushed_pushdown(&self, file: FileMetaData) -> DResult<usize>;

    /// Queue a compaction of [begin, end] (`None` meaning unbounded) at
    /// `level`, or at every level holding data in range when `level` is
    /// `None`.
    fn request_manual_compaction(
        &self,
        level: Option<usize>,
        begin: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> DResult<ManualCompactionHandle>;

    fn current_version(&self) -> Arc<Version>;

    /// Charge a read that had to look past `file` at `level` of `version`.
    fn record_seek_miss(&self, version: &Arc<Version>, level: usize, file: &Arc<FileMetaData>);

    /// Allocate a table number for a flush.
    fn new_file_number(&self) -> u64;

    fn stall_state(&self) -> WriteStallState;

    /// Valid property names include:
    /// - dakv.num-files-at-level<N>
    /// - dakv.stats
    /// - dakv.sstables
    /// - dakv.max-compaction-score
    fn get_property(&self, property: &str) -> Option<String>;

    /// Failed compactions, for operators.
    fn background_errors(&self) -> Receiver<CompactionFailure>;

    /// Stop the workers after their running jobs and release blocked writers.
    fn close(&self) -> DResult<()>;
}

pub struct LsmEngine {
    options: Arc<Options>,
    log: Logger,
    versions: Arc<VersionSet>,
    sched: Arc<Scheduler>,
    controller: WriteController,
    failures: Receiver<CompactionFailure>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    admitted_bytes: AtomicU64,
}

impl LsmEngine {
    /// Start an engine over an empty layout.
    pub fn open(
        options: Options,
        storage: Arc<dyn TableStorage>,
        edit_log: Arc<dyn EditLog>,
    ) -> DResult<Self> {
        let engine = Self::new(options, storage, edit_log)?;
        engine.start_compaction_workers()?;
        Ok(engine)
    }

    /// Start an engine over the layout described by `base_edit`, replayed
    /// from the edit log by the caller. The edit is not persisted again.
    pub fn recover(
        options: Options,
        storage: Arc<dyn TableStorage>,
        edit_log: Arc<dyn EditLog>,
        base_edit: &VersionEdit,
    ) -> DResult<Self> {
        let engine = Self::new(options, storage, edit_log)?;
        let v = engine.versions.recover(base_edit)?;
        info!(
            engine.log,
            "recovered version {}: {}",
            v.number(),
            v.level_summary()
        );
        engine.start_compaction_workers()?;
        engine.sched.after_publish(&v);
        Ok(engine)
    }

    fn new(
        options: Options,
        storage: Arc<dyn TableStorage>,
        edit_log: Arc<dyn EditLog>,
    ) -> DResult<Self> {
        let options = sanitize_options(options)?;
        let log = options.info_log.clone().unwrap_or_else(discard_logger);
        options.dump(&log);
        let options = Arc::new(options);
        let versions = Arc::new(VersionSet::new(options.clone(), edit_log, log.clone()));
        let (sched, failures) = Scheduler::new(versions.clone(), storage, log.clone());
        let controller = WriteController::new(versions.clone(), log.clone());
        Ok(Self {
            options,
            log,
            versions,
            sched: Arc::new(sched),
            controller,
            failures,
            workers: Mutex::new(vec![]),
            admitted_bytes: AtomicU64::new(0),
        })
    }

    fn start_compaction_workers(&self) -> DResult<()> {
        let mut workers = lock!(self.workers);
        for id in 0..self.options.max_background_compactions {
            let sched = self.sched.clone();
            let handle = thread::Builder::new()
                .name(format!("compact-{}", id))
                .spawn(move || sched.run_worker(id))?;
            workers.push(handle);
        }
        Ok(())
    }

    fn stats_string(&self) -> String {
        let v = self.versions.current();
        let stats = self.sched.stats();
        let mut data = String::default();
        data.push_str("                               Compactions\n");
        data.push_str("Level  Files Size(MB) Time(sec) Read(MB) Write(MB)  Count\n");
        data.push_str("--------------------------------------------------------\n");
        for (level, s) in stats.iter().enumerate() {
            let files = v.num_level_files(level);
            if s.micros > 0 || s.count > 0 || files > 0 {
                data.push_str(&format!(
                    "{:3} {:8} {:8.0} {:9.0} {:8.0} {:9.0} {:6}\n",
                    level,
                    files,
                    v.num_level_bytes(level) as f64 / 1048576.0,
                    s.micros as f64 / 1e6,
                    s.read_bytes as f64 / 1048576.0,
                    s.written_bytes as f64 / 1048576.0,
                    s.count
                ));
            }
        }
        data.push_str(&self.controller.stats().to_string());
        data.push_str(&format!(
            "Admitted(MB): {:.3}, running compactions: {}\n",
            self.admitted_bytes.load(Ordering::Acquire) as f64 / 1048576.0,
            self.sched.running()
        ));
        data
    }
}

impl CompactionEngine for LsmEngine {
    fn admit(&self, estimated_bytes: u64) -> DResult<()> {
        let sched = &self.sched;
        sched.maybe_schedule_compaction();
        self.controller.admit(|| {
            sched.status()?;
            sched.maybe_schedule_compaction();
            Ok(())
        })?;
        self.admitted_bytes
            .fetch_add(estimated_bytes, Ordering::AcqRel);
        Ok(())
    }

    fn admit_merge(&self, estimated_bytes: u64) -> DResult<()> {
        if self.options.merge_operator.is_none() {
            return Err(DError::NotSupported("merge operator is not configured"));
        }
        self.admit(estimated_bytes)
    }

    fn notify_flushed(&self, file: FileMetaData) -> DResult<Arc<Version>> {
        self.sched.status()?;
        let (_, v) = self.sched.install_flushed(file, 0)?;
        Ok(v)
    }

    fn notify_flushed_pushdown(&self, file: FileMetaData) -> DResult<usize> {
        self.sched.status()?;
        let number = file.get_file_number();
        let (level, _) = self
            .sched
            .install_flushed(file, self.options.max_mem_compaction_level)?;
        debug!(self.log, "flushed table #{} placed at level-{}", number, level);
        Ok(level)
    }

    fn request_manual_compaction(
        &self,
        level: Option<usize>,
        begin: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> DResult<ManualCompactionHandle> {
        self.sched.status()?;
        let v = self.versions.current();
        let num_levels = v.num_levels();
        let (first, last) = match level {
            Some(l) if l + 1 >= num_levels => {
                return Err(DError::InvalidArgument(format!(
                    "level {} has no level below it to compact into",
                    l
                )));
            }
            Some(l) => (l, l),
            None => {
                let mut max_level_with_files = 1;
                for l in 1..num_levels {
                    if v.overlap_in_level(l, begin, end) {
                        max_level_with_files = l;
                    }
                }
                (0, max_level_with_files - 1)
            }
        };
        info!(
            self.log,
            "manual compaction of levels {}..={} requested", first, last
        );
        let m = Arc::new(ManualCompaction::new(
            first,
            last,
            begin.map(|b| b.to_vec()),
            end.map(|e| e.to_vec()),
        ));
        self.sched.enqueue_manual(m.clone());
        Ok(ManualCompactionHandle::new(m, self.sched.waker()))
    }

    fn current_version(&self) -> Arc<Version> {
        self.versions.current()
    }

    fn record_seek_miss(&self, version: &Arc<Version>, level: usize, file: &Arc<FileMetaData>) {
        if self.options.disable_seek_compaction {
            return;
        }
        if version.record_seek_miss(level, file) {
            debug!(
                self.log,
                "table #{} at level-{} ran out of seeks",
                file.get_file_number(),
                level
            );
            self.sched.maybe_schedule_compaction();
        }
    }

    fn new_file_number(&self) -> u64 {
        self.versions.new_file_number()
    }

    fn stall_state(&self) -> WriteStallState {
        self.controller.state()
    }

    fn get_property(&self, property: &str) -> Option<String> {
        let property = property.strip_prefix(PROPERTY_PREFIX)?;
        let v = self.versions.current();
        if let Some(level) = property.strip_prefix(NUM_FILES_PROPERTY) {
            let level: usize = level.parse().ok()?;
            if level >= v.num_levels() {
                return None;
            }
            Some(v.num_level_files(level).to_string())
        } else if property == STATS_PROPERTY {
            Some(self.stats_string())
        } else if property == SSTABLES_PROPERTY {
            Some(v.to_string())
        } else if property == MAX_SCORE_PROPERTY {
            Some(format!("{:.3}", self.versions.max_score()))
        } else {
            None
        }
    }

    fn background_errors(&self) -> Receiver<CompactionFailure> {
        self.failures.clone()
    }

    fn close(&self) -> DResult<()> {
        if self.sched.is_shutting_down() {
            return Ok(());
        }
        debug!(self.log, "close");
        let mut workers = lock!(self.workers);
        self.sched.shutdown(workers.len());
        for w in workers.drain(..) {
            ignore!(w.join());
        }
        info!(self.log, "engine closed: {}", self.versions.current().level_summary());
        Ok(())
    }
}

impl Drop for LsmEngine {
    fn drop(&mut self) {
        ignore!(self.close());
    }
}
