use crate::db::edit_log::EditLog;
use crate::db::errors::DResult;
use crate::db::level_size::LevelSizeModel;
use crate::db::level_state::LevelState;
use crate::db::options::Options;
use crate::db::scorer::score_levels;
use crate::db::version::Version;
use crate::db::version_builder::Builder;
use crate::db::version_edit::VersionEdit;
use crate::utils::cmp::Comparator;
use atomic_float::AtomicF64;
use hashbrown::HashSet;
use slog::{error, Logger};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock, Weak};
use std::time::Duration;

/// Owns the sequence of published versions.
///
/// Every change goes through `log_and_apply`, which holds the writer lock
/// while it builds the new version, persists the edit and swaps the current
/// pointer, so publishes are totally ordered by version number. Readers
/// only clone the current `Arc<Version>`.
pub(crate) struct VersionSet {
    options: Arc<Options>,
    model: LevelSizeModel,
    cmp: Arc<dyn Comparator + Send + Sync>,
    edit_log: Arc<dyn EditLog>,
    log: Logger,

    current: RwLock<Arc<Version>>,
    /// Versions that may still be borrowed by readers or running jobs.
    live_versions: Mutex<Vec<Weak<Version>>>,
    /// Serializes build + persist + swap.
    writer: Mutex<()>,
    /// In order to compact each level as evenly as possible, the largest key
    /// of the last compaction at a level is where the next one starts.
    /// Either empty or a valid key.
    compact_pointer: Mutex<Vec<Vec<u8>>>,
    next_file_number: AtomicU64,
    max_score: AtomicF64,

    /// Number of the last published version; paired with `published`.
    last_published: Mutex<u64>,
    published: Condvar,
}

impl VersionSet {
    pub fn new(options: Arc<Options>, edit_log: Arc<dyn EditLog>, log: Logger) -> Self {
        let model = LevelSizeModel::new(&options);
        let cmp = options.comparator.clone();
        let levels = vec![LevelState::default(); options.num_levels];
        let scores = score_levels(&levels, &model, options.level0_file_num_compaction_trigger);
        let first = Arc::new(Version::new(0, levels, cmp.clone(), scores));
        Self {
            compact_pointer: Mutex::new(vec![vec![]; options.num_levels]),
            live_versions: Mutex::new(vec![Arc::downgrade(&first)]),
            current: RwLock::new(first),
            writer: Mutex::new(()),
            next_file_number: AtomicU64::new(1),
            max_score: AtomicF64::new(0.0),
            last_published: Mutex::new(0),
            published: Condvar::new(),
            options,
            model,
            cmp,
            edit_log,
            log,
        }
    }

    pub fn current(&self) -> Arc<Version> {
        read_lock!(self.current).clone()
    }

    pub fn options(&self) -> &Arc<Options> {
        &self.options
    }

    pub fn model(&self) -> &LevelSizeModel {
        &self.model
    }

    /// Highest compaction score of the current version.
    pub fn max_score(&self) -> f64 {
        self.max_score.load(Ordering::Acquire)
    }

    // Apply edit to the current version to form a new descriptor that
    // is both saved to persistent state and installed as the new
    // current version.
    pub fn log_and_apply(&self, edit: &mut VersionEdit) -> DResult<Arc<Version>> {
        let _writer = lock!(self.writer);
        edit.set_next_file(self.next_file_number.load(Ordering::Acquire));
        let base = self.current();
        let mut builder = Builder::new(&base, self.cmp.clone());
        builder.apply(edit)?;
        let levels = builder.save_to()?;

        if let Err(e) = self.edit_log.persist_edit(edit) {
            error!(self.log, "edit log write failed: {}", e);
            return Err(e);
        }
        Ok(self.install(base.number() + 1, levels, edit))
    }

    /// Install the layout replayed from the edit log without persisting it
    /// again.
    pub fn recover(&self, edit: &VersionEdit) -> DResult<Arc<Version>> {
        let _writer = lock!(self.writer);
        let base = self.current();
        let mut builder = Builder::new(&base, self.cmp.clone());
        builder.apply(edit)?;
        let levels = builder.save_to()?;
        if let Some(n) = edit.next_file_number() {
            self.mark_file_number_used(n.saturating_sub(1));
        }
        for (_, f) in edit.get_new_files() {
            self.mark_file_number_used(f.get_file_number());
        }
        Ok(self.install(base.number() + 1, levels, edit))
    }

    fn install(&self, number: u64, levels: Vec<LevelState>, edit: &VersionEdit) -> Arc<Version> {
        let scores = score_levels(
            &levels,
            &self.model,
            self.options.level0_file_num_compaction_trigger,
        );
        let v = Arc::new(Version::new(number, levels, self.cmp.clone(), scores));
        {
            let mut cp = lock!(self.compact_pointer);
            for (level, key) in edit.get_compact_pointers() {
                if let Some(p) = cp.get_mut(*level) {
                    *p = key.clone();
                }
            }
        }
        {
            let mut live = lock!(self.live_versions);
            live.retain(|w| w.strong_count() > 0);
            live.push(Arc::downgrade(&v));
        }
        self.max_score.store(v.max_score(), Ordering::Release);
        *write_lock!(self.current) = v.clone();

        *lock!(self.last_published) = number;
        self.published.notify_all();
        v
    }

    /// Block until a version newer than `seen` is published, or `timeout`
    /// passes. Returns the number of the last published version.
    pub fn wait_for_publish(&self, seen: u64, timeout: Duration) -> u64 {
        let guard = lock!(self.last_published);
        if *guard != seen {
            return *guard;
        }
        match self.published.wait_timeout(guard, timeout) {
            Ok((guard, _)) => *guard,
            Err(poisoned) => *poisoned.into_inner().0,
        }
    }

    /// Wake every thread blocked in `wait_for_publish`.
    pub fn notify_waiters(&self) {
        let _guard = lock!(self.last_published);
        self.published.notify_all();
    }

    pub fn compact_pointer(&self, level: usize) -> Vec<u8> {
        lock!(self.compact_pointer)
            .get(level)
            .cloned()
            .unwrap_or_default()
    }

    // We update this immediately instead of waiting for the edit to be
    // applied so that if the compaction fails, we will try a different key
    // range next time.
    pub fn set_compact_pointer(&self, level: usize, key: &[u8]) {
        if let Some(p) = lock!(self.compact_pointer).get_mut(level) {
            *p = key.to_vec();
        }
    }

    /// Allocate and return a new file number.
    pub fn new_file_number(&self) -> u64 {
        self.next_file_number.fetch_add(1, Ordering::AcqRel)
    }

    /// Mark the specified file number as used.
    pub fn mark_file_number_used(&self, num: u64) {
        self.next_file_number.fetch_max(num + 1, Ordering::AcqRel);
    }

    /// Files referenced by any version that may still be in use.
    pub fn live_files(&self) -> HashSet<u64> {
        let mut live = HashSet::new();
        self.current().add_live_files(&mut live);
        for w in lock!(self.live_versions).iter() {
            if let Some(v) = w.upgrade() {
                v.add_live_files(&mut live);
            }
        }
        live
    }
}
