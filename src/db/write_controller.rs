use crate::db::config::{SLOWDOWN_DELAY_MICROS, STALL_WAIT_MILLIS};
use crate::db::errors::DResult;
use crate::db::options::Options;
use crate::db::version::Version;
use crate::db::version_set::VersionSet;
use slog::{debug, info, warn, Logger};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Why writers are currently held back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StallReason {
    None,
    Slowdown,
    Stop,
    RateLimited,
}

impl Default for StallReason {
    fn default() -> Self {
        StallReason::None
    }
}

/// The stall applied to the most recent write admission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteStallState {
    pub reason: StallReason,
    /// Delay still to be served by the writer being admitted.
    pub remaining_delay_micros: u64,
    /// Level that triggered the stall.
    pub level: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AdmissionDecision {
    Proceed,
    Delay {
        micros: u64,
        reason: StallReason,
        level: usize,
    },
    Block,
}

/// Decide what a write must do given the current layout.
pub(crate) fn decide(v: &Version, opt: &Options) -> AdmissionDecision {
    let l0 = v.num_level_files(0) as i64;
    if opt.level0_stop_writes_trigger >= 0 && l0 >= opt.level0_stop_writes_trigger as i64 {
        return AdmissionDecision::Block;
    }
    if opt.level0_slowdown_writes_trigger >= 0 && l0 >= opt.level0_slowdown_writes_trigger as i64 {
        // We are getting close to hitting a hard limit on the number of
        // L0 files. Rather than delaying a single write by several
        // seconds when we hit the hard limit, start delaying each
        // individual write by 1ms to reduce latency variance.
        return AdmissionDecision::Delay {
            micros: SLOWDOWN_DELAY_MICROS,
            reason: StallReason::Slowdown,
            level: 0,
        };
    }
    if opt.rate_limit > 1.0 {
        if let Some(top) = v.compaction_scores().first() {
            if top.score > opt.rate_limit {
                let micros = rate_limit_delay_micros(top.score, opt);
                if micros > 0 {
                    return AdmissionDecision::Delay {
                        micros,
                        reason: StallReason::RateLimited,
                        level: top.level,
                    };
                }
            }
        }
    }
    AdmissionDecision::Proceed
}

/// Delay grows linearly with how far `score` is past `rate_limit`, relative
/// to the limit itself: a score of twice the limit earns the full
/// `rate_limit_delay_milliseconds`. At least 1ms, at most the configured max.
pub(crate) fn rate_limit_delay_micros(score: f64, opt: &Options) -> u64 {
    let max_ms = opt.rate_limit_delay_milliseconds;
    if max_ms == 0 || score <= opt.rate_limit {
        return 0;
    }
    let excess = (score - opt.rate_limit) / opt.rate_limit;
    let ms = (max_ms as f64 * excess).ceil();
    let ms = if ms >= max_ms as f64 { max_ms } else { (ms as u64).max(1) };
    ms * 1000
}

/// Microseconds writers spent stalled, per reason.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct StallStats {
    pub(crate) slowdown_micros: u64,
    pub(crate) slowdown_count: u64,
    pub(crate) rate_limit_micros: u64,
    pub(crate) rate_limit_count: u64,
    pub(crate) stop_micros: u64,
    pub(crate) stop_count: u64,
}

impl fmt::Display for StallStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Stalls(secs): {:.3} level0_slowdown ({}), {:.3} level0_numfiles ({}), {:.3} rate_limit ({})",
            self.slowdown_micros as f64 / 1e6,
            self.slowdown_count,
            self.stop_micros as f64 / 1e6,
            self.stop_count,
            self.rate_limit_micros as f64 / 1e6,
            self.rate_limit_count
        )
    }
}

/// Applies the admission decision to writers: sleeps for delays, waits on
/// version publication for stops.
pub(crate) struct WriteController {
    versions: Arc<VersionSet>,
    options: Arc<Options>,
    log: Logger,
    state: Mutex<WriteStallState>,
    stats: Mutex<StallStats>,
}

impl WriteController {
    pub(crate) fn new(versions: Arc<VersionSet>, log: Logger) -> Self {
        let options = versions.options().clone();
        Self {
            versions,
            options,
            log,
            state: Mutex::new(WriteStallState::default()),
            stats: Mutex::new(StallStats::default()),
        }
    }

    pub(crate) fn state(&self) -> WriteStallState {
        *lock!(self.state)
    }

    pub(crate) fn stats(&self) -> StallStats {
        *lock!(self.stats)
    }

    fn set_state(&self, reason: StallReason, remaining_delay_micros: u64, level: Option<usize>) {
        *lock!(self.state) = WriteStallState {
            reason,
            remaining_delay_micros,
            level,
        };
    }

    /// Hold the caller until the write may go ahead. `check` is consulted
    /// before admitting and after every wake-up; its error aborts the wait.
    pub(crate) fn admit<F>(&self, check: F) -> DResult<()>
    where
        F: Fn() -> DResult<()>,
    {
        check()?;
        let env = self.options.env.clone();
        let mut allow_delay = true;
        let mut stopped = false;
        loop {
            let v = self.versions.current();
            match decide(&v, &self.options) {
                AdmissionDecision::Block => {
                    if !stopped {
                        stopped = true;
                        warn!(
                            self.log,
                            "level-0 has {} files, stopping writes at {}; waiting...",
                            v.num_level_files(0),
                            self.options.level0_stop_writes_trigger
                        );
                        lock!(self.stats).stop_count += 1;
                    }
                    self.set_state(StallReason::Stop, 0, Some(0));
                    let start = env.now_micros();
                    self.versions
                        .wait_for_publish(v.number(), Duration::from_millis(STALL_WAIT_MILLIS));
                    lock!(self.stats).stop_micros += env.now_micros().saturating_sub(start);
                    if let Err(e) = check() {
                        self.set_state(StallReason::None, 0, None);
                        return Err(e);
                    }
                }
                AdmissionDecision::Delay {
                    micros,
                    reason,
                    level,
                } if allow_delay => {
                    self.set_state(reason, micros, Some(level));
                    if reason == StallReason::RateLimited {
                        info!(
                            self.log,
                            "compaction score {:.2} of level-{} over rate limit {:.2}; delaying write {}us",
                            v.max_score(),
                            level,
                            self.options.rate_limit,
                            micros
                        );
                    } else {
                        debug!(self.log, "level-0 slowdown; delaying write {}us", micros);
                    }
                    env.sleep_for_microseconds(micros);
                    {
                        let mut stats = lock!(self.stats);
                        if reason == StallReason::RateLimited {
                            stats.rate_limit_micros += micros;
                            stats.rate_limit_count += 1;
                        } else {
                            stats.slowdown_micros += micros;
                            stats.slowdown_count += 1;
                        }
                    }
                    // Do not delay a single write more than once
                    allow_delay = false;
                    check()?;
                }
                _ => {
                    if stopped {
                        info!(self.log, "level-0 below stop trigger; writes resumed");
                    }
                    self.set_state(StallReason::None, 0, None);
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::edit_log::MemEditLog;
    use crate::db::file_meta::FileMetaData;
    use crate::db::version_edit::VersionEdit;
    use crate::env::TestEnv;
    use crate::utils::logger::discard_logger;

    fn controller(opt: Options) -> (Arc<VersionSet>, WriteController) {
        let vs = Arc::new(VersionSet::new(
            Arc::new(opt),
            Arc::new(MemEditLog::new()),
            discard_logger(),
        ));
        let wc = WriteController::new(vs.clone(), discard_logger());
        (vs, wc)
    }

    fn add_level0(vs: &VersionSet, n: u64) {
        let mut edit = VersionEdit::new();
        for _ in 0..n {
            let num = vs.new_file_number();
            edit.add_file(0, FileMetaData::new(num, 100, b"a".to_vec(), b"b".to_vec()));
        }
        vs.log_and_apply(&mut edit).unwrap();
    }

    #[test]
    fn test_no_delay_below_slowdown_trigger() {
        let env = Arc::new(TestEnv::new());
        let mut opt = Options::default();
        opt.env = env.clone();
        let (vs, wc) = controller(opt);
        add_level0(&vs, 7);
        for _ in 0..10 {
            wc.admit(|| Ok(())).unwrap();
        }
        assert_eq!(env.sleeps(), 0);
        assert_eq!(wc.state().reason, StallReason::None);
    }

    #[test]
    fn test_slowdown_delays_once() {
        let env = Arc::new(TestEnv::new());
        let mut opt = Options::default();
        opt.env = env.clone();
        let (vs, wc) = controller(opt);
        add_level0(&vs, 8);
        wc.admit(|| Ok(())).unwrap();
        assert_eq!(env.sleeps(), 1);
        assert_eq!(env.slept_micros(), SLOWDOWN_DELAY_MICROS);
        assert_eq!(wc.stats().slowdown_count, 1);
    }

    #[test]
    fn test_negative_triggers_disable_checks() {
        let env = Arc::new(TestEnv::new());
        let mut opt = Options::default();
        opt.env = env.clone();
        opt.level0_slowdown_writes_trigger = -1;
        opt.level0_stop_writes_trigger = -1;
        let (vs, wc) = controller(opt);
        add_level0(&vs, 20);
        wc.admit(|| Ok(())).unwrap();
        assert_eq!(env.sleeps(), 0);
    }

    #[test]
    fn test_rate_limit_delay_curve() {
        let mut opt = Options::default();
        opt.rate_limit = 2.0;
        opt.rate_limit_delay_milliseconds = 1000;
        assert_eq!(rate_limit_delay_micros(2.0, &opt), 0);
        // barely over: at least 1ms
        assert_eq!(rate_limit_delay_micros(2.0001, &opt), 1000);
        assert_eq!(rate_limit_delay_micros(3.0, &opt), 500 * 1000);
        assert_eq!(rate_limit_delay_micros(4.0, &opt), 1000 * 1000);
        assert_eq!(rate_limit_delay_micros(40.0, &opt), 1000 * 1000);
        let mut a = rate_limit_delay_micros(2.1, &opt);
        for s in &[2.5, 2.9, 3.5, 3.99] {
            let b = rate_limit_delay_micros(*s, &opt);
            assert!(b >= a);
            a = b;
        }
        opt.rate_limit_delay_milliseconds = 0;
        assert_eq!(rate_limit_delay_micros(3.0, &opt), 0);
    }

    #[test]
    fn test_rate_limited_write() {
        let env = Arc::new(TestEnv::new());
        let mut opt = Options::default();
        opt.env = env.clone();
        opt.rate_limit = 1.5;
        opt.rate_limit_delay_milliseconds = 10;
        let (vs, wc) = controller(opt);
        // 6 files against a trigger of 4 scores 1.5; 7 scores 1.75
        add_level0(&vs, 7);
        wc.admit(|| Ok(())).unwrap();
        assert_eq!(env.sleeps(), 1);
        assert_eq!(env.slept_micros(), 2000);
        assert_eq!(wc.stats().rate_limit_count, 1);
    }

    #[test]
    fn test_stop_aborts_on_check_error() {
        let mut opt = Options::default();
        opt.env = Arc::new(TestEnv::new());
        let (vs, wc) = controller(opt);
        add_level0(&vs, 12);
        let v = vs.current();
        assert_eq!(decide(&v, vs.options()), AdmissionDecision::Block);
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let r = wc.admit(|| {
            if calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) > 0 {
                Err(crate::db::errors::DError::ShuttingDown)
            } else {
                Ok(())
            }
        });
        assert!(matches!(r, Err(crate::db::errors::DError::ShuttingDown)));
        assert_eq!(wc.stats().stop_count, 1);
    }
}
