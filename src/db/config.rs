pub const DEFAULT_NUM_LEVELS: usize = 7;

/// Level-0 compaction is started when we hit this many files.
pub const L0_COMPACTION_TRIGGER: i32 = 4;

/// Soft limit on number of level-0 files.  We slow down writes at this point.
pub const L0_SLOWDOWN_WRITES_TRIGGER: i32 = 8;

/// Maximum number of level-0 files.  We stop writes at this point.
pub const L0_STOP_WRITES_TRIGGER: i32 = 12;

/// Maximum level to which a new flushed table is pushed if it
/// does not create overlap.  We try to push to level 2 to avoid the
/// relatively expensive level 0=>1 compactions and to avoid some
/// expensive manifest file operations.  We do not push all the way to
/// the largest level since that can generate a lot of wasted disk
/// space if the same key space is being repeatedly overwritten.
pub const MAX_MEM_COMPACT_LEVEL: usize = 2;

/// A level-0 slowdown delays a single write by this many microseconds.
pub const SLOWDOWN_DELAY_MICROS: u64 = 1000;

/// Writers blocked on the level-0 stop trigger re-check at least this often.
pub const STALL_WAIT_MILLIS: u64 = 100;

/// Idle compaction workers check for shutdown this often.
pub const WORKER_POLL_MILLIS: u64 = 200;

/// We arrange to automatically compact a file after a certain number of
/// seeks: one seek costs approximately the same as the compaction of 40KB
/// of data, we are a little conservative and allow one seek per 16KB.
pub const BYTES_PER_SEEK: u64 = 16 << 10;

pub const MIN_ALLOWED_SEEKS: i64 = 100;

pub const PROPERTY_PREFIX: &str = "dakv.";
pub const NUM_FILES_PROPERTY: &str = "num-files-at-level";
pub const STATS_PROPERTY: &str = "stats";
pub const SSTABLES_PROPERTY: &str = "sstables";
pub const MAX_SCORE_PROPERTY: &str = "max-compaction-score";

/// Compaction failures kept for `background_errors` readers; new ones are
/// dropped while the channel is full.
pub const BACKGROUND_ERROR_CAPACITY: usize = 64;
