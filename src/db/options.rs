use crate::db::config::{
    DEFAULT_NUM_LEVELS, L0_COMPACTION_TRIGGER, L0_SLOWDOWN_WRITES_TRIGGER,
    L0_STOP_WRITES_TRIGGER, MAX_MEM_COMPACT_LEVEL,
};
use crate::db::errors::{DError, DResult};
use crate::env::{Env, PosixEnv};
use crate::table::TableWriteOptions;
use crate::utils::cmp::{BytewiseComparatorImpl, Comparator};
use slog::{info, Logger};
use std::convert::TryFrom;
use std::fmt;
use std::sync::Arc;

/// Block compression handed to the table writer. The numeric codes are
/// part of the persistent format and must not change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CompressionType {
    NoCompress,
    Snappy,
    Zlib,
    BZip2,
}

impl From<CompressionType> for u8 {
    fn from(c: CompressionType) -> Self {
        match c {
            CompressionType::NoCompress => 0,
            CompressionType::Snappy => 1,
            CompressionType::Zlib => 2,
            CompressionType::BZip2 => 3,
        }
    }
}

impl Default for CompressionType {
    fn default() -> Self {
        Self::Snappy
    }
}

impl TryFrom<u8> for CompressionType {
    type Error = DError;

    fn try_from(a: u8) -> DResult<Self> {
        match a {
            0 => Ok(CompressionType::NoCompress),
            1 => Ok(CompressionType::Snappy),
            2 => Ok(CompressionType::Zlib),
            3 => Ok(CompressionType::BZip2),
            _ => Err(DError::InvalidArgument(format!(
                "unknown compression type {}",
                a
            ))),
        }
    }
}

/// Tuning knobs for the zlib-style compressors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompressionOptions {
    pub window_bits: i32,
    pub level: i32,
    pub strategy: i32,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            window_bits: -14,
            level: -1,
            strategy: 0,
        }
    }
}

/// Combines merge operands for a key. The engine only checks that one is
/// configured before admitting merge writes; applying it belongs to the
/// read and flush paths.
pub trait MergeOperator: Send + Sync {
    fn name(&self) -> &'static str;

    fn full_merge(
        &self,
        key: &[u8],
        existing: Option<&[u8]>,
        operands: &[&[u8]],
    ) -> Option<Vec<u8>>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterDecision {
    Keep,
    Remove,
    ChangeValue(Vec<u8>),
}

/// Allows an application to modify or delete a key-value during background
/// compaction. `level` is the input level of the compaction.
pub trait CompactionFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn filter(&self, level: usize, key: &[u8], value: &[u8]) -> FilterDecision;
}

#[derive(Clone)]
pub struct Options {
    /// Defines the order of keys in every table.
    /// Default: `BytewiseComparatorImpl`
    pub comparator: Arc<dyn Comparator + Send + Sync>,
    /// Required before merge writes can be admitted.
    /// Default: None
    pub merge_operator: Option<Arc<dyn MergeOperator>>,
    /// Default: None
    pub compaction_filter: Option<Arc<dyn CompactionFilter>>,
    /// If true, a corruption detected while reading compaction inputs puts
    /// the whole engine into a fatal state instead of failing one job.
    /// Default: false
    pub paranoid_checks: bool,
    pub env: Arc<dyn Env + Send + Sync>,
    pub info_log: Option<Logger>,

    /// Size of the in-memory write buffer, and therefore of a flushed
    /// level-0 table.
    /// Default: 4 << 20  -> 4MB
    pub write_buffer_size: usize,
    /// Default: 1 << 12 -> 4k
    pub block_size: usize,
    /// Default: 16
    pub block_restart_interval: i64,
    /// Default: Snappy
    pub compression: CompressionType,
    /// If non-empty, entry `L` overrides `compression` for level `L`.
    pub compression_per_level: Vec<CompressionType>,
    pub compression_opts: CompressionOptions,

    /// Default: 7
    pub num_levels: usize,
    /// Number of files to trigger level-0 compaction. A value <= 0 means that
    /// level-0 compaction will not be triggered by number of files at all.
    /// Default: 4
    pub level0_file_num_compaction_trigger: i32,
    /// Soft limit on number of level-0 files; writes are slowed down at this
    /// point. A value < 0 disables it.
    /// Default: 8
    pub level0_slowdown_writes_trigger: i32,
    /// Maximum number of level-0 files; writes stop at this point.
    /// A value < 0 disables it.
    /// Default: 12
    pub level0_stop_writes_trigger: i32,
    /// Deepest level a flushed table may be pushed to if it overlaps nothing.
    /// Default: 2
    pub max_mem_compaction_level: usize,

    /// Target file size for level L is
    /// `target_file_size_base * target_file_size_multiplier ^ (L-1)`.
    /// Default: 2MB and 1
    pub target_file_size_base: u64,
    pub target_file_size_multiplier: u64,

    /// Maximum total bytes for level L is
    /// `max_bytes_for_level_base * max_bytes_for_level_multiplier ^ (L-1)`.
    /// Default: 10MB and 10
    pub max_bytes_for_level_base: u64,
    pub max_bytes_for_level_multiplier: u64,
    /// Entry `L-1`, when present, replaces the multiplier between level L-1
    /// and level L.
    pub max_bytes_for_level_multiplier_additional: Vec<u64>,

    /// The level-(L+1) inputs of a compaction never exceed
    /// `expanded_compaction_factor * target_file_size(L+1)` bytes.
    /// Default: 25
    pub expanded_compaction_factor: u64,
    /// The level-L inputs of a compaction never exceed
    /// `source_compaction_factor * target_file_size(L)` bytes (level 0 excepted).
    /// Default: 1
    pub source_compaction_factor: u64,
    /// An output file is closed once it overlaps more than
    /// `max_grandparent_overlap_factor * target_file_size(L+2)` bytes of
    /// level L+2.
    /// Default: 10
    pub max_grandparent_overlap_factor: u64,

    /// Default: false
    pub disable_seek_compaction: bool,
    /// Obsolete tables are deleted at most this often; 0 deletes after every
    /// compaction.
    /// Default: 0
    pub delete_obsolete_files_period_micros: u64,
    /// Default: 1
    pub max_background_compactions: usize,
    /// Writes are delayed when any level's compaction score exceeds
    /// `rate_limit`. Ignored when <= 1.0.
    /// Default: 0.0
    pub rate_limit: f64,
    /// Upper bound of a single rate-limit delay.
    /// Default: 1000
    pub rate_limit_delay_milliseconds: u64,
    /// Only manual compactions run when set.
    /// Default: false
    pub disable_auto_compactions: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            comparator: Arc::new(BytewiseComparatorImpl::new()),
            merge_operator: None,
            compaction_filter: None,
            paranoid_checks: false,
            env: Arc::new(PosixEnv::new()),
            info_log: None,
            write_buffer_size: 4 << 20,
            block_size: 1 << 12,
            block_restart_interval: 16,
            compression: CompressionType::Snappy,
            compression_per_level: vec![],
            compression_opts: CompressionOptions::default(),
            num_levels: DEFAULT_NUM_LEVELS,
            level0_file_num_compaction_trigger: L0_COMPACTION_TRIGGER,
            level0_slowdown_writes_trigger: L0_SLOWDOWN_WRITES_TRIGGER,
            level0_stop_writes_trigger: L0_STOP_WRITES_TRIGGER,
            max_mem_compaction_level: MAX_MEM_COMPACT_LEVEL,
            target_file_size_base: 2 << 20,
            target_file_size_multiplier: 1,
            max_bytes_for_level_base: 10 << 20,
            max_bytes_for_level_multiplier: 10,
            max_bytes_for_level_multiplier_additional: vec![],
            expanded_compaction_factor: 25,
            source_compaction_factor: 1,
            max_grandparent_overlap_factor: 10,
            disable_seek_compaction: false,
            delete_obsolete_files_period_micros: 0,
            max_background_compactions: 1,
            rate_limit: 0.0,
            rate_limit_delay_milliseconds: 1000,
            disable_auto_compactions: false,
        }
    }
}

impl Options {
    /// All data stays in level 0 without any automatic compaction. Call
    /// `request_manual_compaction(None, None, None)` after the load.
    pub fn prepare_for_bulk_load(&mut self) -> &mut Self {
        self.level0_file_num_compaction_trigger = 1 << 30;
        self.level0_slowdown_writes_trigger = 1 << 30;
        self.level0_stop_writes_trigger = 1 << 30;
        self.disable_auto_compactions = true;
        self.disable_seek_compaction = true;
        self
    }

    pub fn compression_for_level(&self, level: usize) -> CompressionType {
        self.compression_per_level
            .get(level)
            .copied()
            .unwrap_or(self.compression)
    }

    pub(crate) fn table_write_options(&self, level: usize) -> TableWriteOptions {
        TableWriteOptions {
            compression: self.compression_for_level(level),
            compression_opts: self.compression_opts,
            block_size: self.block_size,
            block_restart_interval: self.block_restart_interval,
        }
    }

    /// Write every tunable to the info log.
    pub fn dump(&self, log: &Logger) {
        info!(log, "Options.comparator: {}", self.comparator.name());
        info!(
            log,
            "Options.merge_operator: {}",
            self.merge_operator.as_ref().map_or("None", |m| m.name())
        );
        info!(
            log,
            "Options.compaction_filter: {}",
            self.compaction_filter.as_ref().map_or("None", |f| f.name())
        );
        info!(log, "Options.paranoid_checks: {}", self.paranoid_checks);
        info!(log, "Options.write_buffer_size: {}", self.write_buffer_size);
        info!(log, "Options.block_size: {}", self.block_size);
        info!(log, "Options.block_restart_interval: {}", self.block_restart_interval);
        info!(log, "Options.compression: {:?}", self.compression);
        for (level, c) in self.compression_per_level.iter().enumerate() {
            info!(log, "Options.compression[{}]: {:?}", level, c);
        }
        info!(log, "Options.compression_opts: {:?}", self.compression_opts);
        info!(log, "Options.num_levels: {}", self.num_levels);
        info!(
            log,
            "Options.level0_file_num_compaction_trigger: {}",
            self.level0_file_num_compaction_trigger
        );
        info!(
            log,
            "Options.level0_slowdown_writes_trigger: {}", self.level0_slowdown_writes_trigger
        );
        info!(
            log,
            "Options.level0_stop_writes_trigger: {}", self.level0_stop_writes_trigger
        );
        info!(
            log,
            "Options.max_mem_compaction_level: {}", self.max_mem_compaction_level
        );
        info!(log, "Options.target_file_size_base: {}", self.target_file_size_base);
        info!(
            log,
            "Options.target_file_size_multiplier: {}", self.target_file_size_multiplier
        );
        info!(
            log,
            "Options.max_bytes_for_level_base: {}", self.max_bytes_for_level_base
        );
        info!(
            log,
            "Options.max_bytes_for_level_multiplier: {}", self.max_bytes_for_level_multiplier
        );
        for (i, m) in self
            .max_bytes_for_level_multiplier_additional
            .iter()
            .enumerate()
        {
            info!(log, "Options.max_bytes_for_level_multiplier_additional[{}]: {}", i, m);
        }
        info!(
            log,
            "Options.expanded_compaction_factor: {}", self.expanded_compaction_factor
        );
        info!(
            log,
            "Options.source_compaction_factor: {}", self.source_compaction_factor
        );
        info!(
            log,
            "Options.max_grandparent_overlap_factor: {}", self.max_grandparent_overlap_factor
        );
        info!(
            log,
            "Options.disable_seek_compaction: {}", self.disable_seek_compaction
        );
        info!(
            log,
            "Options.delete_obsolete_files_period_micros: {}",
            self.delete_obsolete_files_period_micros
        );
        info!(
            log,
            "Options.max_background_compactions: {}", self.max_background_compactions
        );
        info!(log, "Options.rate_limit: {:.2}", self.rate_limit);
        info!(
            log,
            "Options.rate_limit_delay_milliseconds: {}", self.rate_limit_delay_milliseconds
        );
        info!(
            log,
            "Options.disable_auto_compactions: {}", self.disable_auto_compactions
        );
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("comparator", &self.comparator.name())
            .field("num_levels", &self.num_levels)
            .field("write_buffer_size", &self.write_buffer_size)
            .field("level0_triggers", &(
                self.level0_file_num_compaction_trigger,
                self.level0_slowdown_writes_trigger,
                self.level0_stop_writes_trigger,
            ))
            .field("target_file_size_base", &self.target_file_size_base)
            .field("max_bytes_for_level_base", &self.max_bytes_for_level_base)
            .field("max_background_compactions", &self.max_background_compactions)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

fn clip_to_range<T>(v: &mut T, min: T, max: T)
where
    T: PartialOrd,
{
    if *v > max {
        *v = max;
    } else if *v < min {
        *v = min;
    }
}

/// Validate the options given at open and clip the numeric ones into sane
/// ranges. The result is what the engine runs with for the whole session.
pub(crate) fn sanitize_options(src_opt: Options) -> DResult<Options> {
    let mut opt = src_opt;
    if opt.num_levels < 2 {
        return Err(DError::InvalidArgument(format!(
            "num_levels must be at least 2, got {}",
            opt.num_levels
        )));
    }
    if !opt.rate_limit.is_finite() {
        return Err(DError::InvalidArgument("rate_limit must be finite".to_string()));
    }
    clip_to_range(&mut opt.write_buffer_size, 64 << 10, 1 << 30);
    clip_to_range(&mut opt.block_size, 1 << 10, 4 << 20);
    clip_to_range(&mut opt.target_file_size_base, 1, 1 << 40);
    clip_to_range(&mut opt.target_file_size_multiplier, 1, 1 << 10);
    clip_to_range(&mut opt.max_bytes_for_level_base, 1, 1 << 50);
    clip_to_range(&mut opt.max_bytes_for_level_multiplier, 1, 1 << 10);
    for m in opt.max_bytes_for_level_multiplier_additional.iter_mut() {
        clip_to_range(m, 1, 1 << 10);
    }
    clip_to_range(&mut opt.expanded_compaction_factor, 1, 1 << 20);
    clip_to_range(&mut opt.source_compaction_factor, 1, 1 << 20);
    clip_to_range(&mut opt.max_grandparent_overlap_factor, 1, 1 << 20);
    clip_to_range(&mut opt.max_background_compactions, 1, 64);
    clip_to_range(&mut opt.max_mem_compaction_level, 0, opt.num_levels - 1);
    Ok(opt)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_compression_per_level() {
        let mut opt = Options::default();
        assert_eq!(opt.compression_for_level(3), CompressionType::Snappy);
        opt.compression_per_level = vec![CompressionType::NoCompress, CompressionType::Zlib];
        assert_eq!(opt.compression_for_level(0), CompressionType::NoCompress);
        assert_eq!(opt.compression_for_level(1), CompressionType::Zlib);
        assert_eq!(opt.compression_for_level(5), CompressionType::Snappy);
        assert_eq!(opt.table_write_options(1).compression, CompressionType::Zlib);
    }

    #[test]
    fn test_compression_codes() {
        for c in [
            CompressionType::NoCompress,
            CompressionType::Snappy,
            CompressionType::Zlib,
            CompressionType::BZip2,
        ] {
            assert_eq!(CompressionType::try_from(u8::from(c)).unwrap(), c);
        }
        assert!(CompressionType::try_from(9).is_err());
    }

    #[test]
    fn test_bulk_load() {
        let mut opt = Options::default();
        opt.prepare_for_bulk_load();
        assert!(opt.disable_auto_compactions);
        assert!(opt.disable_seek_compaction);
        assert!(opt.level0_stop_writes_trigger > 1 << 20);
    }

    #[test]
    fn test_sanitize() {
        let mut opt = Options::default();
        opt.num_levels = 1;
        assert!(matches!(sanitize_options(opt), Err(DError::InvalidArgument(_))));

        let mut opt = Options::default();
        opt.max_background_compactions = 0;
        opt.max_mem_compaction_level = 40;
        opt.target_file_size_multiplier = 0;
        opt.write_buffer_size = 1;
        let opt = sanitize_options(opt).unwrap();
        assert_eq!(opt.max_background_compactions, 1);
        assert_eq!(opt.max_mem_compaction_level, 6);
        assert_eq!(opt.target_file_size_multiplier, 1);
        assert_eq!(opt.write_buffer_size, 64 << 10);
    }
}
