use crate::db::options::Options;

/// Byte budgets and target file sizes per level, derived from the options.
/// Every method is a pure function of the configuration.
#[derive(Clone, Debug)]
pub struct LevelSizeModel {
    write_buffer_size: u64,
    target_file_size_base: u64,
    target_file_size_multiplier: u64,
    max_bytes_for_level_base: u64,
    max_bytes_for_level_multiplier: u64,
    multiplier_overrides: Vec<u64>,
    expanded_compaction_factor: u64,
    source_compaction_factor: u64,
    max_grandparent_overlap_factor: u64,
}

impl LevelSizeModel {
    pub fn new(opt: &Options) -> Self {
        Self {
            write_buffer_size: opt.write_buffer_size as u64,
            target_file_size_base: opt.target_file_size_base,
            target_file_size_multiplier: opt.target_file_size_multiplier,
            max_bytes_for_level_base: opt.max_bytes_for_level_base,
            max_bytes_for_level_multiplier: opt.max_bytes_for_level_multiplier,
            multiplier_overrides: opt.max_bytes_for_level_multiplier_additional.clone(),
            expanded_compaction_factor: opt.expanded_compaction_factor,
            source_compaction_factor: opt.source_compaction_factor,
            max_grandparent_overlap_factor: opt.max_grandparent_overlap_factor,
        }
    }

    /// Multiplier between `level - 1` and `level`: the override at index
    /// `level - 1` if one is configured, else the uniform multiplier.
    pub fn effective_multiplier(&self, level: usize) -> u64 {
        level
            .checked_sub(1)
            .and_then(|i| self.multiplier_overrides.get(i))
            .copied()
            .unwrap_or(self.max_bytes_for_level_multiplier)
    }

    /// Level 0 is bounded by file count, so it has no byte budget.
    pub fn max_bytes_for_level(&self, level: usize) -> Option<u64> {
        if level == 0 {
            return None;
        }
        let mut result = self.max_bytes_for_level_base;
        for l in 2..=level {
            result = result.saturating_mul(self.effective_multiplier(l));
        }
        Some(result)
    }

    /// Level 0 files are flushed write buffers.
    pub fn target_file_size(&self, level: usize) -> u64 {
        if level == 0 {
            return self.write_buffer_size;
        }
        let mut result = self.target_file_size_base;
        for _ in 1..level {
            result = result.saturating_mul(self.target_file_size_multiplier);
        }
        result
    }

    /// Cap on the level-(L+1) input bytes of a compaction out of `level`.
    pub fn expanded_compaction_limit(&self, level: usize) -> u64 {
        self.expanded_compaction_factor
            .saturating_mul(self.target_file_size(level + 1))
    }

    /// Cap on the level-L input bytes of a compaction out of `level`.
    pub fn source_compaction_limit(&self, level: usize) -> u64 {
        self.source_compaction_factor
            .saturating_mul(self.target_file_size(level))
    }

    // Maximum bytes of overlaps in grandparent (i.e., level+2) before we
    // stop building a single file in a level->level+1 compaction.
    pub fn max_grandparent_overlap_bytes(&self, level: usize) -> u64 {
        self.max_grandparent_overlap_factor
            .saturating_mul(self.target_file_size(level + 2))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_budgets() {
        let m = LevelSizeModel::new(&Options::default());
        assert_eq!(m.max_bytes_for_level(0), None);
        assert_eq!(m.max_bytes_for_level(1), Some(10 << 20));
        assert_eq!(m.max_bytes_for_level(2), Some(100 << 20));
        assert_eq!(m.max_bytes_for_level(3), Some(1000 << 20));
        assert_eq!(m.target_file_size(0), 4 << 20);
        assert_eq!(m.target_file_size(1), 2 << 20);
        assert_eq!(m.target_file_size(5), 2 << 20);
    }

    #[test]
    fn test_multiplier_overrides() {
        let mut opt = Options::default();
        opt.max_bytes_for_level_multiplier_additional = vec![7, 3, 5];
        let m = LevelSizeModel::new(&opt);
        assert_eq!(m.max_bytes_for_level(1), Some(10 << 20));
        assert_eq!(m.max_bytes_for_level(2), Some(30 << 20));
        assert_eq!(m.max_bytes_for_level(3), Some(150 << 20));
        // beyond the override list the uniform multiplier applies again
        assert_eq!(m.max_bytes_for_level(4), Some(1500 << 20));
        for level in 2..7 {
            assert_eq!(
                m.max_bytes_for_level(level).unwrap(),
                m.max_bytes_for_level(level - 1).unwrap() * m.effective_multiplier(level)
            );
        }
    }

    #[test]
    fn test_target_file_size_growth() {
        let mut opt = Options::default();
        opt.target_file_size_multiplier = 10;
        let m = LevelSizeModel::new(&opt);
        assert_eq!(m.target_file_size(1), 2 << 20);
        assert_eq!(m.target_file_size(2), 20 << 20);
        assert_eq!(m.target_file_size(3), 200 << 20);
    }

    #[test]
    fn test_limits() {
        let m = LevelSizeModel::new(&Options::default());
        // 25 * 2MB of level-2 input when compacting level 1
        assert_eq!(m.expanded_compaction_limit(1), 50 << 20);
        assert_eq!(m.source_compaction_limit(1), 2 << 20);
        assert_eq!(m.max_grandparent_overlap_bytes(0), 20 << 20);
    }

    #[test]
    fn test_saturates() {
        let mut opt = Options::default();
        opt.max_bytes_for_level_multiplier = 1 << 10;
        let m = LevelSizeModel::new(&opt);
        assert_eq!(m.max_bytes_for_level(40), Some(u64::MAX));
    }
}
