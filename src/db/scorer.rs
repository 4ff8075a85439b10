use crate::db::file_meta::FileMetaData;
use crate::db::level_size::LevelSizeModel;
use crate::db::level_state::LevelState;
use crate::db::options::Options;
use crate::db::version::Version;
use std::cmp::Ordering;
use std::sync::Arc;

/// Fullness of one level. A score >= 1 means the level needs compaction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LevelScore {
    pub level: usize,
    pub score: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CompactionReason {
    Size,
    Seek,
    Manual,
}

/// A level the scheduler should try to compact, with the file to start
/// from when the trigger was a single file.
#[derive(Clone, Debug)]
pub(crate) struct Candidate {
    pub(crate) level: usize,
    pub(crate) reason: CompactionReason,
    pub(crate) seed: Option<Arc<FileMetaData>>,
}

/// Score every level that can still be compacted into a deeper one.
/// The result is ordered by descending score, lower level first on ties.
pub(crate) fn score_levels(
    levels: &[LevelState],
    model: &LevelSizeModel,
    level0_trigger: i32,
) -> Vec<LevelScore> {
    let mut scores = Vec::with_capacity(levels.len());
    for (level, state) in levels.iter().enumerate().take(levels.len().saturating_sub(1)) {
        let score = if level == 0 {
            // We treat level-0 specially by bounding the number of files
            // instead of number of bytes: level-0 files are merged on every
            // read, so many small files hurt even when their total is small.
            if level0_trigger <= 0 {
                0.0
            } else {
                state.file_count() as f64 / level0_trigger as f64
            }
        } else {
            match model.max_bytes_for_level(level) {
                Some(max) if max > 0 => state.total_bytes() as f64 / max as f64,
                _ => 0.0,
            }
        };
        scores.push(LevelScore { level, score });
    }
    scores.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.level.cmp(&b.level))
    });
    scores
}

/// Automatic compaction candidates for `v`, most urgent first: size
/// triggered levels by score, then the seek-flagged file.
pub(crate) fn candidates(v: &Version, opt: &Options) -> Vec<Candidate> {
    let mut result = vec![];
    if opt.disable_auto_compactions {
        return result;
    }
    for s in v.compaction_scores() {
        if s.score < 1.0 {
            break;
        }
        result.push(Candidate {
            level: s.level,
            reason: CompactionReason::Size,
            seed: None,
        });
    }
    if !opt.disable_seek_compaction {
        if let Some((level, f)) = v.file_to_compact() {
            if level + 1 < v.num_levels() {
                result.push(Candidate {
                    level,
                    reason: CompactionReason::Seek,
                    seed: Some(f),
                });
            }
        }
    }
    result
}
