use crate::db::errors::{DError, DResult};
use crate::db::file_meta::FileMetaData;
use crate::db::level_state::LevelState;
use crate::db::version::Version;
use crate::db::version_edit::VersionEdit;
use crate::utils::cmp::Comparator;
use hashbrown::HashSet;
use std::cmp::Ordering;
use std::sync::Arc;

#[derive(Default, Clone)]
struct LevelDelta {
    deleted_files: HashSet<u64>,
    added_files: Vec<Arc<FileMetaData>>,
}

/// Use `Builder` to create a new version, NewVersion = BaseVersion + edits.
/// A helper so we can efficiently apply a whole sequence of edits to a
/// particular state without creating intermediate versions that contain
/// full copies of the intermediate state.
pub(crate) struct Builder<'a> {
    levels: Vec<LevelDelta>,
    cmp: Arc<dyn Comparator + Send + Sync>,
    base: &'a Version,
}

fn by_smallest_key(cmp: &dyn Comparator, a: &Arc<FileMetaData>, b: &Arc<FileMetaData>) -> Ordering {
    match cmp.compare(a.get_smallest(), b.get_smallest()) {
        Ordering::Equal => a.get_file_number().cmp(&b.get_file_number()),
        ret => ret,
    }
}

impl<'a> Builder<'a> {
    pub fn new(base: &'a Version, cmp: Arc<dyn Comparator + Send + Sync>) -> Self {
        Self {
            levels: vec![LevelDelta::default(); base.num_levels()],
            cmp,
            base,
        }
    }

    /// Record the deleted and added files of `edit`.
    pub fn apply(&mut self, edit: &VersionEdit) -> DResult<()> {
        let num_levels = self.levels.len();
        for (level, number) in edit.get_deleted_files() {
            let delta = self.levels.get_mut(*level).ok_or_else(|| {
                DError::InvalidArgument(format!("delete at level {} of {}", level, num_levels))
            })?;
            delta.deleted_files.insert(*number);
        }
        for (level, f) in edit.get_new_files() {
            let delta = self.levels.get_mut(*level).ok_or_else(|| {
                DError::InvalidArgument(format!("add at level {} of {}", level, num_levels))
            })?;
            delta.deleted_files.remove(&f.get_file_number());
            delta.added_files.push(Arc::new(f.clone()));
        }
        Ok(())
    }

    /// Merge the set of added files with the set of pre-existing files,
    /// dropping deleted ones. Fails if files at a level >= 1 would overlap.
    pub fn save_to(mut self) -> DResult<Vec<LevelState>> {
        let mut result = Vec::with_capacity(self.levels.len());
        let cmp = self.cmp.clone();
        for (level, delta) in self.levels.iter_mut().enumerate() {
            delta
                .added_files
                .sort_by(|a, b| by_smallest_key(cmp.as_ref(), a, b));
            let base_files = self.base.files(level);
            let mut files = Vec::with_capacity(base_files.len() + delta.added_files.len());
            let mut base_iter = base_files.iter().peekable();
            for added in &delta.added_files {
                // Add all smaller files listed in base
                while let Some(b) = base_iter.peek() {
                    if by_smallest_key(cmp.as_ref(), b, added) == Ordering::Greater {
                        break;
                    }
                    maybe_add_file(cmp.as_ref(), level, delta, (*b).clone(), &mut files)?;
                    base_iter.next();
                }
                maybe_add_file(cmp.as_ref(), level, delta, added.clone(), &mut files)?;
            }
            // Add remaining base files
            for b in base_iter {
                maybe_add_file(cmp.as_ref(), level, delta, b.clone(), &mut files)?;
            }
            result.push(LevelState::new(files));
        }
        Ok(result)
    }
}

fn maybe_add_file(
    cmp: &dyn Comparator,
    level: usize,
    delta: &LevelDelta,
    f: Arc<FileMetaData>,
    files: &mut Vec<Arc<FileMetaData>>,
) -> DResult<()> {
    if delta.deleted_files.contains(&f.get_file_number()) {
        // File is deleted: do nothing
        return Ok(());
    }
    if level > 0 {
        if let Some(last) = files.last() {
            // Must not overlap
            if !cmp.lt(last.get_largest(), f.get_smallest()) {
                return Err(DError::Corruption(format!(
                    "overlapping ranges in level {}: {} vs {}",
                    level, last, f
                )));
            }
        }
    }
    files.push(f);
    Ok(())
}
