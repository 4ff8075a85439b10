use crate::db::errors::{DError, DResult};
use crate::table::KvIter;
use crate::utils::cmp::Comparator;
use std::cmp::Ordering;
use std::sync::Arc;

/// Combine the input tables of a compaction into one sorted stream.
///
/// Children are ordered newest first. When several children hold the same
/// key only the entry of the newest one is returned and the older
/// duplicates are skipped.
/// ```text
///                 ┌─────────────┐
///       ┌─────────┤ MergingIter ├──────────┐
///       │         └─────────────┘          │
///       ▼                ▼                 ▼
///  ┌─────────┐     ┌───────────┐     ┌───────────┐
///  │ level L │ ... │  level L  │     │ level L+1 │
///  │ newest  │     │  oldest   │     │   files   │
///  └─────────┘     └───────────┘     └───────────┘
/// ```
pub(crate) struct MergingIterator {
    cmp: Arc<dyn Comparator + Send + Sync>,
    children: Vec<KvIter>,
    heads: Vec<Option<(Vec<u8>, Vec<u8>)>>,
    started: bool,
    err: Option<DError>,
    done: bool,
}

impl MergingIterator {
    pub(crate) fn new(cmp: Arc<dyn Comparator + Send + Sync>, children: Vec<KvIter>) -> Self {
        let heads = vec![None; children.len()];
        MergingIterator {
            cmp,
            children,
            heads,
            started: false,
            err: None,
            done: false,
        }
    }

    fn fill(&mut self, child: usize) {
        self.heads[child] = match self.children[child].next() {
            Some(Ok(kv)) => Some(kv),
            Some(Err(e)) => {
                if self.err.is_none() {
                    self.err = Some(e);
                }
                None
            }
            None => None,
        };
    }

    // Find the child holding the smallest key; the first one wins a tie.
    fn find_smallest(&self) -> Option<usize> {
        let mut smallest: Option<usize> = None;
        for (i, head) in self.heads.iter().enumerate() {
            if let Some((key, _)) = head {
                match smallest {
                    Some(s) => {
                        let (current, _) = self.heads[s].as_ref()?;
                        if self.cmp.compare(key, current) == Ordering::Less {
                            smallest = Some(i);
                        }
                    }
                    None => smallest = Some(i),
                }
            }
        }
        smallest
    }
}

impl Iterator for MergingIterator {
    type Item = DResult<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            for child in 0..self.children.len() {
                self.fill(child);
            }
        }
        if let Some(e) = self.err.take() {
            self.done = true;
            return Some(Err(e));
        }
        let current = match self.find_smallest() {
            Some(c) => c,
            None => {
                self.done = true;
                return None;
            }
        };
        let (key, value) = self.heads[current].take()?;
        self.fill(current);
        // skip older entries of the same key
        for child in 0..self.children.len() {
            while let Some((k, _)) = &self.heads[child] {
                if self.cmp.compare(k, &key) != Ordering::Equal {
                    break;
                }
                self.fill(child);
            }
        }
        Some(Ok((key, value)))
    }
}
