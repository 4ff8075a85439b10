use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Counts free slots of a bounded resource, background compaction workers here.
#[derive(Clone)]
pub struct Limiter {
    acquires_allowed: Arc<AtomicI64>,
}

impl Limiter {
    pub fn new(max_acquires: i64) -> Self {
        Limiter {
            acquires_allowed: Arc::new(AtomicI64::new(max_acquires)),
        }
    }

    pub fn acquire(&self) -> bool {
        let old_acquires_allowed = self.acquires_allowed.fetch_sub(1, Ordering::AcqRel);
        if old_acquires_allowed > 0 {
            return true;
        }
        self.acquires_allowed.fetch_add(1, Ordering::AcqRel);
        false
    }

    pub fn release(&self) {
        self.acquires_allowed.fetch_add(1, Ordering::AcqRel);
    }
}
