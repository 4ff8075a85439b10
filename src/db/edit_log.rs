use crate::db::errors::{DError, DResult};
use crate::db::version_edit::VersionEdit;
use std::io;
use std::sync::{Arc, Mutex};

/// Durable record of version edits. An edit must be persisted before the
/// version it produces is published; a failure leaves the current version
/// untouched.
pub trait EditLog: Send + Sync {
    fn persist_edit(&self, edit: &VersionEdit) -> DResult<()>;
}

#[derive(Default)]
struct MemEditLogInner {
    edits: Vec<VersionEdit>,
    fail: bool,
}

/// Keeps persisted edits in memory. Can be told to fail every write.
#[derive(Default, Clone)]
pub struct MemEditLog {
    inner: Arc<Mutex<MemEditLogInner>>,
}

impl MemEditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn edits(&self) -> Vec<VersionEdit> {
        lock!(self.inner).edits.clone()
    }

    pub fn len(&self) -> usize {
        lock!(self.inner).edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_fail(&self, fail: bool) {
        lock!(self.inner).fail = fail;
    }
}

impl EditLog for MemEditLog {
    fn persist_edit(&self, edit: &VersionEdit) -> DResult<()> {
        let mut inner = lock!(self.inner);
        if inner.fail {
            return Err(DError::Io(io::Error::new(
                io::ErrorKind::Other,
                "edit log write failed",
            )));
        }
        inner.edits.push(edit.clone());
        Ok(())
    }
}
