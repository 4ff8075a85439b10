use crate::env::Env;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default, Clone, Copy)]
pub struct PosixEnv;

impl PosixEnv {
    pub fn new() -> Self {
        PosixEnv
    }
}

impl Env for PosixEnv {}

/// Records requested sleeps instead of sleeping, and exposes a manual clock.
#[derive(Default)]
pub struct TestEnv {
    slept_micros: AtomicU64,
    sleeps: AtomicU64,
    clock: AtomicU64,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total microseconds callers asked to sleep.
    pub fn slept_micros(&self) -> u64 {
        self.slept_micros.load(Ordering::Acquire)
    }

    /// Number of sleep calls.
    pub fn sleeps(&self) -> u64 {
        self.sleeps.load(Ordering::Acquire)
    }

    pub fn advance(&self, micros: u64) {
        self.clock.fetch_add(micros, Ordering::AcqRel);
    }
}

impl Env for TestEnv {
    fn sleep_for_microseconds(&self, v: u64) {
        self.sleeps.fetch_add(1, Ordering::AcqRel);
        self.slept_micros.fetch_add(v, Ordering::AcqRel);
        self.clock.fetch_add(v, Ordering::AcqRel);
    }

    fn now_micros(&self) -> u64 {
        self.clock.load(Ordering::Acquire)
    }
}
