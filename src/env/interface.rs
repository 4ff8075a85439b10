use crate::utils::time::now_micros;
use std::thread;
use std::time::Duration;

/// Clock and sleep capability used by write admission for delay enforcement
/// and by compactions for timing statistics.
pub trait Env {
    /// Sleep the thread
    fn sleep_for_microseconds(&self, v: u64) {
        let duration = Duration::from_micros(v);
        thread::sleep(duration);
    }

    fn now_micros(&self) -> u64 {
        now_micros()
    }
}
