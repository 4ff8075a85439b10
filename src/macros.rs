/// Discard a `Result` whose error is not actionable at the call site.
macro_rules! ignore {
    ($e:expr) => {{
        let _ = $e;
    }};
}

/// Lock a std mutex, recovering the guard if a panicking thread poisoned it.
macro_rules! lock {
    ($m:expr) => {
        match $m.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    };
}

macro_rules! read_lock {
    ($m:expr) => {
        match $m.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    };
}

macro_rules! write_lock {
    ($m:expr) => {
        match $m.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    };
}
