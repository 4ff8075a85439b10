use std::error;
use std::result;

/// A shortcut to box an error.
#[macro_export]
macro_rules! box_err {
    ($e:expr) => ({
        let e: Box<dyn std::error::Error + Sync + Send> = format!("[{}:{}]: {}", file!(), line!(),  $e).into();
        e.into()
    });
    ($f:tt, $($arg:expr),+) => ({
        box_err!(format!($f, $($arg),+))
    });
}

quick_error! {
    #[derive(Debug)]
    pub enum DError {
        Other(err: Box<dyn error::Error + Sync + Send>) {
            from()
            cause(err.as_ref())
            display("Unknown error: {:?}", err)
        }
        // Following is for From other errors.
        Io(err: std::io::Error) {
            from()
            cause(err)
            display("Io {}", err)
        }
        Corruption(msg: String) {
            description("data corruption")
            display("Corruption: {}", msg)
        }
        NotSupported(what: &'static str) {
            display("Not supported: {}", what)
        }
        ResourceExhausted(msg: String) {
            description("resource exhausted")
            display("Resource exhausted: {}", msg)
        }
        InvalidArgument(msg: String) {
            description("invalid argument")
            display("Invalid argument: {}", msg)
        }
        ShuttingDown {
            description("engine is shutting down")
            display("Engine is shutting down")
        }
        Fatal(msg: String) {
            description("engine is in a fatal state")
            display("Fatal: {}", msg)
        }
        NoSuchFile(number: u64) {
            description("no such table file")
            display("No such table file {}", number)
        }
        CustomError(key: &'static str) {
            display("{}", key)
        }
        CustomErrorStr(key: String) {
            display("{}", key)
        }
    }
}

impl DError {
    /// Checksum or format mismatch, either reported by a collaborator or
    /// detected while merging.
    pub fn is_corruption(&self) -> bool {
        matches!(self, DError::Corruption(_))
    }

    /// Errors after which the same compaction candidate may simply be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DError::Io(_)
                | DError::ResourceExhausted(_)
                | DError::NoSuchFile(_)
                | DError::Corruption(_)
                | DError::Other(_)
        )
    }
}

impl Clone for DError {
    fn clone(&self) -> Self {
        match self {
            DError::Io(e) => DError::Io(std::io::Error::new(e.kind(), e.to_string())),
            DError::Other(e) => DError::Other(e.to_string().into()),
            DError::Corruption(m) => DError::Corruption(m.clone()),
            DError::NotSupported(w) => DError::NotSupported(w),
            DError::ResourceExhausted(m) => DError::ResourceExhausted(m.clone()),
            DError::InvalidArgument(m) => DError::InvalidArgument(m.clone()),
            DError::ShuttingDown => DError::ShuttingDown,
            DError::Fatal(m) => DError::Fatal(m.clone()),
            DError::NoSuchFile(n) => DError::NoSuchFile(*n),
            DError::CustomError(k) => DError::CustomError(k),
            DError::CustomErrorStr(k) => DError::CustomErrorStr(k.clone()),
        }
    }
}

pub type DResult<T> = result::Result<T, DError>;
