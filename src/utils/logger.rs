use crate::utils::time::get_micro;
use slog::{o, Discard, Drain, Key, Level, LevelFilter, Logger, OwnedKVList, Record, Serializer, KV};
use std::fmt;
use std::io::{self, Write};
use std::sync::Mutex;

lazy_static! {
    static ref DISCARD: Logger = Logger::root(Discard, o!());
}

/// A logger that drops every record, used when `Options::info_log` is empty.
pub fn discard_logger() -> Logger {
    DISCARD.clone()
}

/// Build a root logger writing one line per record into `w`,
/// dropping records less severe than `level`.
pub fn new_logger<W>(w: W, level: Level) -> Logger
where
    W: Write + Send + 'static,
{
    let drain = LineDrain {
        out: Mutex::new(w),
    };
    Logger::root(LevelFilter::new(drain, level).fuse(), o!())
}

struct LineDrain<W: Write> {
    out: Mutex<W>,
}

impl<W: Write> Drain for LineDrain<W> {
    type Ok = ();
    type Err = io::Error;

    fn log(&self, record: &Record, values: &OwnedKVList) -> io::Result<()> {
        let mut kv = KvLine::default();
        record
            .kv()
            .serialize(record, &mut kv)
            .and_then(|_| values.serialize(record, &mut kv))
            .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("{:?}", e)))?;
        let mut out = lock!(self.out);
        writeln!(
            out,
            "{:.6} {} [{}:{}] {}{}",
            get_micro(),
            record.level().as_short_str(),
            record.file(),
            record.line(),
            record.msg(),
            kv.0
        )
    }
}

#[derive(Default)]
struct KvLine(String);

impl Serializer for KvLine {
    fn emit_arguments(&mut self, key: Key, val: &fmt::Arguments) -> slog::Result {
        use std::fmt::Write as FmtWrite;
        ignore!(write!(self.0, ", {}: {}", key, val));
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::utils::logger::new_logger;
    use slog::{debug, info, warn, Level};

    #[test]
    fn test_line_drain_filters_and_formats() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let logger = new_logger(file.reopen().unwrap(), Level::Info);
        info!(logger, "compacted"; "level" => 2, "files" => 3);
        debug!(logger, "hidden");
        warn!(logger, "stall");
        drop(logger);

        let out = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("INFO"));
        assert!(lines[0].contains("compacted"));
        assert!(lines[0].contains("level: 2"));
        assert!(lines[0].contains("files: 3"));
        assert!(lines[1].contains("WARN"));
        assert!(!out.contains("hidden"));
    }
}
