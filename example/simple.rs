use dakv_compaction::{
    new_logger, CompactionEngine, LsmEngine, MemEditLog, MemTableStorage, Options,
};
use std::sync::Arc;

fn main() {
    let storage = MemTableStorage::new();
    let engine = {
        let mut opt = Options::default();
        opt.info_log = Some(new_logger(std::io::stderr(), slog::Level::Info));
        LsmEngine::open(opt, Arc::new(storage.clone()), Arc::new(MemEditLog::new())).unwrap()
    };

    // Each flush overwrites the same keys, so level 0 fills up with overlapping tables.
    for round in 0..6 {
        let entries = (0..100)
            .map(|i| {
                (
                    format!("Red-{:03}", i).into_bytes(),
                    format!("Hope is a good thing, round {}", round).into_bytes(),
                )
            })
            .collect();
        engine.admit(4096).unwrap();
        let f = storage.insert_table(engine.new_file_number(), entries);
        engine.notify_flushed(f).unwrap();
    }

    engine
        .request_manual_compaction(None, None, None)
        .unwrap()
        .wait()
        .unwrap();
    println!("{}", engine.get_property("dakv.sstables").unwrap());
    println!("{}", engine.get_property("dakv.stats").unwrap());
    engine.close().unwrap();
}
