#[cfg(test)]
mod test {
    use crate::db::edit_log::MemEditLog;
    use crate::db::engine::{CompactionEngine, LsmEngine};
    use crate::db::options::{
        CompactionFilter, CompressionType, FilterDecision, MergeOperator, Options,
    };
    use crate::db::file_meta::FileMetaData;
    use crate::db::version::Version;
    use crate::db::version_edit::VersionEdit;
    use crate::db::DError;
    use crate::env::TestEnv;
    use crate::table::{Fault, MemTableStorage};
    use crate::utils::cmp::{BaseComparator, BytewiseComparatorImpl};
    use crossbeam_channel::{Receiver, Sender};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    type Entries = Vec<(Vec<u8>, Vec<u8>)>;

    struct EngineTest {
        engine: Arc<LsmEngine>,
        storage: MemTableStorage,
        edit_log: MemEditLog,
    }

    impl EngineTest {
        fn new(opt: Options) -> Self {
            let storage = MemTableStorage::new();
            let edit_log = MemEditLog::new();
            let engine = LsmEngine::open(
                opt,
                Arc::new(storage.clone()),
                Arc::new(edit_log.clone()),
            )
            .unwrap();
            Self {
                engine: Arc::new(engine),
                storage,
                edit_log,
            }
        }

        /// Store a table and register it at level 0. Returns its number.
        fn flush(&self, entries: Entries) -> u64 {
            let n = self.engine.new_file_number();
            let f = self.storage.insert_table(n, entries);
            self.engine.notify_flushed(f).unwrap();
            n
        }

        fn files_at(&self, level: usize) -> usize {
            self.engine.current_version().num_level_files(level)
        }

        fn level_entries(&self, level: usize) -> Entries {
            let v = self.engine.current_version();
            let mut result = vec![];
            for f in v.files(level) {
                result.extend(self.storage.entries(f.get_file_number()).unwrap());
            }
            result
        }

        fn running(&self, n: usize) -> bool {
            let stats = self.engine.get_property("dakv.stats").unwrap();
            stats.contains(&format!("running compactions: {}\n", n))
        }
    }

    fn assert_levels_disjoint(v: &Version) {
        let cmp = BytewiseComparatorImpl::new();
        for level in 1..v.num_levels() {
            for pair in v.files(level).windows(2) {
                assert!(
                    cmp.lt(pair[0].get_largest(), pair[1].get_smallest()),
                    "level {} overlaps: {} {}",
                    level,
                    pair[0],
                    pair[1]
                );
            }
        }
    }

    /// Store `entries` as table `n` but report `size` bytes for it.
    fn sized_table(
        storage: &MemTableStorage,
        n: u64,
        entries: Entries,
        size: u64,
    ) -> FileMetaData {
        let f = storage.insert_table(n, entries);
        FileMetaData::new(n, size, f.get_smallest().to_vec(), f.get_largest().to_vec())
    }

    fn kvs(range: std::ops::Range<u32>, value: &str) -> Entries {
        range
            .map(|i| {
                (
                    format!("key{:04}", i).into_bytes(),
                    value.as_bytes().to_vec(),
                )
            })
            .collect()
    }

    fn kv(k: &str, v: &str) -> (Vec<u8>, Vec<u8>) {
        (k.as_bytes().to_vec(), v.as_bytes().to_vec())
    }

    fn wait_until<F: Fn() -> bool>(cond: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            delay(5);
        }
        cond()
    }

    fn delay(ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }

    struct DropTmp;

    impl CompactionFilter for DropTmp {
        fn name(&self) -> &'static str {
            "drop-tmp"
        }

        fn filter(&self, _level: usize, key: &[u8], _value: &[u8]) -> FilterDecision {
            if key.starts_with(b"tmp") {
                FilterDecision::Remove
            } else if key == b"up" {
                FilterDecision::ChangeValue(b"UP".to_vec())
            } else {
                FilterDecision::Keep
            }
        }
    }

    /// Holds the first compaction that consults it until the gate opens.
    struct Gate {
        entered: Sender<()>,
        open: Receiver<()>,
        once: AtomicBool,
    }

    impl CompactionFilter for Gate {
        fn name(&self) -> &'static str {
            "gate"
        }

        fn filter(&self, _level: usize, _key: &[u8], _value: &[u8]) -> FilterDecision {
            if !self.once.swap(true, Ordering::SeqCst) {
                let _ = self.entered.send(());
                let _ = self.open.recv();
            }
            FilterDecision::Keep
        }
    }

    /// Holds a compaction when it reaches one of `keys`, once per key,
    /// until `resume` yields.
    struct Hold {
        keys: Mutex<Vec<Vec<u8>>>,
        entered: Sender<Vec<u8>>,
        resume: Receiver<()>,
    }

    impl CompactionFilter for Hold {
        fn name(&self) -> &'static str {
            "hold"
        }

        fn filter(&self, _level: usize, key: &[u8], _value: &[u8]) -> FilterDecision {
            let hit = {
                let mut keys = self.keys.lock().unwrap();
                match keys.iter().position(|k| k.as_slice() == key) {
                    Some(i) => {
                        keys.remove(i);
                        true
                    }
                    None => false,
                }
            };
            if hit {
                let _ = self.entered.send(key.to_vec());
                let _ = self.resume.recv();
            }
            FilterDecision::Keep
        }
    }

    struct Concat;

    impl MergeOperator for Concat {
        fn name(&self) -> &'static str {
            "concat"
        }

        fn full_merge(
            &self,
            _key: &[u8],
            existing: Option<&[u8]>,
            operands: &[&[u8]],
        ) -> Option<Vec<u8>> {
            let mut result = existing.map(|e| e.to_vec()).unwrap_or_default();
            for op in operands {
                result.extend_from_slice(op);
            }
            Some(result)
        }
    }

    #[test]
    fn test_single_file_moves_down() {
        let t = EngineTest::new(Options::default());
        let mut numbers = vec![];
        for i in 0..4 {
            numbers.push(t.flush(kvs(i * 10..i * 10 + 5, "v")));
        }
        assert!(wait_until(|| t.files_at(1) == 1));
        assert_eq!(t.files_at(0), 3);
        let moved = t.engine.current_version().files(1)[0].get_file_number();
        assert!(numbers.contains(&moved));
        // A move rewrites nothing.
        assert!(t.storage.contains(moved));
        assert!(t.storage.deleted().is_empty());
    }

    #[test]
    fn test_level0_merge_keeps_newest() {
        let t = EngineTest::new(Options::default());
        let mut inputs = vec![];
        for i in 0..4 {
            inputs.push(t.flush(kvs(0..20, &format!("v{}", i))));
        }
        let storage = t.storage.clone();
        assert!(wait_until(|| {
            let deleted = storage.deleted();
            inputs.iter().all(|n| deleted.contains(n))
        }));
        assert_eq!(t.files_at(0), 0);
        assert_eq!(t.files_at(1), 1);
        assert_eq!(t.level_entries(1), kvs(0..20, "v3"));
        assert!(t.edit_log.len() >= 5);
    }

    #[test]
    fn test_grandparent_overlap_splits_output() {
        let storage = MemTableStorage::new();
        let mut base = VersionEdit::new();
        for n in 1..5 {
            base.add_file(0, storage.insert_table(n, kvs(0..15, &format!("v{}", n))));
        }
        // 15MB each against a budget of 10 * 2MB; never read.
        for (i, n) in (10..13).enumerate() {
            let lo = i as u32 * 5;
            base.add_file(
                2,
                FileMetaData::new(
                    n,
                    15 << 20,
                    format!("key{:04}", lo).into_bytes(),
                    format!("key{:04}", lo + 4).into_bytes(),
                ),
            );
        }
        let engine = LsmEngine::recover(
            Options::default(),
            Arc::new(storage.clone()),
            Arc::new(MemEditLog::new()),
            &base,
        )
        .unwrap();
        assert!(wait_until(|| engine.current_version().num_level_files(0) == 0));
        let v = engine.current_version();
        let outputs = v.files(1);
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].get_smallest(), b"key0000");
        assert_eq!(outputs[0].get_largest(), b"key0009");
        assert_eq!(outputs[1].get_smallest(), b"key0010");
        assert_eq!(outputs[1].get_largest(), b"key0014");
    }

    #[test]
    fn test_stop_trigger_waits_for_compaction() {
        let t = EngineTest::new(Options::default());
        let first = t.flush(kvs(0..10, "v"));
        t.storage.inject_fault(first, Fault::Io);
        for _ in 1..12 {
            t.flush(kvs(0..10, "v"));
        }
        assert_eq!(t.files_at(0), 12);

        let (tx, rx) = crossbeam_channel::bounded(1);
        let engine = t.engine.clone();
        let writer = thread::spawn(move || {
            let _ = tx.send(engine.admit(100));
        });
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
        assert_eq!(t.engine.stall_state().reason, crate::db::StallReason::Stop);

        t.storage.clear_faults();
        let r = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(r.is_ok());
        writer.join().unwrap();
        assert!(t.files_at(0) < 12);
        let stats = t.engine.get_property("dakv.stats").unwrap();
        assert!(stats.contains("level0_numfiles (1)"), "{}", stats);
    }

    #[test]
    fn test_failed_compaction_is_retried() {
        let t = EngineTest::new(Options::default());
        let errors = t.engine.background_errors();
        let mut inputs = vec![];
        for _ in 0..3 {
            inputs.push(t.flush(kvs(0..10, "v")));
        }
        t.storage.inject_fault(inputs[1], Fault::Io);
        t.flush(kvs(0..10, "v"));

        let failure = errors.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(failure.level, 0);
        assert!(!failure.manual);
        assert!(!failure.fatal);
        assert!(failure.error.is_transient());
        // The layout is untouched.
        assert_eq!(t.files_at(0), 4);
        assert_eq!(t.files_at(1), 0);

        t.storage.clear_faults();
        t.engine.admit(0).unwrap();
        assert!(wait_until(|| t.files_at(0) == 0));
        assert_eq!(t.files_at(1), 1);
    }

    #[test]
    fn test_failure_does_not_stall_disjoint_work() {
        // Level 1 holds 12MB against a 10MB budget, in two disjoint files.
        // Each has a small level-2 file below it, so neither is moved.
        let storage = MemTableStorage::new();
        let mut base = VersionEdit::new();
        base.add_file(1, sized_table(&storage, 1, kvs(100..110, "v"), 6 << 20));
        base.add_file(1, sized_table(&storage, 2, kvs(200..210, "v"), 6 << 20));
        base.add_file(2, storage.insert_table(3, kvs(100..110, "old")));
        base.add_file(2, storage.insert_table(4, kvs(200..210, "old")));
        storage.inject_fault(1, Fault::Corruption);
        let engine = LsmEngine::recover(
            Options::default(),
            Arc::new(storage.clone()),
            Arc::new(MemEditLog::new()),
            &base,
        )
        .unwrap();
        let errors = engine.background_errors();

        let failure = errors.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(failure.level, 1);
        assert!(!failure.fatal);
        // The disjoint file is compacted without another trigger.
        assert!(wait_until(|| {
            let v = engine.current_version();
            v.files(2).iter().any(|f| f.get_smallest() == b"key0200" && f.get_file_number() > 4)
        }));
        let v = engine.current_version();
        assert_eq!(v.num_level_files(1), 1);
        assert_eq!(v.files(1)[0].get_file_number(), 1);
        assert_levels_disjoint(&v);
        // The failed range waits for a trigger instead of spinning.
        delay(300);
        assert!(errors.try_recv().is_err());
    }

    #[test]
    fn test_concurrent_compactions_stay_disjoint() {
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let (resume_tx, resume_rx) = crossbeam_channel::unbounded();
        let mut opt = Options::default();
        opt.max_background_compactions = 3;
        opt.compaction_filter = Some(Arc::new(Hold {
            keys: Mutex::new(vec![b"key0000".to_vec(), b"key0100".to_vec()]),
            entered: entered_tx,
            resume: resume_rx,
        }));
        let storage = MemTableStorage::new();
        let edit_log = MemEditLog::new();
        let mut base = VersionEdit::new();
        for n in 1..5 {
            base.add_file(0, storage.insert_table(n, kvs(0..10, "v")));
        }
        base.add_file(1, sized_table(&storage, 5, kvs(100..110, "v"), 6 << 20));
        base.add_file(1, sized_table(&storage, 6, kvs(200..210, "v"), 6 << 20));
        base.add_file(2, storage.insert_table(7, kvs(100..110, "old")));
        base.add_file(2, storage.insert_table(8, kvs(200..210, "old")));
        let engine = LsmEngine::recover(
            opt,
            Arc::new(storage.clone()),
            Arc::new(edit_log.clone()),
            &base,
        )
        .unwrap();
        let t = EngineTest {
            engine: Arc::new(engine),
            storage,
            edit_log,
        };

        // The level-0 job and the first level-1 job are held side by side.
        let mut held = vec![
            entered_rx.recv_timeout(Duration::from_secs(10)).unwrap(),
            entered_rx.recv_timeout(Duration::from_secs(10)).unwrap(),
        ];
        held.sort();
        assert_eq!(held, vec![b"key0000".to_vec(), b"key0100".to_vec()]);
        // The second level-1 job does not wait for them.
        assert!(wait_until(|| {
            let v = t.engine.current_version();
            v.files(2).iter().any(|f| f.get_smallest() == b"key0200" && f.get_file_number() > 8)
        }));
        assert!(wait_until(|| t.running(2)));

        // New tables over both held ranges can not be compacted yet.
        t.flush(kvs(0..10, "new"));
        t.flush(kvs(100..110, "new"));
        delay(200);
        assert!(t.running(2));
        assert_eq!(t.files_at(0), 6);
        assert_levels_disjoint(&t.engine.current_version());

        resume_tx.send(()).unwrap();
        resume_tx.send(()).unwrap();
        assert!(wait_until(|| t.files_at(0) == 2 && t.running(0)));
        assert_levels_disjoint(&t.engine.current_version());

        t.engine
            .request_manual_compaction(None, None, None)
            .unwrap()
            .wait()
            .unwrap();
        let v = t.engine.current_version();
        assert_levels_disjoint(&v);
        assert_eq!(v.num_level_files(0), 0);
        assert_eq!(v.num_level_files(1), 0);
        let mut expected = kvs(0..10, "new");
        expected.extend(kvs(100..110, "new"));
        expected.extend(kvs(200..210, "v"));
        assert_eq!(t.level_entries(2), expected);
    }

    #[test]
    fn test_paranoid_corruption_is_fatal() {
        let mut opt = Options::default();
        opt.paranoid_checks = true;
        let t = EngineTest::new(opt);
        let errors = t.engine.background_errors();
        let mut inputs = vec![];
        for _ in 0..3 {
            inputs.push(t.flush(kvs(0..10, "v")));
        }
        t.storage.inject_fault(inputs[0], Fault::Corruption);
        inputs.push(t.flush(kvs(0..10, "v")));

        let failure = errors.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(failure.fatal);
        assert!(failure.error.is_corruption());
        assert!(matches!(t.engine.admit(1), Err(DError::Fatal(_))));
        let f = t.storage.insert_table(t.engine.new_file_number(), kvs(0..1, "v"));
        assert!(matches!(t.engine.notify_flushed(f), Err(DError::Fatal(_))));
        assert_eq!(t.files_at(0), 4);
        for n in &inputs {
            assert!(t.storage.contains(*n));
        }
    }

    #[test]
    fn test_corruption_without_paranoid_checks_is_not_fatal() {
        let t = EngineTest::new(Options::default());
        let errors = t.engine.background_errors();
        let first = t.flush(kvs(0..10, "v"));
        t.storage.inject_fault(first, Fault::Corruption);
        for _ in 0..3 {
            t.flush(kvs(0..10, "v"));
        }
        let failure = errors.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(!failure.fatal);
        t.engine.admit(1).unwrap();
    }

    #[test]
    fn test_manual_compaction() {
        let mut opt = Options::default();
        opt.compression_per_level = vec![
            CompressionType::NoCompress,
            CompressionType::NoCompress,
            CompressionType::Zlib,
        ];
        let t = EngineTest::new(opt);
        for i in 0..3 {
            t.flush(kvs(i * 5..i * 5 + 10, &format!("v{}", i)));
        }
        let handle = t
            .engine
            .request_manual_compaction(None, None, None)
            .unwrap();
        handle.wait().unwrap();
        assert!(handle.is_done());
        assert_eq!(t.files_at(0), 0);
        assert_eq!(t.files_at(1), 1);
        let mut expected = kvs(0..5, "v0");
        expected.extend(kvs(5..10, "v1"));
        expected.extend(kvs(10..20, "v2"));
        assert_eq!(t.level_entries(1), expected);

        let handle = t
            .engine
            .request_manual_compaction(Some(1), None, None)
            .unwrap();
        handle.wait().unwrap();
        assert_eq!(t.files_at(1), 0);
        assert_eq!(t.files_at(2), 1);
        assert_eq!(t.level_entries(2), expected);
        let out = t.engine.current_version().files(2)[0].get_file_number();
        assert_eq!(t.storage.compression_of(out), Some(CompressionType::Zlib));

        let r = t.engine.request_manual_compaction(Some(6), None, None);
        assert!(matches!(r, Err(DError::InvalidArgument(_))));
    }

    #[test]
    fn test_manual_compaction_of_empty_range() {
        let t = EngineTest::new(Options::default());
        t.flush(kvs(0..10, "v"));
        let handle = t
            .engine
            .request_manual_compaction(Some(0), Some(b"zzz"), None)
            .unwrap();
        assert!(handle.wait_timeout(Duration::from_secs(10)).unwrap().is_ok());
        assert_eq!(t.files_at(0), 1);
    }

    #[test]
    fn test_cancel_manual_compaction() {
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let (open_tx, open_rx) = crossbeam_channel::unbounded();
        let mut opt = Options::default();
        opt.compaction_filter = Some(Arc::new(Gate {
            entered: entered_tx,
            open: open_rx,
            once: AtomicBool::new(false),
        }));
        let t = EngineTest::new(opt);
        for _ in 0..4 {
            t.flush(kvs(0..10, "v"));
        }
        // The only worker is now held inside an automatic compaction.
        entered_rx.recv_timeout(Duration::from_secs(10)).unwrap();

        let handle = t
            .engine
            .request_manual_compaction(Some(0), None, None)
            .unwrap();
        handle.cancel();
        assert!(handle.is_canceled());
        open_tx.send(()).unwrap();

        let r = handle.wait_timeout(Duration::from_secs(10));
        assert!(matches!(r, Some(Err(DError::CustomError(_)))));
    }

    #[test]
    fn test_compaction_filter() {
        let mut opt = Options::default();
        opt.compaction_filter = Some(Arc::new(DropTmp));
        let t = EngineTest::new(opt);
        t.flush(vec![kv("a", "1"), kv("tmp1", "x")]);
        t.flush(vec![kv("up", "low"), kv("tmp2", "y")]);
        t.engine
            .request_manual_compaction(None, None, None)
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(t.level_entries(1), vec![kv("a", "1"), kv("up", "UP")]);
    }

    #[test]
    fn test_seek_compaction() {
        let storage = MemTableStorage::new();
        let mut base = VersionEdit::new();
        base.add_file(1, storage.insert_table(7, kvs(0..10, "v")));
        let engine = LsmEngine::recover(
            Options::default(),
            Arc::new(storage.clone()),
            Arc::new(MemEditLog::new()),
            &base,
        )
        .unwrap();
        {
            let v = engine.current_version();
            let f = v.files(1)[0].clone();
            let seeks = f.allow_seeks();
            assert!(seeks > 0);
            for _ in 0..seeks {
                engine.record_seek_miss(&v, 1, &f);
            }
        }
        assert!(wait_until(|| engine.current_version().num_level_files(2) == 1));
        assert_eq!(engine.current_version().num_level_files(1), 0);
        assert_eq!(engine.current_version().files(2)[0].get_file_number(), 7);
    }

    #[test]
    fn test_seek_compaction_disabled() {
        let mut opt = Options::default();
        opt.disable_seek_compaction = true;
        let t = EngineTest::new(opt);
        t.flush(kvs(0..10, "v"));
        let v = t.engine.current_version();
        let f = v.files(0)[0].clone();
        let seeks = f.allow_seeks();
        for _ in 0..seeks + 1 {
            t.engine.record_seek_miss(&v, 0, &f);
        }
        assert_eq!(f.allow_seeks(), seeks);
        assert!(v.file_to_compact().is_none());
    }

    #[test]
    fn test_recover() {
        let storage = MemTableStorage::new();
        let edit_log = MemEditLog::new();
        let mut base = VersionEdit::new();
        base.add_file(0, storage.insert_table(3, kvs(0..10, "v")));
        base.add_file(2, storage.insert_table(9, kvs(20..30, "v")));
        let engine = LsmEngine::recover(
            Options::default(),
            Arc::new(storage),
            Arc::new(edit_log.clone()),
            &base,
        )
        .unwrap();
        let v = engine.current_version();
        assert_eq!(v.num_level_files(0), 1);
        assert_eq!(v.num_level_files(2), 1);
        assert!(edit_log.is_empty());
        assert_eq!(engine.new_file_number(), 10);
    }

    #[test]
    fn test_flush_pushdown() {
        let t = EngineTest::new(Options::default());
        let place = |entries: Entries| {
            let f = t.storage.insert_table(t.engine.new_file_number(), entries);
            t.engine.notify_flushed_pushdown(f).unwrap()
        };
        assert_eq!(place(kvs(0..10, "v")), 2);
        assert_eq!(place(kvs(5..15, "v")), 1);
        assert_eq!(place(kvs(5..6, "v")), 0);
        assert_eq!(place(kvs(50..60, "v")), 2);
        assert_eq!(t.files_at(2), 2);
    }

    #[test]
    fn test_slowdown_delays_write() {
        let env = Arc::new(TestEnv::new());
        let mut opt = Options::default();
        opt.env = env.clone();
        opt.disable_auto_compactions = true;
        let t = EngineTest::new(opt);
        for _ in 0..7 {
            t.flush(kvs(0..10, "v"));
        }
        t.engine.admit(10).unwrap();
        assert_eq!(env.sleeps(), 0);
        t.flush(kvs(0..10, "v"));
        t.engine.admit(10).unwrap();
        assert_eq!(env.sleeps(), 1);
        let stats = t.engine.get_property("dakv.stats").unwrap();
        assert!(stats.contains("level0_slowdown (1)"), "{}", stats);
    }

    #[test]
    fn test_merge_needs_operator() {
        let t = EngineTest::new(Options::default());
        assert!(matches!(
            t.engine.admit_merge(10),
            Err(DError::NotSupported(_))
        ));

        let mut opt = Options::default();
        opt.merge_operator = Some(Arc::new(Concat));
        let t = EngineTest::new(opt);
        t.engine.admit_merge(10).unwrap();
    }

    #[test]
    fn test_properties() {
        let mut opt = Options::default();
        opt.disable_auto_compactions = true;
        let t = EngineTest::new(opt);
        let n = t.flush(kvs(0..10, "v"));
        t.flush(kvs(0..10, "v"));
        let e = &t.engine;
        assert_eq!(e.get_property("dakv.num-files-at-level0"), Some("2".to_owned()));
        assert_eq!(e.get_property("dakv.num-files-at-level1"), Some("0".to_owned()));
        assert_eq!(e.get_property("dakv.num-files-at-level7"), None);
        assert_eq!(e.get_property("dakv.num-files-at-levelx"), None);
        assert_eq!(e.get_property("dakv.max-compaction-score"), Some("0.500".to_owned()));
        assert_eq!(e.get_property("dakv.unknown"), None);
        assert_eq!(e.get_property("num-files-at-level0"), None);
        let sstables = e.get_property("dakv.sstables").unwrap();
        assert!(sstables.contains("--- level 0 ---"));
        assert!(sstables.contains(&n.to_string()));
        let stats = e.get_property("dakv.stats").unwrap();
        assert!(stats.contains("Compactions"));
    }

    #[test]
    fn test_close() {
        let t = EngineTest::new(Options::default());
        t.flush(kvs(0..10, "v"));
        t.engine.close().unwrap();
        t.engine.close().unwrap();
        assert!(matches!(t.engine.admit(1), Err(DError::ShuttingDown)));
        assert!(matches!(
            t.engine.request_manual_compaction(None, None, None),
            Err(DError::ShuttingDown)
        ));
    }
}
