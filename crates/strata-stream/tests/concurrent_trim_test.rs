//! Trimming while appends, group reads, claims and other trims are running

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use strata_core::{EngineConfig, EntryId, Fields, GroupStart, TrimMode, TrimPolicy};
use strata_file_log::{FileBackend, FileLogConfig};
use strata_stream::{ReadFrom, StreamEngine};

const KEEP: u64 = 50;
const APPENDS: u64 = 1_500;

fn numbered(n: u64) -> Fields {
    Fields::new([("n", n.to_string())]).unwrap()
}

/// A full scan reads every retained entry back from storage
fn assert_readable_and_ordered(engine: &StreamEngine) {
    let retained = engine
        .range("log", EntryId::MIN, EntryId::MAX, None)
        .unwrap();
    assert!(retained.windows(2).all(|w| w[0].id < w[1].id));
    assert!(retained.iter().all(|e| e.text("n").is_some()));
}

fn run_trim_storm(engine: StreamEngine) {
    engine.create_group("log", "g", GroupStart::BEGINNING).unwrap();
    let done = Arc::new(AtomicBool::new(false));
    let appended = Arc::new(AtomicU64::new(0));

    let appender = {
        let engine = engine.clone();
        let done = done.clone();
        let appended = appended.clone();
        thread::spawn(move || {
            for n in 0..APPENDS {
                engine.append("log", numbered(n)).unwrap();
                appended.fetch_add(1, Ordering::SeqCst);
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let trimmers: Vec<_> = [TrimMode::Exact, TrimMode::Approximate, TrimMode::Exact]
        .into_iter()
        .map(|mode| {
            let engine = engine.clone();
            let done = done.clone();
            let appended = appended.clone();
            thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    let floor = appended.load(Ordering::SeqCst).min(KEEP);
                    engine
                        .trim("log", TrimPolicy::MaxLength(KEEP), mode)
                        .unwrap();
                    let length = engine.log_info("log").unwrap().length;
                    assert!(length >= floor, "{} retained, at least {} expected", length, floor);
                }
            })
        })
        .collect();

    let consumer = {
        let engine = engine.clone();
        let done = done.clone();
        thread::spawn(move || {
            let mut delivered = 0usize;
            while !done.load(Ordering::SeqCst) {
                let entries = engine
                    .read_group("log", "g", "reader", ReadFrom::New, 10)
                    .unwrap();
                assert!(entries.windows(2).all(|w| w[0].id < w[1].id));
                delivered += entries.len();

                // Hand half back to the pending list for the claimer
                let ids: Vec<EntryId> = entries.iter().step_by(2).map(|e| e.id).collect();
                engine.ack_many("log", "g", &ids).unwrap();
                engine
                    .claim("log", "g", "claimer", 0, None)
                    .unwrap();
            }
            delivered
        })
    };

    let reader = {
        let engine = engine.clone();
        let done = done.clone();
        thread::spawn(move || {
            while !done.load(Ordering::SeqCst) {
                assert_readable_and_ordered(&engine);
            }
        })
    };

    appender.join().unwrap();
    for trimmer in trimmers {
        trimmer.join().unwrap();
    }
    consumer.join().unwrap();
    reader.join().unwrap();

    // Settle and check the final state
    engine
        .trim("log", TrimPolicy::MaxLength(KEEP), TrimMode::Exact)
        .unwrap();
    let info = engine.log_info("log").unwrap();
    assert_eq!(info.length, KEEP);
    assert_eq!(info.last_assigned, info.last_id.unwrap());

    let retained = engine
        .range("log", EntryId::MIN, EntryId::MAX, None)
        .unwrap();
    assert_eq!(retained.len() as u64, KEEP);
    assert!(retained.windows(2).all(|w| w[0].id < w[1].id));
    for entry in &retained {
        assert_eq!(engine.get("log", entry.id).unwrap().as_ref(), Some(entry));
    }
    let last_n = retained.last().and_then(|e| e.text("n")).unwrap();
    assert_eq!(last_n, (APPENDS - 1).to_string());

    // Pending records never outlive the entries they point at
    let summary = engine.pending_summary("log", "g").unwrap();
    let claimed = engine.claim("log", "g", "claimer", 0, None).unwrap();
    assert!(claimed.iter().all(|e| e.id >= retained[0].id));
    assert!(engine.pending_summary("log", "g").unwrap().count <= summary.count);
}

#[test]
fn test_trim_storm_in_memory() {
    run_trim_storm(
        StreamEngine::builder()
            .config(EngineConfig::default().with_trim_slack(8))
            .build()
            .unwrap(),
    );
}

#[test]
fn test_trim_storm_on_segment_files() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = FileLogConfig::new(temp_dir.path()).with_max_segment_size(512);
    let backend = Arc::new(FileBackend::open(config).unwrap());
    let engine = StreamEngine::builder()
        .backend(backend)
        .config(
            EngineConfig::default()
                .with_trim_slack(8)
                .with_checkpoint_on_write(false),
        )
        .build()
        .unwrap();

    run_trim_storm(engine.clone());
    engine.close().unwrap();
}
