//! Blocking group reads, live subscriptions and append hooks

use futures::StreamExt;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use strata_core::{AppendHook, Entry, EntryId, Fields, GroupStart};
use strata_stream::{BlockingRead, StreamEngine};
use tokio_util::sync::CancellationToken;

fn numbered(n: u64) -> Fields {
    Fields::new([("n", n.to_string())]).unwrap()
}

fn engine_with_group() -> StreamEngine {
    let engine = StreamEngine::in_memory().unwrap();
    engine.create_group("log", "g", GroupStart::Latest).unwrap();
    engine
}

#[tokio::test]
async fn test_blocking_read_times_out_when_idle() {
    let engine = engine_with_group();
    let cancel = CancellationToken::new();

    let started = Instant::now();
    let outcome = engine
        .read_group_blocking("log", "g", "c", 10, Duration::from_millis(100), &cancel)
        .await
        .unwrap();

    assert_eq!(outcome, BlockingRead::TimedOut);
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_blocking_read_wakes_on_append() {
    let engine = engine_with_group();
    let cancel = CancellationToken::new();

    let producer = engine.clone();
    let append = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        producer.append("log", numbered(1)).unwrap()
    });

    let started = Instant::now();
    let outcome = engine
        .read_group_blocking("log", "g", "c", 10, Duration::from_millis(100), &cancel)
        .await
        .unwrap();
    let appended = append.await.unwrap();

    let entries = match outcome {
        BlockingRead::Delivered(entries) => entries,
        other => panic!("expected delivery, got {:?}", other),
    };
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, appended);
    assert!(started.elapsed() < Duration::from_millis(100));
}

#[tokio::test]
async fn test_blocking_read_returns_available_entries_immediately() {
    let engine = engine_with_group();
    engine.append("log", numbered(1)).unwrap();

    let outcome = engine
        .read_group_blocking(
            "log",
            "g",
            "c",
            10,
            Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.into_entries().len(), 1);
}

#[tokio::test]
async fn test_blocking_read_cancelled() {
    let engine = engine_with_group();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    // Zero block means wait until an entry arrives or the read is cancelled
    let outcome = engine
        .read_group_blocking("log", "g", "c", 10, Duration::ZERO, &cancel)
        .await
        .unwrap();
    assert_eq!(outcome, BlockingRead::Cancelled);

    // Nothing was recorded for the cancelled read
    assert_eq!(engine.pending_summary("log", "g").unwrap().count, 0);
}

#[tokio::test]
async fn test_close_cancels_blocked_readers() {
    let engine = engine_with_group();
    let reader = engine.clone();
    let blocked = tokio::spawn(async move {
        reader
            .read_group_blocking(
                "log",
                "g",
                "c",
                1,
                Duration::ZERO,
                &CancellationToken::new(),
            )
            .await
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    engine.close().unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(1), blocked)
        .await
        .expect("reader should wake on close")
        .unwrap()
        .unwrap();
    assert_eq!(outcome, BlockingRead::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_blocked_readers_never_share_an_entry() {
    let engine = engine_with_group();
    let cancel = CancellationToken::new();

    let readers: Vec<_> = (0..4)
        .map(|i| {
            let engine = engine.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let consumer = format!("c{}", i);
                let mut got = Vec::new();
                loop {
                    match engine
                        .read_group_blocking(
                            "log",
                            "g",
                            &consumer,
                            1,
                            Duration::from_millis(200),
                            &cancel,
                        )
                        .await
                        .unwrap()
                    {
                        BlockingRead::Delivered(entries) => {
                            got.extend(entries.into_iter().map(|e| e.id))
                        }
                        BlockingRead::TimedOut | BlockingRead::Cancelled => break,
                    }
                }
                got
            })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(20)).await;
    for n in 0..40 {
        engine.append("log", numbered(n)).unwrap();
        if n % 8 == 0 {
            tokio::task::yield_now().await;
        }
    }

    let mut all: Vec<EntryId> = Vec::new();
    for reader in readers {
        all.extend(reader.await.unwrap());
    }
    let unique: HashSet<EntryId> = all.iter().copied().collect();
    assert_eq!(all.len(), 40);
    assert_eq!(unique.len(), 40);
}

#[tokio::test]
async fn test_subscriber_sees_only_new_entries() {
    let engine = StreamEngine::in_memory().unwrap();
    engine.append("log", numbered(0)).unwrap();

    let mut sub = engine.subscribe("log").unwrap();
    assert_eq!(sub.log(), "log");

    let a = engine.append("log", numbered(1)).unwrap();
    let b = engine.append("log", numbered(2)).unwrap();

    assert_eq!(sub.next().await.unwrap().id, a);
    assert_eq!(sub.next().await.unwrap().id, b);
}

#[tokio::test]
async fn test_subscribe_requires_existing_log() {
    let engine = StreamEngine::in_memory().unwrap();
    assert!(engine.subscribe("missing").is_err());
}

#[tokio::test]
async fn test_subscription_stops_on_cancel_and_close() {
    let engine = StreamEngine::in_memory().unwrap();
    engine.create_log("log").unwrap();

    let sub = engine.subscribe("log").unwrap();
    let token = sub.cancel_token();
    let mut stream = Box::pin(sub.into_stream());

    engine.append("log", numbered(1)).unwrap();
    assert!(stream.next().await.is_some());
    token.cancel();
    assert!(stream.next().await.is_none());

    let mut other = engine.subscribe("log").unwrap();
    engine.close().unwrap();
    let ended = tokio::time::timeout(Duration::from_secs(1), other.next())
        .await
        .expect("subscription should end on close");
    assert!(ended.is_none());
}

#[tokio::test]
async fn test_unsubscribe_leaves_others_running() {
    let engine = StreamEngine::in_memory().unwrap();
    engine.create_log("log").unwrap();

    let first = engine.subscribe("log").unwrap();
    let mut second = engine.subscribe("log").unwrap();
    first.unsubscribe();

    let id = engine.append("log", numbered(1)).unwrap();
    assert_eq!(second.next().await.unwrap().id, id);
}

struct Recorder {
    seen: Mutex<Vec<(String, EntryId)>>,
}

impl AppendHook for Recorder {
    fn on_append(&self, log: &str, entry: &Entry) {
        self.seen.lock().unwrap().push((log.to_string(), entry.id));
    }
}

#[tokio::test]
async fn test_append_hook_sees_every_log_in_order() {
    let recorder = Arc::new(Recorder {
        seen: Mutex::new(Vec::new()),
    });
    let engine = StreamEngine::builder()
        .hook(recorder.clone())
        .build()
        .unwrap();

    let mut expected = Vec::new();
    for n in 0..10 {
        let log = if n % 2 == 0 { "even" } else { "odd" };
        let id = engine.append(log, numbered(n)).unwrap();
        expected.push((log.to_string(), id));
    }

    assert_eq!(*recorder.seen.lock().unwrap(), expected);
}
