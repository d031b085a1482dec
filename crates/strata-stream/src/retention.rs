//! Retention policies and trimming

use crate::engine::StreamEngine;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use strata_core::{observe, EntryId, EntryStore, Result, TrimMode, TrimPolicy};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A standing retention policy for one log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionRule {
    pub policy: TrimPolicy,
    #[serde(default)]
    pub mode: TrimMode,
}

impl RetentionRule {
    pub fn new(policy: TrimPolicy, mode: TrimMode) -> Self {
        Self { policy, mode }
    }
}

/// Statistics from a trim
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrimStats {
    /// Number of entries removed
    pub removed: u64,
    /// Entries below this ID were removed; `None` when nothing was in excess
    pub boundary: Option<EntryId>,
    /// Entries left in the log
    pub remaining: u64,
}

impl TrimStats {
    pub fn empty(remaining: u64) -> Self {
        Self {
            removed: 0,
            boundary: None,
            remaining,
        }
    }
}

/// Compute the first ID a trim keeps, or `None` when nothing should go.
///
/// Approximate mode only removes whole chunks of `slack` entries, and only
/// when at least one full chunk is in excess, so it never removes an entry
/// the exact policy would keep.
pub(crate) fn trim_boundary(
    store: &dyn EntryStore,
    policy: TrimPolicy,
    mode: TrimMode,
    slack: u64,
) -> Result<Option<EntryId>> {
    let excess = match policy {
        TrimPolicy::MaxLength(max) => store.len()?.saturating_sub(max),
        TrimPolicy::MinId(min_id) => match (mode, min_id.predecessor()) {
            (TrimMode::Exact, _) => {
                return Ok(match store.first_id()? {
                    Some(first) if first < min_id => Some(min_id),
                    _ => None,
                });
            }
            (TrimMode::Approximate, Some(below)) => store.count_range(EntryId::MIN, below)?,
            (TrimMode::Approximate, None) => 0,
        },
    };

    let removable = match mode {
        TrimMode::Exact => excess,
        TrimMode::Approximate => excess - excess % slack.max(1),
    };
    if removable == 0 {
        return Ok(None);
    }

    // Anchor on the last entry to remove. Appends only add larger IDs, and a
    // log that shrank since `len()` has nothing left for this trim to take.
    match store.nth_id(removable - 1)? {
        Some(last_removed) => Ok(Some(last_removed.successor().unwrap_or(EntryId::MAX))),
        None => Ok(None),
    }
}

/// Apply a trim policy to a store.
///
/// Callers serialize trims of one log; appends may run concurrently.
pub(crate) fn trim_store(
    log: &str,
    store: &dyn EntryStore,
    policy: TrimPolicy,
    mode: TrimMode,
    slack: u64,
) -> Result<TrimStats> {
    let started = Instant::now();
    let boundary = match trim_boundary(store, policy, mode, slack)? {
        Some(boundary) => boundary,
        None => return Ok(TrimStats::empty(store.len()?)),
    };

    let removed = store.remove_before(boundary)?;
    let remaining = store.len()?;
    observe::record_trim(removed, started.elapsed());
    if removed > 0 {
        info!(log, removed, remaining, boundary = %boundary, ?mode, "Trimmed log");
    }

    Ok(TrimStats {
        removed,
        boundary: Some(boundary),
        remaining,
    })
}

/// Applies standing retention rules to every log of an engine
pub struct RetentionManager {
    engine: StreamEngine,
}

impl RetentionManager {
    pub fn new(engine: StreamEngine) -> Self {
        Self { engine }
    }

    /// Apply the rule for one log (its own rule, or the configured default)
    pub fn enforce(&self, log: &str) -> Result<TrimStats> {
        match self.engine.effective_retention(log)? {
            Some(rule) => self.engine.trim(log, rule.policy, rule.mode),
            None => Ok(TrimStats::empty(self.engine.log_info(log)?.length)),
        }
    }

    /// Apply retention to every log. Returns stats for logs that had a rule.
    pub fn enforce_all(&self) -> Result<Vec<(String, TrimStats)>> {
        let mut results = Vec::new();
        for log in self.engine.list_logs()? {
            if self.engine.effective_retention(&log)?.is_none() {
                continue;
            }
            let stats = self.enforce(&log)?;
            results.push((log, stats));
        }
        Ok(results)
    }

    /// Enforce retention every `interval` until cancelled or the engine closes
    pub async fn run_continuous(self, interval: Duration, cancel: CancellationToken) {
        let shutdown = self.engine.shutdown_token();
        info!(interval_ms = interval.as_millis() as u64, "Retention task started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            match self.enforce_all() {
                Ok(results) => {
                    let removed: u64 = results.iter().map(|(_, s)| s.removed).sum();
                    debug!(logs = results.len(), removed, "Retention pass complete");
                }
                Err(e) => error!("Retention pass failed: {}", e),
            }
        }

        info!("Retention task stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEntryStore;
    use strata_core::{Entry, Fields};

    fn store_with(count: u64) -> MemoryEntryStore {
        let store = MemoryEntryStore::new();
        for ms in 1..=count {
            let fields = Fields::new([("n", ms.to_string())]).unwrap();
            store.append(&Entry::new(EntryId::new(ms, 0), fields)).unwrap();
        }
        store
    }

    #[test]
    fn test_exact_max_length() {
        let store = store_with(5);
        let stats = trim_store("log", &store, TrimPolicy::MaxLength(2), TrimMode::Exact, 100).unwrap();

        assert_eq!(stats.removed, 3);
        assert_eq!(stats.remaining, 2);
        assert_eq!(store.first_id().unwrap(), Some(EntryId::new(4, 0)));
    }

    #[test]
    fn test_max_length_zero_empties_log() {
        let store = store_with(3);
        let stats = trim_store("log", &store, TrimPolicy::MaxLength(0), TrimMode::Exact, 100).unwrap();
        assert_eq!(stats.removed, 3);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_approximate_max_length_removes_whole_chunks() {
        let store = store_with(25);

        let stats = trim_store(
            "log",
            &store,
            TrimPolicy::MaxLength(2),
            TrimMode::Approximate,
            10,
        )
        .unwrap();
        assert_eq!(stats.removed, 20);
        assert_eq!(stats.remaining, 5);

        let stats = trim_store(
            "log",
            &store,
            TrimPolicy::MaxLength(2),
            TrimMode::Approximate,
            10,
        )
        .unwrap();
        assert_eq!(stats.removed, 0);
        assert_eq!(stats.boundary, None);
    }

    #[test]
    fn test_approximate_never_over_trims() {
        for max in 0..30 {
            let store = store_with(30);
            trim_store(
                "log",
                &store,
                TrimPolicy::MaxLength(max),
                TrimMode::Approximate,
                7,
            )
            .unwrap();
            let remaining = store.len().unwrap();
            assert!(remaining >= max, "max {} left {}", max, remaining);
            assert!(remaining < max + 7, "max {} left {}", max, remaining);
        }
    }

    #[test]
    fn test_exact_min_id() {
        let store = store_with(5);
        let stats = trim_store(
            "log",
            &store,
            TrimPolicy::MinId(EntryId::new(3, 0)),
            TrimMode::Exact,
            100,
        )
        .unwrap();
        assert_eq!(stats.removed, 2);
        assert_eq!(store.first_id().unwrap(), Some(EntryId::new(3, 0)));

        let again = trim_store(
            "log",
            &store,
            TrimPolicy::MinId(EntryId::new(3, 0)),
            TrimMode::Exact,
            100,
        )
        .unwrap();
        assert_eq!(again.removed, 0);
    }

    #[test]
    fn test_approximate_min_id_keeps_entries_at_or_above_min() {
        let store = store_with(10);
        trim_store(
            "log",
            &store,
            TrimPolicy::MinId(EntryId::new(8, 0)),
            TrimMode::Approximate,
            3,
        )
        .unwrap();

        // 7 entries are below the minimum; two chunks of 3 go
        assert_eq!(store.first_id().unwrap(), Some(EntryId::new(7, 0)));
    }

    /// Finishes a competing trim right after the outer trim reads `len()`
    struct OverlappingTrim {
        inner: MemoryEntryStore,
        fired: std::sync::atomic::AtomicBool,
    }

    impl EntryStore for OverlappingTrim {
        fn append(&self, entry: &Entry) -> Result<()> {
            self.inner.append(entry)
        }
        fn range(&self, start: EntryId, end: EntryId, limit: Option<usize>) -> Result<Vec<Entry>> {
            self.inner.range(start, end, limit)
        }
        fn get(&self, id: EntryId) -> Result<Option<Entry>> {
            self.inner.get(id)
        }
        fn len(&self) -> Result<u64> {
            let len = self.inner.len()?;
            if !self.fired.swap(true, std::sync::atomic::Ordering::SeqCst) {
                trim_store("log", &self.inner, TrimPolicy::MaxLength(2), TrimMode::Exact, 100)?;
            }
            Ok(len)
        }
        fn first_id(&self) -> Result<Option<EntryId>> {
            self.inner.first_id()
        }
        fn last_retained_id(&self) -> Result<Option<EntryId>> {
            self.inner.last_retained_id()
        }
        fn last_assigned_id(&self) -> Result<EntryId> {
            self.inner.last_assigned_id()
        }
        fn nth_id(&self, n: u64) -> Result<Option<EntryId>> {
            self.inner.nth_id(n)
        }
        fn remove_before(&self, boundary: EntryId) -> Result<u64> {
            self.inner.remove_before(boundary)
        }
        fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.inner.get_meta(key)
        }
        fn put_meta(&self, key: &str, value: &[u8]) -> Result<()> {
            self.inner.put_meta(key, value)
        }
        fn sync(&self) -> Result<()> {
            self.inner.sync()
        }
    }

    #[test]
    fn test_store_shrinking_mid_trim_keeps_policy() {
        let store = OverlappingTrim {
            inner: store_with(5),
            fired: std::sync::atomic::AtomicBool::new(false),
        };

        let stats = trim_store("log", &store, TrimPolicy::MaxLength(2), TrimMode::Exact, 100).unwrap();
        assert_eq!(stats.removed, 0);
        assert_eq!(store.inner.len().unwrap(), 2);
        assert_eq!(store.inner.first_id().unwrap(), Some(EntryId::new(4, 0)));
    }

    #[test]
    fn test_concurrent_engine_trims_never_overshoot() {
        let engine = StreamEngine::in_memory().unwrap();
        for n in 0..200u64 {
            engine
                .append("log", Fields::new([("n", n.to_string())]).unwrap())
                .unwrap();
        }

        let trimmers: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    engine
                        .trim("log", TrimPolicy::MaxLength(10), TrimMode::Exact)
                        .unwrap()
                })
            })
            .collect();
        let removed: u64 = trimmers.into_iter().map(|t| t.join().unwrap().removed).sum();

        assert_eq!(removed, 190);
        assert_eq!(engine.log_info("log").unwrap().length, 10);
    }
}
