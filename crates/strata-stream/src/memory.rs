//! In-memory backend
//!
//! Keeps entries in a `BTreeMap` without persistence. Used by tests and by
//! embedders that only need a process-lifetime log.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use strata_core::{Backend, Entry, EntryId, EntryStore, Result};

#[derive(Default)]
struct MemoryInner {
    entries: BTreeMap<EntryId, Entry>,
    last_assigned: EntryId,
    meta: HashMap<String, Vec<u8>>,
}

/// In-memory implementation of [`EntryStore`]
#[derive(Default)]
pub struct MemoryEntryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntryStore for MemoryEntryStore {
    fn append(&self, entry: &Entry) -> Result<()> {
        let mut inner = self.inner.write();
        if entry.id > inner.last_assigned {
            inner.last_assigned = entry.id;
        }
        inner.entries.insert(entry.id, entry.clone());
        Ok(())
    }

    fn range(&self, start: EntryId, end: EntryId, limit: Option<usize>) -> Result<Vec<Entry>> {
        if start > end {
            return Ok(Vec::new());
        }
        let inner = self.inner.read();
        let iter = inner.entries.range(start..=end).map(|(_, e)| e.clone());
        Ok(match limit {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        })
    }

    fn count_range(&self, start: EntryId, end: EntryId) -> Result<u64> {
        if start > end {
            return Ok(0);
        }
        Ok(self.inner.read().entries.range(start..=end).count() as u64)
    }

    fn get(&self, id: EntryId) -> Result<Option<Entry>> {
        Ok(self.inner.read().entries.get(&id).cloned())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.inner.read().entries.len() as u64)
    }

    fn first_id(&self) -> Result<Option<EntryId>> {
        Ok(self.inner.read().entries.keys().next().copied())
    }

    fn last_retained_id(&self) -> Result<Option<EntryId>> {
        Ok(self.inner.read().entries.keys().next_back().copied())
    }

    fn last_assigned_id(&self) -> Result<EntryId> {
        Ok(self.inner.read().last_assigned)
    }

    fn nth_id(&self, n: u64) -> Result<Option<EntryId>> {
        Ok(self.inner.read().entries.keys().nth(n as usize).copied())
    }

    fn remove_before(&self, boundary: EntryId) -> Result<u64> {
        let mut inner = self.inner.write();
        let kept = inner.entries.split_off(&boundary);
        let removed = inner.entries.len() as u64;
        inner.entries = kept;
        Ok(removed)
    }

    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.read().meta.get(key).cloned())
    }

    fn put_meta(&self, key: &str, value: &[u8]) -> Result<()> {
        self.inner
            .write()
            .meta
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

/// A set of in-memory logs
#[derive(Default)]
pub struct MemoryBackend {
    logs: DashMap<String, Arc<MemoryEntryStore>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemoryBackend {
    fn open_log(&self, name: &str, create: bool) -> Result<Option<Arc<dyn EntryStore>>> {
        if let Some(store) = self.logs.get(name) {
            return Ok(Some(store.clone() as Arc<dyn EntryStore>));
        }
        if !create {
            return Ok(None);
        }
        let store = self
            .logs
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryEntryStore::new()))
            .clone();
        Ok(Some(store as Arc<dyn EntryStore>))
    }

    fn list_logs(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.logs.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    fn sync_all(&self) -> Result<()> {
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}
