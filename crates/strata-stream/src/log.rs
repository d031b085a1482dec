//! Per-log runtime state
//!
//! A [`LogHandle`] pairs a backend store with everything the engine keeps in
//! memory for that log: the ID generator, the group registry, the standing
//! retention rule, the append notifier used by blocking reads, and the live
//! fan-out channel.

use crate::consumer_group::GroupRegistry;
use crate::id_gen::IdGenerator;
use crate::retention::RetentionRule;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use strata_core::{AppendHook, Entry, EntryId, EntryStore, Fields, Result};
use tokio::sync::{broadcast, Notify};
use tracing::trace;

const GROUPS_KEY: &str = "groups";
const RETENTION_KEY: &str = "retention";

pub(crate) struct LogState {
    pub ids: IdGenerator,
    pub groups: GroupRegistry,
    pub retention: Option<RetentionRule>,
}

pub(crate) struct LogHandle {
    pub name: String,
    pub store: Arc<dyn EntryStore>,
    pub state: RwLock<LogState>,
    /// Serializes trims. Separate from `state` so appends keep flowing.
    pub trim_lock: Mutex<()>,
    /// Serializes metadata writes so an older snapshot never lands last
    persist_lock: Mutex<()>,
    pub appended: Notify,
    pub live: broadcast::Sender<Entry>,
}

impl LogHandle {
    /// Load a log's persisted state from its store
    pub fn open(name: &str, store: Arc<dyn EntryStore>, live_capacity: usize) -> Result<Self> {
        let ids = IdGenerator::new(store.last_assigned_id()?);
        let groups = match store.get_meta(GROUPS_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => GroupRegistry::new(),
        };
        let retention = match store.get_meta(RETENTION_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => None,
        };
        let (live, _) = broadcast::channel(live_capacity);

        trace!(log = name, last_id = %ids.last(), groups = groups.len(), "Opened log");

        Ok(Self {
            name: name.to_string(),
            store,
            state: RwLock::new(LogState {
                ids,
                groups,
                retention,
            }),
            trim_lock: Mutex::new(()),
            persist_lock: Mutex::new(()),
            appended: Notify::new(),
            live,
        })
    }

    /// Assign an ID (or validate `explicit`), store the entry and notify
    /// hooks, live subscribers and blocked readers.
    pub fn append(
        &self,
        explicit: Option<EntryId>,
        fields: Fields,
        now_ms: u64,
        hooks: &[Arc<dyn AppendHook>],
    ) -> Result<Entry> {
        let entry = {
            let mut state = self.state.write();
            let id = match explicit {
                Some(id) => state.ids.check_explicit(id)?,
                None => state.ids.propose(now_ms)?,
            };
            let entry = Entry::new(id, fields);
            self.store.append(&entry)?;
            state.ids.advance(id);

            // Still under the lock so hooks and subscribers observe append order
            for hook in hooks {
                hook.on_append(&self.name, &entry);
            }
            let _ = self.live.send(entry.clone());
            entry
        };

        self.appended.notify_waiters();
        Ok(entry)
    }

    /// Write group state and the retention rule into the store's metadata
    pub fn persist(&self) -> Result<()> {
        let _persist = self.persist_lock.lock();
        let (groups, retention) = {
            let state = self.state.read();
            (
                serde_json::to_vec(&state.groups)?,
                serde_json::to_vec(&state.retention)?,
            )
        };
        self.store.put_meta(GROUPS_KEY, &groups)?;
        self.store.put_meta(RETENTION_KEY, &retention)?;
        Ok(())
    }
}
