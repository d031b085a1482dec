//! The stream engine: the single entry point for logs, groups and subscribers

use crate::consumer_group::{ConsumerGroup, ConsumerRemoval};
use crate::fanout::LiveSubscription;
use crate::info::{ConsumerInfo, GroupInfo, LogInfo, PendingDetail, PendingQuery};
use crate::log::LogHandle;
use crate::memory::MemoryBackend;
use crate::pending::PendingSummary;
use crate::retention::{self, RetentionManager, RetentionRule, TrimStats};
use crate::scheduler::{self, AutoClaim, BlockingRead, ReadFrom};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use strata_core::{
    observe, AppendHook, Backend, Clock, EngineConfig, Entry, EntryId, EntryStore, Fields,
    GroupStart, Result, StrataError, SystemClock, TrimMode, TrimPolicy,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Builder for [`StreamEngine`]
pub struct StreamEngineBuilder {
    config: EngineConfig,
    backend: Option<Arc<dyn Backend>>,
    clock: Arc<dyn Clock>,
    hooks: Vec<Arc<dyn AppendHook>>,
}

impl StreamEngineBuilder {
    fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            backend: None,
            clock: Arc::new(SystemClock),
            hooks: Vec::new(),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Storage backend (default: in-memory)
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Time source for IDs and idle accounting (default: system clock)
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register a hook that sees every append on every log
    pub fn hook(mut self, hook: Arc<dyn AppendHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn build(self) -> Result<StreamEngine> {
        self.config.validate()?;
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(MemoryBackend::new()) as Arc<dyn Backend>);

        info!(
            backend = backend.kind(),
            hooks = self.hooks.len(),
            "Stream engine opened"
        );

        Ok(StreamEngine {
            inner: Arc::new(EngineInner {
                config: self.config,
                backend,
                clock: self.clock,
                logs: DashMap::new(),
                hooks: self.hooks,
                shutdown: CancellationToken::new(),
                closed: AtomicBool::new(false),
            }),
        })
    }
}

struct EngineInner {
    config: EngineConfig,
    backend: Arc<dyn Backend>,
    clock: Arc<dyn Clock>,
    logs: DashMap<String, Arc<LogHandle>>,
    hooks: Vec<Arc<dyn AppendHook>>,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

/// Owns every log and its consumer groups.
///
/// Cheap to clone; clones share state. Group lifecycle changes are persisted
/// into the log's metadata immediately. Delivery progress (reads, acks and
/// claims) is persisted after every call when `checkpoint_on_write` is
/// enabled, and otherwise on [`checkpoint`](Self::checkpoint) and
/// [`close`](Self::close).
#[derive(Clone)]
pub struct StreamEngine {
    inner: Arc<EngineInner>,
}

impl StreamEngine {
    pub fn builder() -> StreamEngineBuilder {
        StreamEngineBuilder::new()
    }

    /// Open an engine over `backend`
    pub fn open(backend: Arc<dyn Backend>, config: EngineConfig) -> Result<Self> {
        Self::builder().backend(backend).config(config).build()
    }

    /// An engine over a fresh in-memory backend
    pub fn in_memory() -> Result<Self> {
        Self::builder().build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    fn now(&self) -> u64 {
        self.inner.clock.now_ms()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(StrataError::Closed);
        }
        Ok(())
    }

    /// Look up a log, loading it from the backend on first use
    fn handle(&self, name: &str) -> Result<Arc<LogHandle>> {
        self.load(name, false)?
            .ok_or_else(|| StrataError::UnknownLog(name.to_string()))
    }

    fn handle_or_create(&self, name: &str) -> Result<Arc<LogHandle>> {
        self.load(name, true)?
            .ok_or_else(|| StrataError::UnknownLog(name.to_string()))
    }

    fn load(&self, name: &str, create: bool) -> Result<Option<Arc<LogHandle>>> {
        self.ensure_open()?;
        if let Some(handle) = self.inner.logs.get(name) {
            return Ok(Some(handle.clone()));
        }
        if create && name.is_empty() {
            return Err(StrataError::InvalidEntry("log name must not be empty".into()));
        }
        let store = match self.inner.backend.open_log(name, create)? {
            Some(store) => store,
            None => return Ok(None),
        };
        let handle = Arc::new(LogHandle::open(
            name,
            store,
            self.inner.config.live_capacity,
        )?);
        let handle = self
            .inner
            .logs
            .entry(name.to_string())
            .or_insert(handle)
            .clone();
        Ok(Some(handle))
    }

    fn after_mutation(&self, handle: &LogHandle) -> Result<()> {
        if self.inner.config.checkpoint_on_write {
            handle.persist()?;
        }
        Ok(())
    }

    /// Run `f` against one group under the log's write lock
    fn with_group<T>(
        &self,
        log: &str,
        group: &str,
        f: impl FnOnce(&mut ConsumerGroup, &dyn EntryStore, u64) -> Result<T>,
    ) -> Result<T> {
        let handle = self.handle(log)?;
        let result = Self::mutate_group(&handle, log, group, self.now(), f)?;
        self.after_mutation(&handle)?;
        Ok(result)
    }

    /// Like [`with_group`](Self::with_group), but always persists
    fn with_group_durable<T>(
        &self,
        log: &str,
        group: &str,
        f: impl FnOnce(&mut ConsumerGroup, &dyn EntryStore, u64) -> Result<T>,
    ) -> Result<T> {
        let handle = self.handle(log)?;
        let result = Self::mutate_group(&handle, log, group, self.now(), f)?;
        handle.persist()?;
        Ok(result)
    }

    fn mutate_group<T>(
        handle: &LogHandle,
        log: &str,
        group: &str,
        now: u64,
        f: impl FnOnce(&mut ConsumerGroup, &dyn EntryStore, u64) -> Result<T>,
    ) -> Result<T> {
        let mut state = handle.state.write();
        let group = state.groups.get_mut(log, group)?;
        f(group, handle.store.as_ref(), now)
    }

    /// Run `f` against one group under the log's read lock
    fn inspect_group<T>(
        &self,
        log: &str,
        group: &str,
        f: impl FnOnce(&ConsumerGroup, &dyn EntryStore, u64) -> Result<T>,
    ) -> Result<T> {
        let handle = self.handle(log)?;
        let state = handle.state.read();
        let group = state.groups.get(log, group)?;
        f(group, handle.store.as_ref(), self.now())
    }

    fn validate_fields(&self, fields: &Fields) -> Result<()> {
        let config = &self.inner.config;
        if fields.len() > config.max_fields {
            return Err(StrataError::InvalidEntry(format!(
                "{} fields exceeds the limit of {}",
                fields.len(),
                config.max_fields
            )));
        }
        let bytes = fields.payload_bytes();
        if bytes > config.max_entry_bytes {
            return Err(StrataError::InvalidEntry(format!(
                "entry of {} bytes exceeds the limit of {}",
                bytes, config.max_entry_bytes
            )));
        }
        Ok(())
    }

    // ---- Entry store ----

    /// Append an entry with an engine-assigned ID, creating the log if needed
    pub fn append(&self, log: &str, fields: Fields) -> Result<EntryId> {
        self.append_entry(log, None, fields)
    }

    /// Append an entry with a caller-chosen ID, which must be greater than
    /// every ID the log has assigned
    pub fn append_with_id(&self, log: &str, id: EntryId, fields: Fields) -> Result<EntryId> {
        self.append_entry(log, Some(id), fields)
    }

    fn append_entry(&self, log: &str, id: Option<EntryId>, fields: Fields) -> Result<EntryId> {
        self.validate_fields(&fields)?;
        let handle = self.handle_or_create(log)?;
        let entry = handle.append(id, fields, self.now(), &self.inner.hooks)?;
        observe::record_append();
        Ok(entry.id)
    }

    /// Entries with `start <= id <= end` in ascending order
    pub fn range(
        &self,
        log: &str,
        start: EntryId,
        end: EntryId,
        limit: Option<usize>,
    ) -> Result<Vec<Entry>> {
        self.handle(log)?.store.range(start, end, limit)
    }

    /// Entries with `id > after` in ascending order
    pub fn read_from(&self, log: &str, after: EntryId, limit: Option<usize>) -> Result<Vec<Entry>> {
        self.handle(log)?.store.read_after(after, limit)
    }

    pub fn get(&self, log: &str, id: EntryId) -> Result<Option<Entry>> {
        self.handle(log)?.store.get(id)
    }

    /// Create an empty log. Does nothing if it already exists.
    pub fn create_log(&self, log: &str) -> Result<()> {
        self.handle_or_create(log).map(|_| ())
    }

    pub fn list_logs(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        self.inner.backend.list_logs()
    }

    pub fn log_info(&self, log: &str) -> Result<LogInfo> {
        let handle = self.handle(log)?;
        let (groups, retention, last_assigned) = {
            let state = handle.state.read();
            (state.groups.len(), state.retention, state.ids.last())
        };
        Ok(LogInfo {
            name: log.to_string(),
            length: handle.store.len()?,
            first_id: handle.store.first_id()?,
            last_id: handle.store.last_retained_id()?,
            last_assigned,
            groups,
            retention,
        })
    }

    // ---- Consumer group registry ----

    /// Create a consumer group, creating the log if needed.
    ///
    /// `GroupStart::Latest` delivers only entries appended after this call;
    /// `GroupStart::After(id)` replays everything after `id`.
    pub fn create_group(&self, log: &str, group: &str, start: GroupStart) -> Result<()> {
        if group.is_empty() {
            return Err(StrataError::InvalidEntry("group name must not be empty".into()));
        }
        let handle = self.handle_or_create(log)?;
        {
            let mut state = handle.state.write();
            let cursor = match start {
                GroupStart::Latest => state.ids.last(),
                GroupStart::After(id) => id,
            };
            state
                .groups
                .create(log, ConsumerGroup::new(group, cursor, self.now()))?;
            info!(log, group, cursor = %cursor, "Created consumer group");
        }
        handle.persist()
    }

    /// Delete a group and its pending list. Returns false if it did not exist.
    pub fn delete_group(&self, log: &str, group: &str) -> Result<bool> {
        let handle = self.handle(log)?;
        let deleted = handle.state.write().groups.delete(group);
        if deleted {
            info!(log, group, "Deleted consumer group");
            handle.persist()?;
        }
        Ok(deleted)
    }

    /// Move a group's cursor. Pending records are left untouched.
    pub fn set_group_cursor(&self, log: &str, group: &str, start: GroupStart) -> Result<()> {
        let handle = self.handle(log)?;
        {
            let mut state = handle.state.write();
            let cursor = match start {
                GroupStart::Latest => state.ids.last(),
                GroupStart::After(id) => id,
            };
            let group_state = state.groups.get_mut(log, group)?;
            group_state.last_delivered = cursor;
            info!(log, group, cursor = %cursor, "Moved group cursor");
        }
        handle.persist()
    }

    /// Get or create a consumer
    pub fn ensure_consumer(&self, log: &str, group: &str, consumer: &str) -> Result<ConsumerInfo> {
        if consumer.is_empty() {
            return Err(StrataError::InvalidEntry("consumer name must not be empty".into()));
        }
        self.with_group(log, group, |group, _, now| {
            let member = group.touch_consumer(consumer, now).clone();
            Ok(ConsumerInfo::new(group, &member, now))
        })
    }

    /// Remove a consumer. Returns the number of pending records transferred
    /// or dropped.
    pub fn delete_consumer(
        &self,
        log: &str,
        group: &str,
        consumer: &str,
        removal: ConsumerRemoval,
    ) -> Result<usize> {
        self.with_group_durable(log, group, |group_state, _, now| {
            let affected = group_state.remove_consumer(consumer, &removal, now)?;
            if matches!(removal, ConsumerRemoval::Discard) && affected > 0 {
                warn!(
                    log,
                    group,
                    consumer,
                    dropped = affected,
                    "Discarded pending entries of removed consumer"
                );
            } else {
                info!(log, group, consumer, affected, "Removed consumer");
            }
            Ok(affected)
        })
    }

    pub fn group_info(&self, log: &str, group: &str) -> Result<GroupInfo> {
        self.inspect_group(log, group, |group, store, _| {
            Ok(GroupInfo::new(group, group_lag(group, store)?))
        })
    }

    pub fn list_groups(&self, log: &str) -> Result<Vec<GroupInfo>> {
        let handle = self.handle(log)?;
        let state = handle.state.read();
        let infos = state
            .groups
            .iter()
            .map(|group| Ok(GroupInfo::new(group, group_lag(group, handle.store.as_ref())?)))
            .collect();
        infos
    }

    pub fn list_consumers(&self, log: &str, group: &str) -> Result<Vec<ConsumerInfo>> {
        self.inspect_group(log, group, |group, _, now| {
            Ok(group
                .consumers
                .values()
                .map(|consumer| ConsumerInfo::new(group, consumer, now))
                .collect())
        })
    }

    // ---- Delivery ----

    /// Read for `consumer` without blocking.
    ///
    /// `ReadFrom::New` serves entries after the group cursor and records them
    /// as pending; the other modes re-serve the consumer's own pending
    /// entries. `count == 0` means no limit.
    pub fn read_group(
        &self,
        log: &str,
        group: &str,
        consumer: &str,
        from: ReadFrom,
        count: usize,
    ) -> Result<Vec<Entry>> {
        if consumer.is_empty() {
            return Err(StrataError::InvalidEntry("consumer name must not be empty".into()));
        }
        self.with_group(log, group, |group, store, now| match from {
            ReadFrom::New => scheduler::deliver_new(log, group, store, consumer, count, now),
            ref history => {
                scheduler::deliver_history(log, group, store, consumer, history, count, now)
            }
        })
    }

    /// Read new entries for `consumer`, waiting up to `block` for one to
    /// arrive. A zero `block` waits until an entry arrives or the read is
    /// cancelled.
    pub async fn read_group_blocking(
        &self,
        log: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
        cancel: &CancellationToken,
    ) -> Result<BlockingRead> {
        let handle = self.handle(log)?;
        let started = Instant::now();
        let deadline = (!block.is_zero()).then(|| tokio::time::Instant::now() + block);
        let shutdown = self.inner.shutdown.clone();

        let outcome = loop {
            if cancel.is_cancelled() || shutdown.is_cancelled() {
                break BlockingRead::Cancelled;
            }

            // Register interest before looking, so an append between the
            // check and the wait still wakes us
            let notified = handle.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let entries = self.read_group(log, group, consumer, ReadFrom::New, count)?;
            if !entries.is_empty() {
                break BlockingRead::Delivered(entries);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break BlockingRead::Cancelled,
                _ = shutdown.cancelled() => break BlockingRead::Cancelled,
                _ = &mut notified => continue,
                _ = sleep_until(deadline) => break BlockingRead::TimedOut,
            }
        };

        debug!(log, group, consumer, outcome = outcome.outcome(), "Blocking read finished");
        observe::record_blocking_read(started.elapsed(), outcome.outcome());
        Ok(outcome)
    }

    // ---- Pending entries ----

    /// Acknowledge one entry. Returns false if it was not pending.
    ///
    /// Acknowledgment is keyed by entry, so it succeeds regardless of which
    /// consumer currently owns the record.
    pub fn ack(&self, log: &str, group: &str, id: EntryId) -> Result<bool> {
        Ok(self.ack_many(log, group, &[id])? == 1)
    }

    /// Acknowledge several entries. Returns how many were pending.
    pub fn ack_many(&self, log: &str, group: &str, ids: &[EntryId]) -> Result<usize> {
        self.with_group(log, group, |group, _, _| {
            let acked = ids.iter().filter(|id| group.pending.acknowledge(**id)).count();
            observe::record_ack(acked as u64);
            Ok(acked)
        })
    }

    /// Move pending records idle for at least `min_idle_ms` to `consumer`.
    ///
    /// Without `ids` the scan covers at most `claim_page_size` records from
    /// the oldest pending one.
    pub fn claim(
        &self,
        log: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        ids: Option<&[EntryId]>,
    ) -> Result<Vec<Entry>> {
        if consumer.is_empty() {
            return Err(StrataError::InvalidEntry("consumer name must not be empty".into()));
        }
        let page_size = self.inner.config.claim_page_size;
        self.with_group(log, group, |group, store, now| {
            scheduler::claim(log, group, store, consumer, min_idle_ms, ids, page_size, now)
        })
    }

    /// Resumable claim scan starting at `start`. Feed `AutoClaim::next` back
    /// in until it returns `EntryId::MIN`.
    pub fn auto_claim(
        &self,
        log: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        start: EntryId,
        count: usize,
    ) -> Result<AutoClaim> {
        if consumer.is_empty() {
            return Err(StrataError::InvalidEntry("consumer name must not be empty".into()));
        }
        self.with_group(log, group, |group, store, now| {
            scheduler::auto_claim(log, group, store, consumer, min_idle_ms, start, count, now)
        })
    }

    pub fn pending_summary(&self, log: &str, group: &str) -> Result<PendingSummary> {
        self.inspect_group(log, group, |group, _, _| Ok(group.pending.summary()))
    }

    pub fn pending_entries(
        &self,
        log: &str,
        group: &str,
        query: &PendingQuery,
    ) -> Result<Vec<PendingDetail>> {
        self.inspect_group(log, group, |group, _, now| {
            let limit = scheduler::count_limit(query.count).unwrap_or(usize::MAX);
            Ok(group
                .pending
                .scan_from(query.start)
                .take_while(|record| record.id <= query.end)
                .filter(|record| query.matches(record, now))
                .take(limit)
                .map(|record| PendingDetail::new(record, now))
                .collect())
        })
    }

    // ---- Retention ----

    /// Trim a log. Trims of one log run one at a time, but never hold the
    /// log's append lock.
    pub fn trim(&self, log: &str, policy: TrimPolicy, mode: TrimMode) -> Result<TrimStats> {
        let handle = self.handle(log)?;
        let _trim = handle.trim_lock.lock();
        retention::trim_store(
            log,
            handle.store.as_ref(),
            policy,
            mode,
            self.inner.config.trim_slack,
        )
    }

    /// Set or clear a log's standing retention rule
    pub fn set_retention(&self, log: &str, rule: Option<RetentionRule>) -> Result<()> {
        let handle = self.handle(log)?;
        handle.state.write().retention = rule;
        info!(log, ?rule, "Set retention rule");
        // Retention rules are rare and always persisted immediately
        handle.persist()
    }

    pub fn retention(&self, log: &str) -> Result<Option<RetentionRule>> {
        Ok(self.handle(log)?.state.read().retention)
    }

    /// The log's own rule, or the configured default
    pub fn effective_retention(&self, log: &str) -> Result<Option<RetentionRule>> {
        let own = self.retention(log)?;
        let config = &self.inner.config.retention;
        Ok(own.or_else(|| {
            config
                .default_policy
                .map(|policy| RetentionRule::new(policy, config.mode))
        }))
    }

    pub fn retention_manager(&self) -> RetentionManager {
        RetentionManager::new(self.clone())
    }

    /// Spawn the background retention task at the configured interval.
    /// Stops when `cancel` fires or the engine closes.
    pub fn spawn_retention(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let interval = Duration::from_millis(self.inner.config.retention.interval_ms);
        let manager = self.retention_manager();
        tokio::spawn(manager.run_continuous(interval, cancel))
    }

    // ---- Live fan-out ----

    /// Subscribe to entries appended to an existing log from now on
    pub fn subscribe(&self, log: &str) -> Result<LiveSubscription> {
        let handle = self.handle(log)?;
        let rx = handle.live.subscribe();
        Ok(LiveSubscription::new(
            log,
            rx,
            self.inner.shutdown.child_token(),
        ))
    }

    // ---- Lifecycle ----

    /// Persist every loaded log's group state and flush the backend
    pub fn checkpoint(&self) -> Result<()> {
        self.ensure_open()?;
        self.persist_all()
    }

    fn persist_all(&self) -> Result<()> {
        for handle in self.inner.logs.iter() {
            handle.persist()?;
        }
        self.inner.backend.sync_all()
    }

    /// Persist state, wake every blocked reader and end every subscription.
    /// Later calls fail with `StrataError::Closed`.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.shutdown.cancel();
        let result = self.persist_all();
        self.inner.logs.clear();
        info!("Stream engine closed");
        result
    }
}

/// Retained entries after the group cursor
fn group_lag(group: &ConsumerGroup, store: &dyn EntryStore) -> Result<u64> {
    match group.last_delivered.successor() {
        Some(start) => store.count_range(start, EntryId::MAX),
        None => Ok(0),
    }
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
