//! Delivery scheduling for group reads and claims
//!
//! These functions operate on one group while the caller holds the log's
//! state lock, which makes cursor advancement, pending-list updates and the
//! entries handed out a single atomic step.

use crate::consumer_group::ConsumerGroup;
use strata_core::{observe, Entry, EntryId, EntryStore, Result};
use tracing::{debug, warn};

/// Where a group read starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadFrom {
    /// `>`: entries never delivered to the group
    New,
    /// The consumer's own pending entries with ID greater than the given one.
    /// `EntryId::MIN` replays them from the start.
    Pending(EntryId),
    /// Specific entries, served only if pending for the consumer
    Ids(Vec<EntryId>),
}

impl ReadFrom {
    /// Parse the textual cursor form: `>` for new entries, otherwise an ID
    pub fn parse(s: &str) -> Result<Self> {
        if s == ">" {
            Ok(Self::New)
        } else {
            Ok(Self::Pending(s.parse()?))
        }
    }

    pub fn is_history(&self) -> bool {
        !matches!(self, Self::New)
    }
}

/// Outcome of a blocking group read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockingRead {
    /// Entries were handed to the consumer
    Delivered(Vec<Entry>),
    /// The block time elapsed with nothing to deliver
    TimedOut,
    /// The caller or the engine cancelled the wait
    Cancelled,
}

impl BlockingRead {
    /// The delivered entries, or an empty vector for the other outcomes
    pub fn into_entries(self) -> Vec<Entry> {
        match self {
            Self::Delivered(entries) => entries,
            Self::TimedOut | Self::Cancelled => Vec::new(),
        }
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Delivered(_) => "delivered",
            Self::TimedOut => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Result of a resumable claim scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoClaim {
    /// Where the next scan should start; `EntryId::MIN` once the list was
    /// scanned to the end
    pub next: EntryId,
    /// Entries now owned by the claiming consumer
    pub entries: Vec<Entry>,
    /// Pending records dropped because their entry was trimmed
    pub dropped: Vec<EntryId>,
}

/// Turn a `count` argument into a limit. Zero means no limit.
pub(crate) fn count_limit(count: usize) -> Option<usize> {
    (count > 0).then_some(count)
}

/// Drop pending records that point below the oldest retained entry.
///
/// Trimming only removes a prefix, so everything under the first retained ID
/// (or every record, when the log is empty) refers to a trimmed entry.
pub(crate) fn reconcile_orphans(
    log: &str,
    group: &mut ConsumerGroup,
    store: &dyn EntryStore,
) -> Result<Vec<EntryId>> {
    if group.pending.is_empty() {
        return Ok(Vec::new());
    }
    let boundary = match store.first_id()? {
        Some(first) => first,
        None => store
            .last_assigned_id()?
            .successor()
            .unwrap_or(EntryId::MAX),
    };
    let dropped = group.pending.drop_before(boundary);
    report_orphans(log, &group.name, &dropped);
    Ok(dropped)
}

fn report_orphans(log: &str, group: &str, dropped: &[EntryId]) {
    if dropped.is_empty() {
        return;
    }
    warn!(
        log,
        group,
        count = dropped.len(),
        first = %dropped[0],
        "Dropped pending entries whose data was trimmed"
    );
    observe::record_orphans_dropped(dropped.len() as u64);
}

/// Serve entries after the group cursor to `consumer`
pub(crate) fn deliver_new(
    log: &str,
    group: &mut ConsumerGroup,
    store: &dyn EntryStore,
    consumer: &str,
    count: usize,
    now_ms: u64,
) -> Result<Vec<Entry>> {
    reconcile_orphans(log, group, store)?;
    group.touch_consumer(consumer, now_ms);

    let entries = store.read_after(group.last_delivered, count_limit(count))?;
    for entry in &entries {
        group.pending.record_delivery(entry.id, consumer, now_ms);
        group.advance_cursor(entry.id);
    }

    if !entries.is_empty() {
        debug!(
            log,
            group = %group.name,
            consumer,
            count = entries.len(),
            cursor = %group.last_delivered,
            "Delivered new entries"
        );
        observe::record_delivery(entries.len() as u64, false);
    }
    Ok(entries)
}

/// Re-serve entries already pending for `consumer`
pub(crate) fn deliver_history(
    log: &str,
    group: &mut ConsumerGroup,
    store: &dyn EntryStore,
    consumer: &str,
    from: &ReadFrom,
    count: usize,
    now_ms: u64,
) -> Result<Vec<Entry>> {
    if *from == ReadFrom::New {
        return deliver_new(log, group, store, consumer, count, now_ms);
    }
    reconcile_orphans(log, group, store)?;
    group.touch_consumer(consumer, now_ms);

    let limit = count_limit(count);
    let ids = match from {
        ReadFrom::New => Vec::new(),
        ReadFrom::Pending(after) => group.pending.for_consumer(consumer, *after, limit),
        ReadFrom::Ids(ids) => {
            let mut ids: Vec<EntryId> = ids
                .iter()
                .copied()
                .filter(|id| {
                    group
                        .pending
                        .get(*id)
                        .is_some_and(|record| record.consumer == consumer)
                })
                .collect();
            ids.sort_unstable();
            ids.dedup();
            ids.truncate(limit.unwrap_or(usize::MAX));
            ids
        }
    };

    let mut entries = Vec::with_capacity(ids.len());
    let mut orphans = Vec::new();
    for id in ids {
        match store.get(id)? {
            Some(entry) => {
                group.pending.redeliver(id, now_ms);
                entries.push(entry);
            }
            None => {
                group.pending.acknowledge(id);
                orphans.push(id);
            }
        }
    }
    report_orphans(log, &group.name, &orphans);

    if !entries.is_empty() {
        debug!(
            log,
            group = %group.name,
            consumer,
            count = entries.len(),
            "Re-delivered pending entries"
        );
        observe::record_delivery(entries.len() as u64, true);
    }
    Ok(entries)
}

/// Move idle pending records to `consumer`.
///
/// With explicit IDs only those records are considered; otherwise the scan
/// covers at most `page_size` records from the start of the pending list.
#[allow(clippy::too_many_arguments)]
pub(crate) fn claim(
    log: &str,
    group: &mut ConsumerGroup,
    store: &dyn EntryStore,
    consumer: &str,
    min_idle_ms: u64,
    ids: Option<&[EntryId]>,
    page_size: usize,
    now_ms: u64,
) -> Result<Vec<Entry>> {
    reconcile_orphans(log, group, store)?;

    let candidates: Vec<EntryId> = match ids {
        Some(ids) => {
            let mut ids = ids.to_vec();
            ids.sort_unstable();
            ids.dedup();
            ids
        }
        None => group
            .pending
            .scan_from(EntryId::MIN)
            .take(page_size)
            .map(|record| record.id)
            .collect(),
    };

    let (entries, orphans) =
        claim_candidates(group, store, consumer, min_idle_ms, &candidates, now_ms)?;
    report_orphans(log, &group.name, &orphans);
    group.touch_consumer(consumer, now_ms);

    if !entries.is_empty() {
        debug!(
            log,
            group = %group.name,
            consumer,
            count = entries.len(),
            "Claimed pending entries"
        );
        observe::record_claim(entries.len() as u64);
    }
    Ok(entries)
}

/// Resumable claim scan starting at `start`, examining at most
/// `count * 10` pending records
#[allow(clippy::too_many_arguments)]
pub(crate) fn auto_claim(
    log: &str,
    group: &mut ConsumerGroup,
    store: &dyn EntryStore,
    consumer: &str,
    min_idle_ms: u64,
    start: EntryId,
    count: usize,
    now_ms: u64,
) -> Result<AutoClaim> {
    let mut dropped = reconcile_orphans(log, group, store)?;
    let count = count.max(1);
    let budget = count.saturating_mul(10);

    let mut candidates = Vec::new();
    let mut examined = 0;
    let mut next = EntryId::MIN;
    for record in group.pending.scan_from(start) {
        if candidates.len() == count || examined == budget {
            next = record.id;
            break;
        }
        examined += 1;
        if record.idle_ms(now_ms) >= min_idle_ms {
            candidates.push(record.id);
        }
    }

    let (entries, orphans) =
        claim_candidates(group, store, consumer, min_idle_ms, &candidates, now_ms)?;
    report_orphans(log, &group.name, &orphans);
    dropped.extend(orphans);
    group.touch_consumer(consumer, now_ms);

    if !entries.is_empty() {
        observe::record_claim(entries.len() as u64);
    }
    Ok(AutoClaim {
        next,
        entries,
        dropped,
    })
}

fn claim_candidates(
    group: &mut ConsumerGroup,
    store: &dyn EntryStore,
    consumer: &str,
    min_idle_ms: u64,
    candidates: &[EntryId],
    now_ms: u64,
) -> Result<(Vec<Entry>, Vec<EntryId>)> {
    let mut entries = Vec::new();
    let mut orphans = Vec::new();
    for &id in candidates {
        let idle_enough = group
            .pending
            .get(id)
            .is_some_and(|record| record.idle_ms(now_ms) >= min_idle_ms);
        if !idle_enough {
            continue;
        }
        match store.get(id)? {
            Some(entry) => {
                group.pending.claim(id, consumer, min_idle_ms, now_ms);
                entries.push(entry);
            }
            None => {
                group.pending.acknowledge(id);
                orphans.push(id);
            }
        }
    }
    Ok((entries, orphans))
}
