//! Pending entry tracking
//!
//! A group's pending list holds one record per delivered but unacknowledged
//! entry. Records are ordered by entry ID, so range scans, orphan cleanup
//! (everything below the oldest retained entry) and resumable claim scans are
//! plain `BTreeMap` range operations.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use strata_core::EntryId;

/// Bookkeeping for one delivered but unacknowledged entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEntry {
    pub id: EntryId,
    /// Current owner
    pub consumer: String,
    /// Number of times the entry has been handed out. Never decreases.
    pub delivery_count: u64,
    pub first_delivered_ms: u64,
    pub last_delivered_ms: u64,
}

impl PendingEntry {
    /// Milliseconds since the last delivery
    pub fn idle_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_delivered_ms)
    }
}

/// Per-group pending entry list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<PendingEntry>", into = "Vec<PendingEntry>")]
pub struct PendingList {
    records: BTreeMap<EntryId, PendingEntry>,
}

impl From<Vec<PendingEntry>> for PendingList {
    fn from(records: Vec<PendingEntry>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.id, r)).collect(),
        }
    }
}

impl From<PendingList> for Vec<PendingEntry> {
    fn from(list: PendingList) -> Self {
        list.records.into_values().collect()
    }
}

/// Aggregate view of a pending list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PendingSummary {
    pub count: u64,
    pub lowest: Option<EntryId>,
    pub highest: Option<EntryId>,
    /// Pending records per consumer, sorted by consumer name
    pub consumers: Vec<(String, u64)>,
}

impl PendingList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: EntryId) -> Option<&PendingEntry> {
        self.records.get(&id)
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.records.contains_key(&id)
    }

    /// Record a first delivery from the group cursor.
    ///
    /// The cursor only moves forward, so an existing record for the same
    /// entry cannot normally exist; if it does (a cursor moved backward by
    /// `set_group_cursor`), ownership moves and the count keeps growing.
    pub fn record_delivery(&mut self, id: EntryId, consumer: &str, now_ms: u64) {
        match self.records.get_mut(&id) {
            Some(record) => {
                record.consumer = consumer.to_string();
                record.delivery_count += 1;
                record.last_delivered_ms = now_ms;
            }
            None => {
                self.records.insert(
                    id,
                    PendingEntry {
                        id,
                        consumer: consumer.to_string(),
                        delivery_count: 1,
                        first_delivered_ms: now_ms,
                        last_delivered_ms: now_ms,
                    },
                );
            }
        }
    }

    /// Remove a record. Returns false when nothing was pending for `id`.
    pub fn acknowledge(&mut self, id: EntryId) -> bool {
        self.records.remove(&id).is_some()
    }

    /// Count a re-delivery to the current owner (history reads)
    pub fn redeliver(&mut self, id: EntryId, now_ms: u64) -> bool {
        match self.records.get_mut(&id) {
            Some(record) => {
                record.delivery_count += 1;
                record.last_delivered_ms = now_ms;
                true
            }
            None => false,
        }
    }

    /// Move a record to `consumer` if it has been idle at least `min_idle_ms`.
    ///
    /// Returns true when the record was claimed.
    pub fn claim(&mut self, id: EntryId, consumer: &str, min_idle_ms: u64, now_ms: u64) -> bool {
        match self.records.get_mut(&id) {
            Some(record) if record.idle_ms(now_ms) >= min_idle_ms => {
                if record.consumer != consumer {
                    record.consumer = consumer.to_string();
                }
                record.delivery_count += 1;
                record.last_delivered_ms = now_ms;
                true
            }
            _ => false,
        }
    }

    /// Records with `id >= start` in ID order
    pub fn scan_from(&self, start: EntryId) -> impl Iterator<Item = &PendingEntry> {
        self.records.range(start..).map(|(_, r)| r)
    }

    /// IDs pending for `consumer` with `id > after`, at most `limit`
    pub fn for_consumer(&self, consumer: &str, after: EntryId, limit: Option<usize>) -> Vec<EntryId> {
        let start = match after.successor() {
            Some(start) => start,
            None => return Vec::new(),
        };
        self.records
            .range(start..)
            .filter(|(_, r)| r.consumer == consumer)
            .map(|(id, _)| *id)
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }

    /// Drop every record whose ID is below `boundary`. Returns the dropped IDs.
    pub fn drop_before(&mut self, boundary: EntryId) -> Vec<EntryId> {
        let kept = self.records.split_off(&boundary);
        let dropped = std::mem::replace(&mut self.records, kept);
        dropped.into_keys().collect()
    }

    /// Reassign all of `from`'s records to `to`. Returns the number moved.
    pub fn transfer(&mut self, from: &str, to: &str) -> usize {
        let mut moved = 0;
        for record in self.records.values_mut() {
            if record.consumer == from {
                record.consumer = to.to_string();
                moved += 1;
            }
        }
        moved
    }

    /// Remove all of `consumer`'s records. Returns the number removed.
    pub fn remove_consumer(&mut self, consumer: &str) -> usize {
        let before = self.records.len();
        self.records.retain(|_, r| r.consumer != consumer);
        before - self.records.len()
    }

    pub fn count_for(&self, consumer: &str) -> u64 {
        self.records
            .values()
            .filter(|r| r.consumer == consumer)
            .count() as u64
    }

    pub fn summary(&self) -> PendingSummary {
        let mut per_consumer: HashMap<&str, u64> = HashMap::new();
        for record in self.records.values() {
            *per_consumer.entry(record.consumer.as_str()).or_default() += 1;
        }
        let mut consumers: Vec<(String, u64)> = per_consumer
            .into_iter()
            .map(|(name, count)| (name.to_string(), count))
            .collect();
        consumers.sort();

        PendingSummary {
            count: self.records.len() as u64,
            lowest: self.records.keys().next().copied(),
            highest: self.records.keys().next_back().copied(),
            consumers,
        }
    }
}
