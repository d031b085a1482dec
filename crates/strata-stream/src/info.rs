//! Read-only views of logs, groups and consumers

use crate::consumer_group::{Consumer, ConsumerGroup};
use crate::pending::PendingEntry;
use crate::retention::RetentionRule;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use strata_core::EntryId;

pub(crate) fn timestamp(ms: u64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms as i64)
        .single()
        .unwrap_or_default()
}

/// Summary of a log
#[derive(Debug, Clone, Serialize)]
pub struct LogInfo {
    pub name: String,
    /// Number of retained entries
    pub length: u64,
    pub first_id: Option<EntryId>,
    pub last_id: Option<EntryId>,
    /// Highest ID ever assigned, including trimmed entries
    pub last_assigned: EntryId,
    pub groups: usize,
    pub retention: Option<RetentionRule>,
}

/// Summary of a consumer group
#[derive(Debug, Clone, Serialize)]
pub struct GroupInfo {
    pub name: String,
    pub last_delivered: EntryId,
    pub entries_read: u64,
    pub consumers: usize,
    pub pending: u64,
    /// Retained entries not yet delivered to the group
    pub lag: u64,
    pub created_at: DateTime<Utc>,
}

impl GroupInfo {
    pub(crate) fn new(group: &ConsumerGroup, lag: u64) -> Self {
        Self {
            name: group.name.clone(),
            last_delivered: group.last_delivered,
            entries_read: group.entries_read,
            consumers: group.consumers.len(),
            pending: group.pending.len() as u64,
            lag,
            created_at: timestamp(group.created_ms),
        }
    }
}

/// Summary of a consumer within a group
#[derive(Debug, Clone, Serialize)]
pub struct ConsumerInfo {
    pub name: String,
    pub pending: u64,
    /// Milliseconds since the consumer was last seen
    pub idle_ms: u64,
    pub created_at: DateTime<Utc>,
    pub seen_at: DateTime<Utc>,
}

impl ConsumerInfo {
    pub(crate) fn new(group: &ConsumerGroup, consumer: &Consumer, now_ms: u64) -> Self {
        Self {
            name: consumer.name.clone(),
            pending: group.pending.count_for(&consumer.name),
            idle_ms: now_ms.saturating_sub(consumer.seen_ms),
            created_at: timestamp(consumer.created_ms),
            seen_at: timestamp(consumer.seen_ms),
        }
    }
}

/// Filter for detailed pending listings
#[derive(Debug, Clone)]
pub struct PendingQuery {
    pub start: EntryId,
    pub end: EntryId,
    /// Maximum records returned; zero means no limit
    pub count: usize,
    pub consumer: Option<String>,
    pub min_idle_ms: u64,
}

impl Default for PendingQuery {
    fn default() -> Self {
        Self {
            start: EntryId::MIN,
            end: EntryId::MAX,
            count: 0,
            consumer: None,
            min_idle_ms: 0,
        }
    }
}

impl PendingQuery {
    pub fn with_range(mut self, start: EntryId, end: EntryId) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn with_consumer(mut self, consumer: impl Into<String>) -> Self {
        self.consumer = Some(consumer.into());
        self
    }

    pub fn with_min_idle(mut self, min_idle_ms: u64) -> Self {
        self.min_idle_ms = min_idle_ms;
        self
    }

    pub(crate) fn matches(&self, record: &PendingEntry, now_ms: u64) -> bool {
        record.id >= self.start
            && record.id <= self.end
            && record.idle_ms(now_ms) >= self.min_idle_ms
            && self
                .consumer
                .as_deref()
                .map_or(true, |consumer| record.consumer == consumer)
    }
}

/// One pending record as reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingDetail {
    pub id: EntryId,
    pub consumer: String,
    pub idle_ms: u64,
    pub delivery_count: u64,
    pub first_delivered_at: DateTime<Utc>,
    pub last_delivered_at: DateTime<Utc>,
}

impl PendingDetail {
    pub(crate) fn new(record: &PendingEntry, now_ms: u64) -> Self {
        Self {
            id: record.id,
            consumer: record.consumer.clone(),
            idle_ms: record.idle_ms(now_ms),
            delivery_count: record.delivery_count,
            first_delivered_at: timestamp(record.first_delivered_ms),
            last_delivered_at: timestamp(record.last_delivered_ms),
        }
    }
}
