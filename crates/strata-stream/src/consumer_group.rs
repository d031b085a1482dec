//! Consumer groups and their members
//!
//! A group owns a cursor (`last_delivered`) over one log, a set of named
//! consumers, and a pending list. The whole registry is serializable so it can
//! be checkpointed into the log's metadata.

use crate::pending::PendingList;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strata_core::{EntryId, Result, StrataError};

/// A member of a consumer group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consumer {
    pub name: String,
    pub created_ms: u64,
    /// Last time the consumer read, claimed or was ensured
    pub seen_ms: u64,
}

/// What happens to a consumer's pending records when it is removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerRemoval {
    /// Hand the records to another consumer (created if absent)
    TransferTo(String),
    /// Drop the records; their entries will not be redelivered by this group
    Discard,
}

/// A named cursor over a log with load-shared delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerGroup {
    pub name: String,
    /// Highest entry handed out from the cursor
    pub last_delivered: EntryId,
    pub created_ms: u64,
    /// Entries delivered from the cursor over the group's lifetime
    #[serde(default)]
    pub entries_read: u64,
    pub consumers: BTreeMap<String, Consumer>,
    pub pending: PendingList,
}

impl ConsumerGroup {
    pub fn new(name: impl Into<String>, last_delivered: EntryId, now_ms: u64) -> Self {
        Self {
            name: name.into(),
            last_delivered,
            created_ms: now_ms,
            entries_read: 0,
            consumers: BTreeMap::new(),
            pending: PendingList::new(),
        }
    }

    /// Get or create a consumer and mark it as seen
    pub fn touch_consumer(&mut self, name: &str, now_ms: u64) -> &Consumer {
        let consumer = self
            .consumers
            .entry(name.to_string())
            .or_insert_with(|| Consumer {
                name: name.to_string(),
                created_ms: now_ms,
                seen_ms: now_ms,
            });
        consumer.seen_ms = now_ms;
        consumer
    }

    /// Advance the cursor after a delivery from it
    pub fn advance_cursor(&mut self, id: EntryId) {
        if id > self.last_delivered {
            self.last_delivered = id;
        }
        self.entries_read += 1;
    }

    /// Remove a consumer. Returns the number of pending records transferred
    /// or dropped.
    pub fn remove_consumer(
        &mut self,
        name: &str,
        removal: &ConsumerRemoval,
        now_ms: u64,
    ) -> Result<usize> {
        if matches!(removal, ConsumerRemoval::TransferTo(target) if target == name) {
            return Err(StrataError::InvalidEntry(format!(
                "cannot transfer pending records of '{}' to itself",
                name
            )));
        }
        if self.consumers.remove(name).is_none() {
            return Err(StrataError::UnknownConsumer {
                group: self.name.clone(),
                consumer: name.to_string(),
            });
        }

        let affected = match removal {
            ConsumerRemoval::TransferTo(target) => {
                self.touch_consumer(target, now_ms);
                self.pending.transfer(name, target)
            }
            ConsumerRemoval::Discard => self.pending.remove_consumer(name),
        };
        Ok(affected)
    }
}

/// All groups attached to one log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupRegistry {
    groups: BTreeMap<String, ConsumerGroup>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn create(&mut self, log: &str, group: ConsumerGroup) -> Result<()> {
        if self.groups.contains_key(&group.name) {
            return Err(StrataError::GroupExists {
                log: log.to_string(),
                group: group.name,
            });
        }
        self.groups.insert(group.name.clone(), group);
        Ok(())
    }

    pub fn delete(&mut self, name: &str) -> bool {
        self.groups.remove(name).is_some()
    }

    pub fn get(&self, log: &str, name: &str) -> Result<&ConsumerGroup> {
        self.groups
            .get(name)
            .ok_or_else(|| StrataError::unknown_group(log, name))
    }

    pub fn get_mut(&mut self, log: &str, name: &str) -> Result<&mut ConsumerGroup> {
        self.groups
            .get_mut(name)
            .ok_or_else(|| StrataError::unknown_group(log, name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConsumerGroup> {
        self.groups.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ConsumerGroup> {
        self.groups.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(ms: u64) -> EntryId {
        EntryId::new(ms, 0)
    }

    #[test]
    fn test_touch_creates_once() {
        let mut group = ConsumerGroup::new("g", EntryId::MIN, 1);
        group.touch_consumer("c1", 10);
        let consumer = group.touch_consumer("c1", 20);

        assert_eq!(consumer.created_ms, 10);
        assert_eq!(consumer.seen_ms, 20);
        assert_eq!(group.consumers.len(), 1);
    }

    #[test]
    fn test_remove_consumer_transfer() {
        let mut group = ConsumerGroup::new("g", EntryId::MIN, 0);
        group.touch_consumer("a", 0);
        group.pending.record_delivery(id(1), "a", 0);
        group.pending.record_delivery(id(2), "a", 0);

        let moved = group
            .remove_consumer("a", &ConsumerRemoval::TransferTo("b".into()), 5)
            .unwrap();
        assert_eq!(moved, 2);
        assert!(group.consumers.contains_key("b"));
        assert!(!group.consumers.contains_key("a"));
        assert_eq!(group.pending.count_for("b"), 2);
    }

    #[test]
    fn test_remove_consumer_discard() {
        let mut group = ConsumerGroup::new("g", EntryId::MIN, 0);
        group.touch_consumer("a", 0);
        group.pending.record_delivery(id(1), "a", 0);

        let dropped = group
            .remove_consumer("a", &ConsumerRemoval::Discard, 0)
            .unwrap();
        assert_eq!(dropped, 1);
        assert!(group.pending.is_empty());
    }

    #[test]
    fn test_remove_unknown_consumer() {
        let mut group = ConsumerGroup::new("g", EntryId::MIN, 0);
        let err = group
            .remove_consumer("ghost", &ConsumerRemoval::Discard, 0)
            .unwrap_err();
        assert!(matches!(err, StrataError::UnknownConsumer { .. }));
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = GroupRegistry::new();
        registry
            .create("log", ConsumerGroup::new("g", EntryId::MIN, 0))
            .unwrap();
        let err = registry
            .create("log", ConsumerGroup::new("g", EntryId::MIN, 0))
            .unwrap_err();
        assert!(matches!(err, StrataError::GroupExists { .. }));

        assert!(registry.delete("g"));
        assert!(!registry.delete("g"));
        assert!(matches!(
            registry.get("log", "g"),
            Err(StrataError::UnknownGroup { .. })
        ));
    }

    #[test]
    fn test_registry_round_trips_through_json() {
        let mut registry = GroupRegistry::new();
        let mut group = ConsumerGroup::new("g", id(3), 7);
        group.touch_consumer("c", 8);
        group.pending.record_delivery(id(2), "c", 8);
        registry.create("log", group).unwrap();

        let bytes = serde_json::to_vec(&registry).unwrap();
        let restored: GroupRegistry = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(restored, registry);
    }
}
