//! Storage contract for log backends
//!
//! The engine owns ID assignment, grouping and delivery. A backend only has to
//! keep entries in ID order and a handful of metadata blobs per log.

use crate::error::Result;
use crate::types::{Entry, EntryId};
use std::sync::Arc;

/// Ordered, append-only entry storage for a single log.
///
/// Appends are already linearized by the engine, so implementations may
/// assume `entry.id` is greater than every ID they have seen before.
pub trait EntryStore: Send + Sync {
    /// Append an entry whose ID was assigned by the caller
    fn append(&self, entry: &Entry) -> Result<()>;

    /// Entries with `start <= id <= end` in ascending order, at most `limit`
    fn range(&self, start: EntryId, end: EntryId, limit: Option<usize>) -> Result<Vec<Entry>>;

    /// Entries with `id > after` in ascending order, at most `limit`
    fn read_after(&self, after: EntryId, limit: Option<usize>) -> Result<Vec<Entry>> {
        match after.successor() {
            Some(start) => self.range(start, EntryId::MAX, limit),
            None => Ok(Vec::new()),
        }
    }

    /// Number of entries with `start <= id <= end`
    fn count_range(&self, start: EntryId, end: EntryId) -> Result<u64> {
        Ok(self.range(start, end, None)?.len() as u64)
    }

    /// Point lookup
    fn get(&self, id: EntryId) -> Result<Option<Entry>>;

    /// Number of retained entries
    fn len(&self) -> Result<u64>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Oldest retained entry ID
    fn first_id(&self) -> Result<Option<EntryId>>;

    /// Newest retained entry ID
    fn last_retained_id(&self) -> Result<Option<EntryId>>;

    /// Highest ID ever appended, including trimmed entries.
    ///
    /// This is what keeps IDs monotonic across trims and restarts.
    fn last_assigned_id(&self) -> Result<EntryId>;

    /// The ID of the `n`-th retained entry counting from the oldest (0-based)
    fn nth_id(&self, n: u64) -> Result<Option<EntryId>>;

    /// Remove every entry with `id < boundary`. Returns the number removed.
    fn remove_before(&self, boundary: EntryId) -> Result<u64>;

    /// Read a metadata blob
    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a metadata blob
    fn put_meta(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Flush buffered writes to durable storage
    fn sync(&self) -> Result<()>;
}

/// A collection of named logs.
pub trait Backend: Send + Sync {
    /// Open a log, creating it when `create` is set.
    ///
    /// Returns `None` when the log does not exist and `create` is false.
    fn open_log(&self, name: &str, create: bool) -> Result<Option<Arc<dyn EntryStore>>>;

    /// Names of every log known to the backend
    fn list_logs(&self) -> Result<Vec<String>>;

    /// Flush every open log
    fn sync_all(&self) -> Result<()>;

    /// Short backend identifier for status output
    fn kind(&self) -> &'static str;
}
