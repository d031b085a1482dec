//! File-based log storage
//!
//! Provides a durable [`EntryStore`](strata_core::EntryStore) backed by
//! append-only segment files.
//!
//! Features:
//! - Sequential writes with optional flush per append
//! - Automatic segment rotation based on size
//! - In-memory ID index rebuilt on open, torn tail records cut off
//! - Trimming that deletes whole segments once they hold no live entries
//! - Highest assigned ID persisted so IDs stay monotonic after restarts

mod store;

pub use store::{FileBackend, FileEntryStore, FileLogConfig};
