pub mod entry;
pub mod id;
pub mod trim;

pub use entry::{Entry, FieldValue, Fields};
pub use id::{EntryId, GroupStart};
pub use trim::{TrimMode, TrimPolicy};
