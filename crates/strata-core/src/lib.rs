//! Strata Core: Traits and types for the strata event log
//!
//! This crate defines the pieces shared by every strata crate:
//! - Composite entry IDs and immutable entries
//! - The storage contract a log backend implements
//! - The append hook used for live fan-out to external transports
//! - Clock abstraction for ID generation and idle accounting
//! - Engine configuration and optional metrics hooks

pub mod clock;
pub mod config;
pub mod error;
pub mod observe;
pub mod traits;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, RetentionConfig};
pub use error::{Result, StrataError};
pub use traits::{AppendHook, Backend, EntryStore};
pub use types::{Entry, EntryId, FieldValue, Fields, GroupStart, TrimMode, TrimPolicy};
