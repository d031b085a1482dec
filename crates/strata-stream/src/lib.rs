//! # Strata Stream
//!
//! Durable, replayable append-only logs with consumer-group delivery.
//!
//! The engine provides:
//! - Strictly increasing composite entry IDs, even when the clock goes backward
//! - Consumer groups with a shared cursor and per-group pending entry lists
//! - At-least-once delivery with acknowledgment, claiming and auto-claiming
//! - Blocking group reads with timeouts and cancellation
//! - Exact and approximate trimming, with optional standing retention rules
//! - Best-effort live fan-out to transient subscribers and append hooks
//!
//! ## Example
//!
//! ```rust,no_run
//! use strata_core::{Fields, GroupStart};
//! use strata_stream::{ReadFrom, StreamEngine};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = StreamEngine::in_memory()?;
//!
//! engine.append("signups", Fields::new([("event", "signup"), ("userId", "101")])?)?;
//! engine.create_group("signups", "mailer", GroupStart::BEGINNING)?;
//!
//! for entry in engine.read_group("signups", "mailer", "worker-1", ReadFrom::New, 10)? {
//!     println!("{} {:?}", entry.id, entry.text("event"));
//!     engine.ack("signups", "mailer", entry.id)?;
//! }
//!
//! let info = engine.group_info("signups", "mailer")?;
//! println!("pending: {}, lag: {}", info.pending, info.lag);
//! # Ok(())
//! # }
//! ```

pub mod consumer_group;
pub mod engine;
pub mod fanout;
pub mod id_gen;
pub mod info;
mod log;
pub mod memory;
pub mod pending;
pub mod retention;
pub mod scheduler;

pub use consumer_group::{Consumer, ConsumerGroup, ConsumerRemoval};
pub use engine::{StreamEngine, StreamEngineBuilder};
pub use fanout::LiveSubscription;
pub use id_gen::IdGenerator;
pub use info::{ConsumerInfo, GroupInfo, LogInfo, PendingDetail, PendingQuery};
pub use memory::{MemoryBackend, MemoryEntryStore};
pub use pending::{PendingEntry, PendingList, PendingSummary};
pub use retention::{RetentionManager, RetentionRule, TrimStats};
pub use scheduler::{AutoClaim, BlockingRead, ReadFrom};
