//! Entry ID assignment

use strata_core::{EntryId, Result, StrataError};

/// Produces strictly increasing IDs for one log.
///
/// Proposing an ID does not consume it; the log calls [`IdGenerator::advance`]
/// once the store accepted the entry, so a failed append leaves no gap in
/// the generator's view.
#[derive(Debug, Clone, Copy)]
pub struct IdGenerator {
    last: EntryId,
}

impl IdGenerator {
    /// Resume after `last`, the highest ID ever assigned to the log
    pub fn new(last: EntryId) -> Self {
        Self { last }
    }

    pub fn last(&self) -> EntryId {
        self.last
    }

    /// The next automatic ID for wall-clock time `now_ms`.
    ///
    /// If the clock went backward (or did not move) the previous timestamp
    /// is kept and the sequence incremented.
    pub fn propose(&self, now_ms: u64) -> Result<EntryId> {
        if now_ms > self.last.ms {
            return Ok(EntryId::new(now_ms, 0));
        }
        self.last
            .successor()
            .ok_or(StrataError::IdSpaceExhausted(self.last))
    }

    /// Check a caller-supplied ID
    pub fn check_explicit(&self, id: EntryId) -> Result<EntryId> {
        if id <= self.last {
            return Err(StrataError::NonMonotonicId {
                id,
                last: self.last,
            });
        }
        Ok(id)
    }

    pub fn advance(&mut self, id: EntryId) {
        debug_assert!(id > self.last);
        self.last = id;
    }
}
