use crate::types::EntryId;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrataError {
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    #[error("Entry ID {id} is not greater than the current maximum {last}")]
    NonMonotonicId { id: EntryId, last: EntryId },

    #[error("Invalid entry ID: {0}")]
    InvalidId(String),

    #[error("Entry ID space exhausted after {0}")]
    IdSpaceExhausted(EntryId),

    #[error("Unknown log: {0}")]
    UnknownLog(String),

    #[error("Unknown group '{group}' on log '{log}'")]
    UnknownGroup { log: String, group: String },

    #[error("Unknown consumer '{consumer}' in group '{group}'")]
    UnknownConsumer { group: String, consumer: String },

    #[error("Group '{group}' already exists on log '{log}'")]
    GroupExists { log: String, group: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt log data: {0}")]
    Corrupt(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Engine is closed")]
    Closed,

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl StrataError {
    pub fn unknown_group(log: &str, group: &str) -> Self {
        Self::UnknownGroup {
            log: log.to_string(),
            group: group.to_string(),
        }
    }

    /// True for failures caused by the caller's input rather than the engine.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidEntry(_)
                | Self::NonMonotonicId { .. }
                | Self::InvalidId(_)
                | Self::UnknownLog(_)
                | Self::UnknownGroup { .. }
                | Self::UnknownConsumer { .. }
                | Self::GroupExists { .. }
        )
    }
}

impl From<serde_json::Error> for StrataError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StrataError>;
