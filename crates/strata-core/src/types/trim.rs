use crate::types::id::EntryId;
use serde::{Deserialize, Serialize};

/// Which entries a trim keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrimPolicy {
    /// Keep at most this many of the newest entries
    MaxLength(u64),

    /// Keep entries with `id >= MinId`
    MinId(EntryId),
}

/// How precisely a trim honours its policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrimMode {
    /// Remove exactly the entries the policy drops
    #[default]
    Exact,

    /// Remove only whole chunks of `trim_slack` entries; may keep a few extra
    Approximate,
}
