use crate::error::{Result, StrataError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Composite entry identifier: wall-clock milliseconds plus a sequence number.
///
/// Ordering is lexicographic (timestamp first, then sequence), which the
/// derived `Ord` gives us from the field order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct EntryId {
    /// Milliseconds since the Unix epoch
    pub ms: u64,
    /// Sequence number within the millisecond
    pub seq: u64,
}

impl EntryId {
    /// The smallest possible ID (`0-0`); never assigned to an entry.
    pub const MIN: EntryId = EntryId { ms: 0, seq: 0 };

    /// The largest possible ID.
    pub const MAX: EntryId = EntryId {
        ms: u64::MAX,
        seq: u64::MAX,
    };

    pub const fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }

    /// The smallest ID strictly greater than this one, or `None` at `MAX`.
    pub fn successor(self) -> Option<Self> {
        if self.seq < u64::MAX {
            Some(Self::new(self.ms, self.seq + 1))
        } else if self.ms < u64::MAX {
            Some(Self::new(self.ms + 1, 0))
        } else {
            None
        }
    }

    /// The largest ID strictly smaller than this one, or `None` at `MIN`.
    pub fn predecessor(self) -> Option<Self> {
        if self.seq > 0 {
            Some(Self::new(self.ms, self.seq - 1))
        } else if self.ms > 0 {
            Some(Self::new(self.ms - 1, u64::MAX))
        } else {
            None
        }
    }

    pub fn is_min(&self) -> bool {
        *self == Self::MIN
    }

    /// Parse the start bound of a range: `-` is the beginning, a bare
    /// timestamp means sequence 0.
    pub fn parse_range_start(s: &str) -> Result<Self> {
        match s {
            "-" => Ok(Self::MIN),
            "+" => Ok(Self::MAX),
            _ => Self::parse_with_default_seq(s, 0),
        }
    }

    /// Parse the end bound of a range: `+` is the end, a bare timestamp
    /// covers every sequence in that millisecond.
    pub fn parse_range_end(s: &str) -> Result<Self> {
        match s {
            "-" => Ok(Self::MIN),
            "+" => Ok(Self::MAX),
            _ => Self::parse_with_default_seq(s, u64::MAX),
        }
    }

    fn parse_with_default_seq(s: &str, default_seq: u64) -> Result<Self> {
        let invalid = || StrataError::InvalidId(s.to_string());
        match s.split_once('-') {
            Some((ms, seq)) => {
                let ms = ms.parse().map_err(|_| invalid())?;
                let seq = seq.parse().map_err(|_| invalid())?;
                Ok(Self::new(ms, seq))
            }
            None => {
                let ms = s.parse().map_err(|_| invalid())?;
                Ok(Self::new(ms, default_seq))
            }
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for EntryId {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_with_default_seq(s, 0)
    }
}

/// Where a consumer group's cursor starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupStart {
    /// `$`: only entries appended after the group is created
    Latest,
    /// Replay everything after this ID (`0` replays the whole log)
    After(EntryId),
}

impl GroupStart {
    pub const BEGINNING: GroupStart = GroupStart::After(EntryId::MIN);
}

impl FromStr for GroupStart {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "$" {
            Ok(Self::Latest)
        } else {
            Ok(Self::After(s.parse()?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_is_timestamp_then_sequence() {
        assert!(EntryId::new(1, 5) < EntryId::new(2, 0));
        assert!(EntryId::new(2, 0) < EntryId::new(2, 1));
        assert!(EntryId::MIN < EntryId::new(0, 1));
    }

    #[test]
    fn test_parse_and_display() {
        let id: EntryId = "1700000000000-3".parse().unwrap();
        assert_eq!(id, EntryId::new(1_700_000_000_000, 3));
        assert_eq!(id.to_string(), "1700000000000-3");

        let bare: EntryId = "42".parse().unwrap();
        assert_eq!(bare, EntryId::new(42, 0));

        assert!("abc".parse::<EntryId>().is_err());
        assert!("1-x".parse::<EntryId>().is_err());
    }

    #[test]
    fn test_range_bounds() {
        assert_eq!(EntryId::parse_range_start("-").unwrap(), EntryId::MIN);
        assert_eq!(EntryId::parse_range_end("+").unwrap(), EntryId::MAX);
        assert_eq!(
            EntryId::parse_range_end("10").unwrap(),
            EntryId::new(10, u64::MAX)
        );
        assert_eq!(EntryId::parse_range_start("10").unwrap(), EntryId::new(10, 0));
    }

    #[test]
    fn test_successor_rolls_over_sequence() {
        assert_eq!(
            EntryId::new(1, u64::MAX).successor(),
            Some(EntryId::new(2, 0))
        );
        assert_eq!(EntryId::MAX.successor(), None);
        assert_eq!(EntryId::new(2, 0).predecessor(), Some(EntryId::new(1, u64::MAX)));
        assert_eq!(EntryId::MIN.predecessor(), None);
    }

    #[test]
    fn test_group_start() {
        assert_eq!("$".parse::<GroupStart>().unwrap(), GroupStart::Latest);
        assert_eq!("0".parse::<GroupStart>().unwrap(), GroupStart::BEGINNING);
        assert_eq!(
            "5-1".parse::<GroupStart>().unwrap(),
            GroupStart::After(EntryId::new(5, 1))
        );
    }
}
