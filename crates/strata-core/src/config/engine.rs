use crate::error::{Result, StrataError};
use crate::types::{TrimMode, TrimPolicy};
use serde::{Deserialize, Serialize};

/// Configuration for the stream engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum pending records examined by a claim without explicit IDs
    /// (default: 100)
    #[serde(default = "default_claim_page_size")]
    pub claim_page_size: usize,

    /// Chunk size for approximate trimming (default: 100)
    ///
    /// Approximate trims only remove whole chunks, so a log may hold up to
    /// `trim_slack - 1` entries more than its policy allows.
    #[serde(default = "default_trim_slack")]
    pub trim_slack: u64,

    /// Buffer size of each log's live fan-out channel (default: 1024)
    ///
    /// A live subscriber that falls further behind than this skips entries.
    #[serde(default = "default_live_capacity")]
    pub live_capacity: usize,

    /// Maximum number of fields in one entry (default: 1024)
    #[serde(default = "default_max_fields")]
    pub max_fields: usize,

    /// Maximum total key and value bytes in one entry (default: 1MB)
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: usize,

    /// Persist group state after every delivery, ack and claim (default: true)
    ///
    /// Group lifecycle changes are always persisted immediately. When
    /// disabled, delivery progress since the last `checkpoint()` or `close()`
    /// is lost if the process dies: those entries are delivered again.
    #[serde(default = "default_checkpoint_on_write")]
    pub checkpoint_on_write: bool,

    /// Background retention settings
    #[serde(default)]
    pub retention: RetentionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            claim_page_size: default_claim_page_size(),
            trim_slack: default_trim_slack(),
            live_capacity: default_live_capacity(),
            max_fields: default_max_fields(),
            max_entry_bytes: default_max_entry_bytes(),
            checkpoint_on_write: default_checkpoint_on_write(),
            retention: RetentionConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_claim_page_size(mut self, size: usize) -> Self {
        self.claim_page_size = size;
        self
    }

    pub fn with_trim_slack(mut self, slack: u64) -> Self {
        self.trim_slack = slack;
        self
    }

    pub fn with_live_capacity(mut self, capacity: usize) -> Self {
        self.live_capacity = capacity;
        self
    }

    pub fn with_checkpoint_on_write(mut self, enabled: bool) -> Self {
        self.checkpoint_on_write = enabled;
        self
    }

    pub fn with_retention(mut self, retention: RetentionConfig) -> Self {
        self.retention = retention;
        self
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.claim_page_size == 0 {
            return Err(StrataError::Config("claim_page_size must be positive".into()));
        }
        if self.trim_slack == 0 {
            return Err(StrataError::Config("trim_slack must be positive".into()));
        }
        if self.live_capacity == 0 {
            return Err(StrataError::Config("live_capacity must be positive".into()));
        }
        if self.max_fields == 0 {
            return Err(StrataError::Config("max_fields must be positive".into()));
        }
        Ok(())
    }
}

fn default_claim_page_size() -> usize {
    100
}

fn default_trim_slack() -> u64 {
    100
}

fn default_live_capacity() -> usize {
    1024
}

fn default_max_fields() -> usize {
    1024
}

fn default_max_entry_bytes() -> usize {
    1024 * 1024
}

fn default_checkpoint_on_write() -> bool {
    true
}

/// Settings for the background retention task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Interval between enforcement passes in milliseconds (default: 60000)
    #[serde(default = "default_retention_interval")]
    pub interval_ms: u64,

    /// Policy applied to logs without their own policy (default: none)
    #[serde(default)]
    pub default_policy: Option<TrimPolicy>,

    /// Trim mode used by background passes (default: approximate)
    #[serde(default = "default_retention_mode")]
    pub mode: TrimMode,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_retention_interval(),
            default_policy: None,
            mode: default_retention_mode(),
        }
    }
}

fn default_retention_interval() -> u64 {
    60_000
}

fn default_retention_mode() -> TrimMode {
    TrimMode::Approximate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.claim_page_size, 100);
        assert_eq!(config.trim_slack, 100);
        assert!(config.checkpoint_on_write);
        assert_eq!(config.retention.mode, TrimMode::Approximate);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            claim_page_size = 10

            [retention]
            interval_ms = 500
            default_policy = { MaxLength = 1000 }
            "#,
        )
        .unwrap();

        assert_eq!(config.claim_page_size, 10);
        assert_eq!(config.trim_slack, 100);
        assert!(config.checkpoint_on_write);
        assert_eq!(config.retention.interval_ms, 500);
        assert_eq!(
            config.retention.default_policy,
            Some(TrimPolicy::MaxLength(1000))
        );
    }

    #[test]
    fn test_validate_rejects_zero_slack() {
        let config = EngineConfig::default().with_trim_slack(0);
        assert!(matches!(config.validate(), Err(StrataError::Config(_))));
    }
}
