//! Subcommand implementations

pub mod group;
pub mod log;
pub mod pending;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use strata_core::{EngineConfig, Entry, EntryId};
use strata_file_log::{FileBackend, FileLogConfig};
use strata_stream::StreamEngine;

/// Open the engine over the file backend in `data_dir`
pub fn open_engine(data_dir: &Path, config_path: Option<&Path>) -> Result<StreamEngine> {
    let config = match config_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            toml::from_str::<EngineConfig>(&raw)
                .with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    tracing::debug!("Opening data directory: {}", data_dir.display());
    let backend = FileBackend::open(FileLogConfig::new(data_dir))
        .context("Failed to open data directory")?;
    StreamEngine::open(Arc::new(backend), config).context("Failed to open engine")
}

pub(crate) fn parse_id(s: &str) -> Result<EntryId> {
    s.parse().with_context(|| format!("Invalid entry ID '{}'", s))
}

pub(crate) fn parse_ids(ids: &[String]) -> Result<Vec<EntryId>> {
    ids.iter().map(|id| parse_id(id)).collect()
}

pub(crate) fn print_entry(entry: &Entry) {
    let fields: Vec<String> = entry
        .fields
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();
    println!("{}  {}", entry.id, fields.join(" "));
}

pub(crate) fn print_entries(entries: &[Entry]) {
    for entry in entries {
        print_entry(entry);
    }
    if entries.is_empty() {
        println!("(no entries)");
    }
}
