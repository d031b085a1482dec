//! Log commands: append, range, listing, info and trimming

use super::{parse_id, print_entries};
use anyhow::{bail, Context, Result};
use strata_core::{EntryId, Fields, TrimMode, TrimPolicy};
use strata_stream::StreamEngine;

fn parse_fields(pairs: &[String]) -> Result<Fields> {
    let pairs = pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => Ok((key.to_string(), value.to_string())),
            None => bail!("Expected key=value, got '{}'", pair),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Fields::new(pairs)?)
}

pub fn append(engine: &StreamEngine, log: &str, pairs: &[String], id: Option<&str>) -> Result<()> {
    let fields = parse_fields(pairs)?;
    let id = match id {
        Some(id) => engine
            .append_with_id(log, parse_id(id)?, fields)
            .context("Append failed")?,
        None => engine.append(log, fields).context("Append failed")?,
    };
    println!("{}", id);
    Ok(())
}

pub fn range(
    engine: &StreamEngine,
    log: &str,
    start: &str,
    end: &str,
    count: Option<usize>,
) -> Result<()> {
    let start = EntryId::parse_range_start(start)?;
    let end = EntryId::parse_range_end(end)?;
    let entries = engine
        .range(log, start, end, count)
        .with_context(|| format!("Failed to read log '{}'", log))?;
    print_entries(&entries);
    Ok(())
}

pub fn list(engine: &StreamEngine) -> Result<()> {
    let logs = engine.list_logs().context("Failed to list logs")?;
    if logs.is_empty() {
        println!("No logs");
    }
    for log in logs {
        println!("{}", log);
    }
    Ok(())
}

pub fn info(engine: &StreamEngine, log: &str) -> Result<()> {
    let info = engine
        .log_info(log)
        .with_context(|| format!("Failed to inspect log '{}'", log))?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

pub fn trim(
    engine: &StreamEngine,
    log: &str,
    max_len: Option<u64>,
    min_id: Option<&str>,
    approx: bool,
) -> Result<()> {
    let policy = match (max_len, min_id) {
        (Some(len), _) => TrimPolicy::MaxLength(len),
        (None, Some(id)) => TrimPolicy::MinId(parse_id(id)?),
        (None, None) => bail!("Either --max-len or --min-id is required"),
    };
    let mode = if approx {
        TrimMode::Approximate
    } else {
        TrimMode::Exact
    };

    let stats = engine.trim(log, policy, mode).context("Trim failed")?;
    println!(
        "✓ Removed {} entries, {} remaining",
        stats.removed, stats.remaining
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fields_keeps_order() {
        let fields = parse_fields(&["event=signup".to_string(), "userId=101".to_string()]).unwrap();
        let keys: Vec<&str> = fields.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["event", "userId"]);
    }

    #[test]
    fn test_parse_fields_rejects_bare_words() {
        assert!(parse_fields(&["event".to_string()]).is_err());
        assert!(parse_fields(&["a=1".to_string(), "a=2".to_string()]).is_err());
    }

    #[test]
    fn test_value_may_contain_equals() {
        let fields = parse_fields(&["expr=a=b".to_string()]).unwrap();
        assert_eq!(fields.get("expr").and_then(|v| v.as_str()), Some("a=b"));
    }
}
