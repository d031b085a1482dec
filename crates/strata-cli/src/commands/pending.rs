//! Pending list inspection and claiming

use super::{parse_id, parse_ids, print_entries};
use anyhow::{Context, Result};
use strata_stream::{PendingQuery, StreamEngine};

pub fn summary(engine: &StreamEngine, log: &str, group: &str) -> Result<()> {
    let summary = engine
        .pending_summary(log, group)
        .context("Failed to read pending list")?;

    println!("\nPending for '{}' on '{}'", group, log);
    println!("{}", "=".repeat(60));
    println!("Count: {}", summary.count);
    if let (Some(lowest), Some(highest)) = (summary.lowest, summary.highest) {
        println!("Range: {} .. {}", lowest, highest);
    }
    for (consumer, count) in &summary.consumers {
        println!("  {}: {}", consumer, count);
    }
    Ok(())
}

pub fn detail(
    engine: &StreamEngine,
    log: &str,
    group: &str,
    consumer: Option<String>,
    min_idle: Option<u64>,
    count: usize,
) -> Result<()> {
    let mut query = PendingQuery::default().with_count(count);
    if let Some(consumer) = consumer {
        query = query.with_consumer(consumer);
    }
    if let Some(min_idle) = min_idle {
        query = query.with_min_idle(min_idle);
    }

    let records = engine
        .pending_entries(log, group, &query)
        .context("Failed to read pending list")?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

pub fn claim(
    engine: &StreamEngine,
    log: &str,
    group: &str,
    consumer: &str,
    min_idle: u64,
    ids: &[String],
) -> Result<()> {
    let ids = parse_ids(ids)?;
    let explicit = (!ids.is_empty()).then_some(ids.as_slice());
    let entries = engine
        .claim(log, group, consumer, min_idle, explicit)
        .context("Claim failed")?;
    print_entries(&entries);
    Ok(())
}

pub fn auto_claim(
    engine: &StreamEngine,
    log: &str,
    group: &str,
    consumer: &str,
    min_idle: u64,
    start: &str,
    count: usize,
) -> Result<()> {
    let start = parse_id(start)?;
    let result = engine
        .auto_claim(log, group, consumer, min_idle, start, count)
        .context("Claim failed")?;

    print_entries(&result.entries);
    if !result.dropped.is_empty() {
        println!("Dropped {} trimmed entries from the pending list", result.dropped.len());
    }
    if result.next.is_min() {
        println!("Scan complete");
    } else {
        println!("Next start: {}", result.next);
    }
    Ok(())
}
