//! Consumer group commands

use super::{parse_ids, print_entries};
use anyhow::{Context, Result};
use std::time::Duration;
use strata_core::GroupStart;
use strata_stream::{BlockingRead, ConsumerRemoval, ReadFrom, StreamEngine};
use tokio_util::sync::CancellationToken;

pub fn create(engine: &StreamEngine, log: &str, group: &str, start: &str) -> Result<()> {
    let start: GroupStart = start
        .parse()
        .with_context(|| format!("Invalid group start '{}'", start))?;
    engine
        .create_group(log, group, start)
        .context("Failed to create group")?;
    println!("✓ Created group '{}' on '{}'", group, log);
    Ok(())
}

pub fn delete(engine: &StreamEngine, log: &str, group: &str) -> Result<()> {
    if engine
        .delete_group(log, group)
        .context("Failed to delete group")?
    {
        println!("✓ Deleted group '{}'", group);
    } else {
        println!("No group '{}' on '{}'", group, log);
    }
    Ok(())
}

pub fn list(engine: &StreamEngine, log: &str) -> Result<()> {
    let groups = engine
        .list_groups(log)
        .with_context(|| format!("Failed to list groups of '{}'", log))?;
    println!("{}", serde_json::to_string_pretty(&groups)?);
    Ok(())
}

pub fn consumers(engine: &StreamEngine, log: &str, group: &str) -> Result<()> {
    let consumers = engine
        .list_consumers(log, group)
        .context("Failed to list consumers")?;
    println!("{}", serde_json::to_string_pretty(&consumers)?);
    Ok(())
}

pub async fn read(
    engine: &StreamEngine,
    log: &str,
    group: &str,
    consumer: &str,
    from: &str,
    count: usize,
    block: Option<u64>,
) -> Result<()> {
    let from = ReadFrom::parse(from)?;

    let entries = match block {
        Some(ms) if !from.is_history() => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_signal.cancel();
                }
            });

            let outcome = engine
                .read_group_blocking(
                    log,
                    group,
                    consumer,
                    count,
                    Duration::from_millis(ms),
                    &cancel,
                )
                .await
                .context("Blocking read failed")?;
            match outcome {
                BlockingRead::Delivered(entries) => entries,
                BlockingRead::TimedOut => {
                    println!("Timed out");
                    return Ok(());
                }
                BlockingRead::Cancelled => {
                    println!("Cancelled");
                    return Ok(());
                }
            }
        }
        _ => engine
            .read_group(log, group, consumer, from, count)
            .context("Group read failed")?,
    };

    print_entries(&entries);
    Ok(())
}

pub fn ack(engine: &StreamEngine, log: &str, group: &str, ids: &[String]) -> Result<()> {
    let ids = parse_ids(ids)?;
    let acked = engine.ack_many(log, group, &ids).context("Ack failed")?;
    println!("✓ Acknowledged {} of {}", acked, ids.len());
    Ok(())
}

pub fn remove_consumer(
    engine: &StreamEngine,
    log: &str,
    group: &str,
    consumer: &str,
    transfer_to: Option<String>,
) -> Result<()> {
    let removal = match transfer_to {
        Some(target) => ConsumerRemoval::TransferTo(target),
        None => ConsumerRemoval::Discard,
    };
    let affected = engine
        .delete_consumer(log, group, consumer, removal.clone())
        .context("Failed to remove consumer")?;
    match removal {
        ConsumerRemoval::TransferTo(target) => {
            println!("✓ Removed '{}', {} pending moved to '{}'", consumer, affected, target)
        }
        ConsumerRemoval::Discard => {
            println!("✓ Removed '{}', {} pending discarded", consumer, affected)
        }
    }
    Ok(())
}
