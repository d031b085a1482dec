//! Strata CLI - Command-line interface for strata event logs

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the data directory
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Engine configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append an entry built from key=value pairs
    Append {
        log: String,

        /// Fields as key=value
        #[arg(required = true)]
        fields: Vec<String>,

        /// Explicit ID instead of a generated one
        #[arg(long)]
        id: Option<String>,
    },

    /// Print entries between two IDs (`-` and `+` are the ends)
    Range {
        log: String,

        #[arg(default_value = "-")]
        start: String,

        #[arg(default_value = "+")]
        end: String,

        #[arg(short = 'n', long)]
        count: Option<usize>,
    },

    /// List logs in the data directory
    Logs,

    /// Show details of a log
    Info { log: String },

    /// Trim a log by length or minimum ID
    Trim {
        log: String,

        /// Keep at most this many entries
        #[arg(long, conflicts_with = "min_id", required_unless_present = "min_id")]
        max_len: Option<u64>,

        /// Keep entries with an ID at or above this one
        #[arg(long)]
        min_id: Option<String>,

        /// Only remove whole chunks of entries
        #[arg(long)]
        approx: bool,
    },

    /// Consumer group commands
    #[command(subcommand)]
    Group(GroupCommands),
}

#[derive(Subcommand)]
enum GroupCommands {
    /// Create a consumer group (`$` starts at the end of the log)
    Create {
        log: String,
        group: String,

        #[arg(default_value = "$")]
        start: String,
    },

    /// Delete a consumer group
    Delete { log: String, group: String },

    /// List groups of a log
    List { log: String },

    /// List consumers of a group
    Consumers { log: String, group: String },

    /// Read for a consumer (`>` for new entries, an ID for its pending ones)
    Read {
        log: String,
        group: String,
        consumer: String,

        #[arg(default_value = ">")]
        from: String,

        #[arg(short = 'n', long, default_value_t = 0)]
        count: usize,

        /// Wait up to this many milliseconds for new entries (0 waits forever)
        #[arg(long)]
        block: Option<u64>,
    },

    /// Acknowledge entries
    Ack {
        log: String,
        group: String,

        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Take over idle pending entries
    Claim {
        log: String,
        group: String,
        consumer: String,

        #[arg(long, default_value_t = 0)]
        min_idle: u64,

        /// Entries to claim; scans the oldest pending ones when empty
        ids: Vec<String>,
    },

    /// Resumable claim scan
    AutoClaim {
        log: String,
        group: String,
        consumer: String,

        #[arg(long, default_value_t = 0)]
        min_idle: u64,

        #[arg(long, default_value = "0-0")]
        start: String,

        #[arg(short = 'n', long, default_value_t = 100)]
        count: usize,
    },

    /// Show the pending list of a group
    Pending {
        log: String,
        group: String,

        /// List individual records instead of a summary
        #[arg(long)]
        detail: bool,

        #[arg(long)]
        consumer: Option<String>,

        #[arg(long)]
        min_idle: Option<u64>,

        #[arg(short = 'n', long, default_value_t = 100)]
        count: usize,
    },

    /// Remove a consumer, handing its pending entries to another one
    RemoveConsumer {
        log: String,
        group: String,
        consumer: String,

        /// Receiver of the pending entries; they are discarded when absent
        #[arg(long)]
        transfer_to: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let engine = commands::open_engine(&cli.data_dir, cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Append { log, fields, id } => {
            commands::log::append(&engine, &log, &fields, id.as_deref())
        }
        Commands::Range {
            log,
            start,
            end,
            count,
        } => commands::log::range(&engine, &log, &start, &end, count),
        Commands::Logs => commands::log::list(&engine),
        Commands::Info { log } => commands::log::info(&engine, &log),
        Commands::Trim {
            log,
            max_len,
            min_id,
            approx,
        } => commands::log::trim(&engine, &log, max_len, min_id.as_deref(), approx),
        Commands::Group(cmd) => match cmd {
            GroupCommands::Create { log, group, start } => {
                commands::group::create(&engine, &log, &group, &start)
            }
            GroupCommands::Delete { log, group } => commands::group::delete(&engine, &log, &group),
            GroupCommands::List { log } => commands::group::list(&engine, &log),
            GroupCommands::Consumers { log, group } => {
                commands::group::consumers(&engine, &log, &group)
            }
            GroupCommands::Read {
                log,
                group,
                consumer,
                from,
                count,
                block,
            } => {
                commands::group::read(&engine, &log, &group, &consumer, &from, count, block).await
            }
            GroupCommands::Ack { log, group, ids } => {
                commands::group::ack(&engine, &log, &group, &ids)
            }
            GroupCommands::Claim {
                log,
                group,
                consumer,
                min_idle,
                ids,
            } => commands::pending::claim(&engine, &log, &group, &consumer, min_idle, &ids),
            GroupCommands::AutoClaim {
                log,
                group,
                consumer,
                min_idle,
                start,
                count,
            } => commands::pending::auto_claim(
                &engine, &log, &group, &consumer, min_idle, &start, count,
            ),
            GroupCommands::Pending {
                log,
                group,
                detail,
                consumer,
                min_idle,
                count,
            } => {
                if detail {
                    commands::pending::detail(&engine, &log, &group, consumer, min_idle, count)
                } else {
                    commands::pending::summary(&engine, &log, &group)
                }
            }
            GroupCommands::RemoveConsumer {
                log,
                group,
                consumer,
                transfer_to,
            } => commands::group::remove_consumer(&engine, &log, &group, &consumer, transfer_to),
        },
    };

    // Group state is only written on close, so close even when the command failed
    engine.close()?;
    result
}
