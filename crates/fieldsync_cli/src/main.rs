//! FieldSync CLI
//!
//! Operator tools for an on-disk FieldSync outbox. Nothing here talks to the
//! remote; the commands inspect and maintain local state.
//!
//! # Commands
//!
//! - `summary` - Record, pending and review counts
//! - `pending` - List unsynced records
//! - `save` - Record a new mutation
//! - `verify` - Check payload checksums
//! - `review` - List or resolve held records
//! - `set-strategy` - Change a record's conflict strategy
//! - `purge` - Drop synced records

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// FieldSync outbox maintenance tools.
#[derive(Parser)]
#[command(name = "fieldsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the outbox directory
    #[arg(global = true, short, long)]
    dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(global = true, short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show record, pending and review counts
    Summary,

    /// List unsynced records
    Pending {
        /// Order by sync priority instead of creation time
        #[arg(short, long)]
        by_priority: bool,
    },

    /// Record a new mutation
    Save {
        /// Record kind (household-registration, household-update,
        /// member-update, grievance, payment-acknowledgement)
        kind: String,

        /// Payload as JSON
        payload: String,

        /// Sync priority (high, medium, low)
        #[arg(short, long, default_value = "medium")]
        priority: String,

        /// Conflict strategy (server-wins, client-wins, merge, manual)
        #[arg(short, long)]
        strategy: Option<String>,
    },

    /// Check pending records against their checksums
    Verify,

    /// Inspect or resolve records held for manual review
    Review {
        #[command(subcommand)]
        command: ReviewCommands,
    },

    /// Change a record's conflict strategy
    SetStrategy {
        /// Record id
        id: String,

        /// Conflict strategy (server-wins, client-wins, merge, manual)
        strategy: String,
    },

    /// Drop records the remote has accepted
    Purge,
}

#[derive(Subcommand)]
enum ReviewCommands {
    /// List held records
    List,

    /// Apply an action to a held record
    Resolve {
        /// Record id
        id: String,

        /// Action (repair-again, delete, ignore)
        action: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let dir = cli.dir.ok_or("Outbox directory required (--dir)")?;
    let format = cli.format.as_str();

    match cli.command {
        Commands::Summary => commands::summary::run(&dir, format)?,
        Commands::Pending { by_priority } => commands::pending::run(&dir, by_priority, format)?,
        Commands::Save {
            kind,
            payload,
            priority,
            strategy,
        } => commands::save::run(&dir, &kind, &payload, &priority, strategy.as_deref())?,
        Commands::Verify => commands::verify::run(&dir, format)?,
        Commands::Review { command } => match command {
            ReviewCommands::List => commands::review::list(&dir, format)?,
            ReviewCommands::Resolve { id, action } => {
                commands::review::resolve(&dir, &id, &action)?;
            }
        },
        Commands::SetStrategy { id, strategy } => {
            commands::strategy::run(&dir, &id, &strategy)?;
        }
        Commands::Purge => commands::purge::run(&dir)?,
    }

    Ok(())
}
