//! ledgerd - durability and sync daemon for the ledger database

use anyhow::Result;
use clap::{Parser, Subcommand};
use ledger_sync::context::SyncContext;
use ledger_sync::{cmd, system_config};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Snapshots, restores and change notifications for the ledger database
#[derive(Parser)]
#[command(name = "ledgerd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ./ledger.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Restore if needed, then run the backup and sync loops and serve events
    Serve,
    /// Take a snapshot now
    Backup {
        /// Record as a manual snapshot (default: automatic)
        #[arg(long)]
        manual: bool,
        /// Also upload to the remote archive
        #[arg(long)]
        upload: bool,
    },
    /// List snapshots, newest first
    List {
        /// List the remote archive instead
        #[arg(long)]
        remote: bool,
        /// Number of snapshots to show
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Restore the active database from a snapshot
    Restore {
        /// Snapshot name (with or without .db)
        name: String,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Install another database file as the active one
    Import {
        /// Database file to import
        path: PathBuf,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Delete a snapshot locally and remotely
    Delete {
        /// Snapshot name (with or without .db)
        name: String,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Apply the retention caps
    Prune,
    /// Upload snapshots missing from the remote archive
    SyncRemote,
    /// Show host, database and snapshot status
    Status,
    /// Print the database content fingerprint
    Fingerprint,
    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let (config, source) = system_config::load(cli.config.as_deref())?;

    if let Commands::Config = cli.command {
        return cmd::config::run(&config, source.as_deref());
    }

    // Built and dropped on this thread, never inside the async runtime
    let ctx = SyncContext::from_config(config)?;

    match cli.command {
        Commands::Serve => cmd::serve::run(ctx),
        Commands::Backup { manual, upload } => cmd::backup::run(&ctx, manual, upload),
        Commands::List { remote, limit } => cmd::list::run(&ctx, remote, limit),
        Commands::Restore { name, yes } => cmd::restore::run(&ctx, &name, yes),
        Commands::Import { path, yes } => cmd::import::run(&ctx, &path, yes),
        Commands::Delete { name, yes } => cmd::delete::run(&ctx, &name, yes),
        Commands::Prune => cmd::prune::run(&ctx),
        Commands::SyncRemote => cmd::sync_remote::run(&ctx),
        Commands::Status => cmd::status::run(&ctx),
        Commands::Fingerprint => cmd::fingerprint::run(&ctx),
        Commands::Config => cmd::config::run(&ctx.config, source.as_deref()),
    }
}
