//! Take a snapshot now

use crate::context::SyncContext;
use crate::util;
use anyhow::{Context, Result};
use ledger_journal::SnapshotOrigin;
use owo_colors::OwoColorize;

pub fn run(ctx: &SyncContext, manual: bool, upload: bool) -> Result<()> {
    let origin = if manual {
        SnapshotOrigin::Manual
    } else {
        SnapshotOrigin::Auto
    };

    if upload && !ctx.remote.is_available() {
        println!(
            "{}",
            "Remote archive not configured, snapshot will stay local".yellow()
        );
    }

    let outcome = ctx
        .replication
        .backup(origin, upload)
        .context("Failed to create snapshot")?;
    let snapshot = &outcome.snapshot;

    println!(
        "{} Created {} ({})",
        "✓".green(),
        snapshot.filename().cyan(),
        origin
    );
    println!("  Size:        {}", util::format_size(snapshot.size_bytes));
    println!("  Ledger rows: {}", snapshot.row_counts.ledger);
    println!("  Lookup rows: {}", snapshot.row_counts.lookup);

    if outcome.is_replicated() {
        println!("  Remote:      {}", "uploaded".green());
    } else if let Some(e) = &outcome.replication_error {
        println!("  Remote:      {} ({})", "upload failed".red(), e.reason());
    }

    Ok(())
}
