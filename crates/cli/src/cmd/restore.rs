//! Restore the active database from a local snapshot

use crate::context::SyncContext;
use crate::locks::{DaemonLock, RestoreLock};
use crate::util;
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use ledger_journal::RestoreReceipt;
use owo_colors::OwoColorize;

pub fn run(ctx: &SyncContext, name: &str, yes: bool) -> Result<()> {
    let snapshot = ctx
        .snapshots
        .find(name)?
        .ok_or_else(|| anyhow!("Snapshot {} not found", name))?;

    println!("{}", "Restore Snapshot".bold());
    println!("{}", util::DIVIDER);
    println!();
    println!(
        "Snapshot:    {} {}",
        snapshot.filename().yellow(),
        util::format_relative_time(snapshot.created_at, Utc::now()).dimmed()
    );
    println!("Ledger rows: {}", snapshot.row_counts.ledger);
    println!("Target:      {}", ctx.db.path().display());
    println!();

    if !yes {
        println!(
            "{}",
            "Warning: this replaces the active database. A safety snapshot is taken first."
                .red()
                .bold()
        );
        if !util::confirm("Continue?")? {
            println!("{}", "Restore cancelled".yellow());
            return Ok(());
        }
    }

    if let Some(pid) = DaemonLock::holder(&ctx.state_dir) {
        println!(
            "{}",
            format!("Daemon (PID {}) is running; its backup loop pauses during the restore", pid)
                .dimmed()
        );
    }

    let _lock = RestoreLock::acquire(&ctx.state_dir)?;
    let receipt = ctx
        .snapshots
        .restore_snapshot(&snapshot)
        .context("Restore failed")?;

    print_receipt(&receipt);
    Ok(())
}

pub(crate) fn print_receipt(receipt: &RestoreReceipt) {
    println!();
    println!(
        "{} Restored {} ({} ledger rows, {} lookup rows)",
        "✓".green(),
        receipt.source.cyan(),
        receipt.row_counts.ledger.to_string().green(),
        receipt.row_counts.lookup
    );
    if let Some(safety) = &receipt.safety_snapshot {
        println!(
            "  Previous database saved as {}",
            safety.filename().dimmed()
        );
    }
}
