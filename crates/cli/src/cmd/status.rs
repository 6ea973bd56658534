//! Show host classification, database and snapshot status

use crate::context::SyncContext;
use crate::locks::DaemonLock;
use crate::util;
use anyhow::Result;
use chrono::Utc;
use owo_colors::OwoColorize;

pub fn run(ctx: &SyncContext) -> Result<()> {
    let now = Utc::now();

    println!("{}", "Sync Status".bold());
    println!("{}", util::DIVIDER);
    println!();

    match ctx.classifier.matched_indicator() {
        Some(indicator) => println!(
            "Host:        {} (via {})",
            "volatile".yellow(),
            indicator
        ),
        None => println!("Host:        {}", "durable".green()),
    }

    match DaemonLock::holder(&ctx.state_dir) {
        Some(pid) => println!("Daemon:      {} (PID {})", "running".green(), pid),
        None => println!("Daemon:      {}", "not running".dimmed()),
    }
    println!();

    println!("Database:    {}", ctx.db.path().display().to_string().cyan());
    if ctx.db.exists() {
        match ctx.db.row_counts() {
            Ok(counts) => {
                println!("  Ledger:    {} rows", counts.ledger);
                println!("  Lookup:    {} rows", counts.lookup);
            }
            Err(e) => println!("  {}", format!("unreadable: {}", e.reason()).red()),
        }
        if let Ok(fingerprint) = ctx.db.fingerprint() {
            println!("  Content:   {}", fingerprint.short().dimmed());
        }
    } else {
        println!("  {}", "missing".yellow());
    }
    println!();

    let snapshots = ctx.snapshots.list_snapshots()?;
    println!("Snapshots:   {}", ctx.snapshots.dir().display());
    println!("  Count:     {}", snapshots.len());
    if let Some(latest) = snapshots.first() {
        println!(
            "  Latest:    {} ({})",
            latest.filename().yellow(),
            util::format_relative_time(latest.created_at, now)
        );
        println!(
            "  Time:      {}",
            util::format_absolute_time(latest.created_at).dimmed()
        );
    }
    let pending = snapshots.iter().filter(|s| !s.is_replicated()).count();
    println!("  Local only: {}", pending);
    println!();

    if ctx.remote.is_available() {
        println!(
            "Remote:      {} ({}, folder \"{}\")",
            "configured".green(),
            ctx.remote.backend_name(),
            ctx.remote.folder_name()
        );
    } else {
        println!("Remote:      {}", "unavailable".dimmed());
    }

    Ok(())
}
