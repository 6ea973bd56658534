//! List local or remote snapshots

use crate::context::SyncContext;
use crate::util;
use anyhow::{Context, Result};
use chrono::Utc;
use owo_colors::OwoColorize;

pub fn run(ctx: &SyncContext, remote: bool, limit: Option<usize>) -> Result<()> {
    if remote {
        return list_remote(ctx, limit);
    }

    let snapshots = ctx
        .snapshots
        .list_snapshots()
        .context("Failed to list snapshots")?;

    println!("{}", "Local Snapshots".bold());
    println!("{}", util::DIVIDER);

    if snapshots.is_empty() {
        println!("{}", "No snapshots yet".dimmed());
        return Ok(());
    }

    let now = Utc::now();
    let shown = limit.unwrap_or(snapshots.len());
    for snapshot in snapshots.iter().take(shown) {
        util::display_snapshot_line(snapshot, now);
    }

    if snapshots.len() > shown {
        println!("{}", format!("... and {} more", snapshots.len() - shown).dimmed());
    }

    let replicated = snapshots.iter().filter(|s| s.is_replicated()).count();
    println!();
    println!(
        "{} snapshots in {} ({} replicated)",
        snapshots.len(),
        ctx.snapshots.dir().display(),
        replicated
    );
    Ok(())
}

fn list_remote(ctx: &SyncContext, limit: Option<usize>) -> Result<()> {
    let entries = ctx.remote.list().context("Failed to list remote archive")?;

    println!(
        "{} {}",
        "Remote Snapshots".bold(),
        format!("({})", ctx.remote.folder_name()).dimmed()
    );
    println!("{}", util::DIVIDER);

    if entries.is_empty() {
        println!("{}", "Remote folder is empty".dimmed());
        return Ok(());
    }

    let now = Utc::now();
    for entry in entries.iter().take(limit.unwrap_or(entries.len())) {
        let size = entry
            .size_bytes
            .map(util::format_size)
            .unwrap_or_else(|| "?".to_string());
        println!(
            "{}  {:>10}  ({})",
            entry.name.cyan(),
            size,
            util::format_relative_time(entry.created_at, now).dimmed()
        );
    }
    Ok(())
}
