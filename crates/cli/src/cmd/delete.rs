//! Delete a snapshot locally and from the remote archive

use crate::context::SyncContext;
use crate::util;
use anyhow::{anyhow, Context, Result};
use owo_colors::OwoColorize;

pub fn run(ctx: &SyncContext, name: &str, yes: bool) -> Result<()> {
    let snapshot = ctx
        .snapshots
        .find(name)?
        .ok_or_else(|| anyhow!("Snapshot {} not found", name))?;

    if !yes && !util::confirm(&format!("Delete {}?", snapshot.filename()))? {
        println!("{}", "Delete cancelled".yellow());
        return Ok(());
    }

    let remote_deleted = ctx
        .replication
        .delete(&snapshot)
        .with_context(|| format!("Failed to delete {}", snapshot.filename()))?;

    println!("{} Deleted {}", "✓".green(), snapshot.filename().cyan());
    if remote_deleted {
        println!("  Remote copy removed");
    } else if snapshot.is_replicated() {
        println!("  {}", "Remote copy could not be removed".yellow());
    }
    Ok(())
}
