//! Apply the retention caps now

use crate::context::SyncContext;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;

pub fn run(ctx: &SyncContext) -> Result<()> {
    let policy = ctx.snapshots.policy();
    let summary = ctx.snapshots.prune().context("Failed to prune snapshots")?;

    if summary.removed == 0 && summary.failed == 0 {
        println!(
            "{}",
            format!(
                "Nothing to prune ({} kept, caps: {} auto / {} manual)",
                summary.kept, policy.max_auto, policy.max_manual
            )
            .dimmed()
        );
        return Ok(());
    }

    println!(
        "Removed {} snapshots, kept {}",
        summary.removed.to_string().yellow(),
        summary.kept
    );
    if summary.failed > 0 {
        println!("{}", format!("{} could not be removed", summary.failed).red());
    }
    Ok(())
}
