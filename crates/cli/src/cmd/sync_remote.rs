//! Upload every snapshot that is not yet in the remote archive

use crate::context::SyncContext;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;

pub fn run(ctx: &SyncContext) -> Result<()> {
    let summary = ctx
        .replication
        .sync_unreplicated()
        .context("Remote sync failed")?;

    println!(
        "{} {} uploaded, {} already replicated",
        "✓".green(),
        summary.uploaded.to_string().green(),
        summary.skipped
    );
    if summary.failed > 0 {
        println!(
            "{}",
            format!("{} uploads failed, see log for details", summary.failed).red()
        );
    }
    Ok(())
}
