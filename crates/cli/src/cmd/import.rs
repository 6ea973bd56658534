//! Install an external database file as the active one

use crate::context::SyncContext;
use crate::locks::RestoreLock;
use crate::util;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::path::Path;

pub fn run(ctx: &SyncContext, path: &Path, yes: bool) -> Result<()> {
    if !path.is_file() {
        anyhow::bail!("{} is not a file", path.display());
    }

    if !yes {
        println!(
            "Import {} over {}",
            path.display().to_string().yellow(),
            ctx.db.path().display()
        );
        if !util::confirm("Continue?")? {
            println!("{}", "Import cancelled".yellow());
            return Ok(());
        }
    }

    let _lock = RestoreLock::acquire(&ctx.state_dir)?;
    let receipt = ctx
        .snapshots
        .import_database(path)
        .with_context(|| format!("Failed to import {}", path.display()))?;

    super::restore::print_receipt(&receipt);
    Ok(())
}
