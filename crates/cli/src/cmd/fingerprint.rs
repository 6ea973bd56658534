//! Print the content fingerprint of the active database

use crate::context::SyncContext;
use anyhow::{Context, Result};

pub fn run(ctx: &SyncContext) -> Result<()> {
    let fingerprint = ctx
        .db
        .fingerprint()
        .with_context(|| format!("Failed to read {}", ctx.db.path().display()))?;
    println!("{}", fingerprint);
    Ok(())
}
