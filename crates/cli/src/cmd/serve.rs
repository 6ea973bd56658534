//! Run the daemon in the foreground

use crate::context::SyncContext;
use anyhow::Result;

pub fn run(ctx: SyncContext) -> Result<()> {
    if let Some(indicator) = ctx.classifier.matched_indicator() {
        tracing::info!("Running on a volatile host ({})", indicator);
    }
    crate::daemon::serve(ctx)
}
