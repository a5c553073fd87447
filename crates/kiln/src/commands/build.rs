//! Production build command.

use anyhow::Result;
use kiln_tasks::{pipeline, TaskContext};

/// Run the build command.
pub async fn run(ctx: TaskContext) -> Result<()> {
    tracing::info!("Building {}...", ctx.output_root().display());

    let reports = pipeline::run_full(&ctx).await?;

    let written: usize = reports.iter().map(|r| r.written.len()).sum();
    let failures: usize = reports.iter().map(|r| r.failures).sum();
    tracing::info!("Wrote {} files ({} sources failed)", written, failures);

    Ok(())
}
