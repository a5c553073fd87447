//! Development pipeline command.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use kiln_server::{DevServer, DevServerConfig, HmrHub};
use kiln_tasks::{pipeline, ReloadSink, TaskContext};

use super::watcher;

/// Build once, then serve the output and rebuild on change.
pub async fn run(ctx: TaskContext, config: DevServerConfig, delay: Duration) -> Result<()> {
    pipeline::run_full(&ctx).await?;

    let hub = HmrHub::new(ctx.output_root());
    let server = DevServer::new(config, hub.clone());
    let serving = tokio::spawn(server.start());

    let sink: Arc<dyn ReloadSink> = Arc::new(hub);
    tokio::select! {
        watched = watcher::run(ctx, delay, Some(sink)) => watched,
        served = serving => {
            served??;
            Ok(())
        }
    }
}
