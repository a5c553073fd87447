//! Watch command: rebuild categories as their sources change.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use kiln_server::{FileWatcher, ServerError};
use kiln_tasks::{pipeline, Dispatcher, ReloadSink, Subscriptions, TaskContext};

/// Watch every source directory and dispatch changes until the process exits.
pub async fn run(
    ctx: TaskContext,
    delay: Duration,
    sink: Option<Arc<dyn ReloadSink>>,
) -> Result<()> {
    let tasks = pipeline::transform_tasks();
    let subscriptions = Subscriptions::for_tasks(&ctx.registry, &tasks)?;

    let roots: Vec<PathBuf> = subscriptions
        .watch_roots()
        .into_iter()
        .map(|root| ctx.project_dir.join(root))
        .filter(|root| root.is_dir())
        .collect();

    let (watcher, mut rx) =
        FileWatcher::new(&roots).map_err(|e| ServerError::Watch(e.to_string()))?;
    tracing::info!("Watching {} directories", roots.len());

    let project_dir = ctx.project_dir.clone();
    let dispatcher = Dispatcher::spawn(tasks, subscriptions, ctx, sink, delay);

    while let Some(event) = rx.recv().await {
        let Ok(rel_path) = event.path().strip_prefix(&project_dir) else {
            continue;
        };
        dispatcher.dispatch(rel_path);
    }

    // Keep watcher alive
    drop(watcher);
    Ok(())
}
