//! Single task command.

use anyhow::Result;
use kiln_tasks::{pipeline, TaskContext};

/// Run one named task without clean or watch.
pub async fn run(name: &str, ctx: TaskContext) -> Result<()> {
    let Some(task) = pipeline::single_task(name) else {
        anyhow::bail!(
            "Unknown task '{}'. Known tasks: {}",
            name,
            known_tasks().join(", ")
        );
    };

    let report = pipeline::run_single(task, &ctx).await?;
    tracing::info!(
        "'{}' wrote {} files ({} sources failed)",
        report.task,
        report.written.len(),
        report.failures
    );

    Ok(())
}

fn known_tasks() -> Vec<&'static str> {
    let mut names = vec![super::DEFAULT_TASK, kiln_tasks::BUILD_KEYWORD, super::WATCHER_TASK];
    names.extend(pipeline::task_names());
    names
}
