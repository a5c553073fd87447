//! CLI commands.

use std::sync::Arc;

use anyhow::{Context, Result};
use kiln_tasks::{Mode, TaskContext};

use crate::config::ConfigFile;

pub mod build;
pub mod dev;
pub mod task;
pub mod watcher;

/// Task run when none is named: the development pipeline.
pub const DEFAULT_TASK: &str = "default";

/// Watch and rebuild without serving.
pub const WATCHER_TASK: &str = "watcher";

/// Task context rooted at the current directory.
pub fn context(config: &ConfigFile, mode: Mode) -> Result<TaskContext> {
    let project_dir = std::env::current_dir()
        .and_then(|dir| dir.canonicalize())
        .context("Failed to resolve the current directory")?;
    let registry = config.registry()?;

    Ok(TaskContext::new(project_dir, Arc::new(registry), mode))
}
