//! Removes the output root before a full rebuild.

use std::fs;
use std::io::ErrorKind;

use crate::registry::Category;
use crate::task::{Task, TaskContext, TaskError, TaskReport};

#[derive(Debug, Default, Clone, Copy)]
pub struct CleanTask;

impl Task for CleanTask {
    fn name(&self) -> &'static str {
        "clean"
    }

    fn category(&self) -> Option<Category> {
        None
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let root = ctx.output_root();

        match fs::remove_dir_all(&root) {
            Ok(()) => tracing::info!("Removed {}", root.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("{} already clean", root.display());
            }
            Err(e) => return Err(TaskError::io(&root, e)),
        }

        Ok(TaskReport::new(self.name()))
    }
}
