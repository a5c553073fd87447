//! Task abstraction shared by the clean task and every transform task.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::mode::Mode;
use crate::notify::{LogNotifier, Notifier};
use crate::registry::{Category, ConfigError, PathRegistry, SourceFile};

/// Errors that fail a task. Transform errors are not among them; those go
/// through the [`Notifier`].
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl TaskError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        TaskError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Outcome of one task invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    /// Task name
    pub task: &'static str,

    /// Files written, in write order
    pub written: Vec<PathBuf>,

    /// Number of sources that failed to transform
    pub failures: usize,
}

impl TaskReport {
    pub fn new(task: &'static str) -> Self {
        Self {
            task,
            written: Vec::new(),
            failures: 0,
        }
    }
}

/// Everything a task needs to run. Cloned into each spawned task.
#[derive(Clone)]
pub struct TaskContext {
    /// Directory that source patterns and output paths are relative to
    pub project_dir: PathBuf,

    /// Category paths
    pub registry: Arc<PathRegistry>,

    /// Build mode
    pub mode: Mode,

    /// Sink for transform errors
    pub notifier: Arc<dyn Notifier>,
}

impl TaskContext {
    pub fn new(project_dir: impl Into<PathBuf>, registry: Arc<PathRegistry>, mode: Mode) -> Self {
        Self {
            project_dir: project_dir.into(),
            registry,
            mode,
            notifier: Arc::new(LogNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Source files of a category.
    pub fn sources(&self, category: Category) -> Result<Vec<SourceFile>, TaskError> {
        self.registry.sources(category)?.collect(&self.project_dir)
    }

    /// Output directory of a category, joined to the project directory.
    pub fn output_dir(&self, category: Category) -> Result<PathBuf, TaskError> {
        Ok(self.project_dir.join(self.registry.output(category)?))
    }

    /// Output root, joined to the project directory.
    pub fn output_root(&self) -> PathBuf {
        self.project_dir.join(self.registry.root())
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("project_dir", &self.project_dir)
            .field("registry", &self.registry)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// A named unit of work.
pub trait Task: Send + Sync {
    /// Name used on the command line and in the task graph.
    fn name(&self) -> &'static str;

    /// Category this task transforms, if any.
    fn category(&self) -> Option<Category>;

    /// Run the task to completion.
    fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError>;
}

/// Receives a signal after a task run wrote output (the dev server).
pub trait ReloadSink: Send + Sync {
    fn reload(&self, report: &TaskReport);
}

pub(crate) fn read_bytes(path: &Path) -> Result<Vec<u8>, TaskError> {
    fs::read(path).map_err(|e| TaskError::io(path, e))
}

pub(crate) fn read_string(path: &Path) -> Result<String, TaskError> {
    fs::read_to_string(path).map_err(|e| TaskError::io(path, e))
}

/// Write a file, creating parent directories, and record it in the report.
pub(crate) fn write_output(
    report: &mut TaskReport,
    path: PathBuf,
    contents: impl AsRef<[u8]>,
) -> Result<(), TaskError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| TaskError::io(parent, e))?;
    }
    fs::write(&path, contents).map_err(|e| TaskError::io(&path, e))?;
    tracing::debug!("Wrote {}", path.display());
    report.written.push(path);
    Ok(())
}
