//! Asset pipeline core for kiln.
//!
//! Maps asset categories to source globs and output directories, implements
//! one transform task per category, and composes them into a task graph that
//! runs independent tasks concurrently.

pub mod clean;
pub mod graph;
pub mod mode;
pub mod notify;
pub mod pipeline;
pub mod registry;
pub mod task;
pub mod transforms;
pub mod watch;

pub use clean::CleanTask;
pub use graph::{GraphError, PipelineError, TaskGraph, TaskGraphBuilder};
pub use mode::{Mode, BUILD_KEYWORD};
pub use notify::{LogNotifier, Notifier};
pub use registry::{Category, ConfigError, PathEntry, PathRegistry, SourceFile, SourceSet};
pub use task::{ReloadSink, Task, TaskContext, TaskError, TaskReport};
pub use watch::{Dispatcher, Subscription, Subscriptions};
