//! Change routing: which task re-runs when a source file changes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::registry::{Category, ConfigError, PathRegistry, SourceSet};
use crate::task::{ReloadSink, Task, TaskContext};

/// Delay between the first change event and the task run. Further events in
/// this window are folded into the same run.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(200);

/// One row of the subscription table.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub category: Category,
    pub task: &'static str,
    sources: SourceSet,
}

impl Subscription {
    pub fn matches(&self, rel_path: &Path) -> bool {
        self.sources.matches(rel_path)
    }
}

/// Category → task table.
#[derive(Debug, Clone, Default)]
pub struct Subscriptions {
    entries: Vec<Subscription>,
}

impl Subscriptions {
    /// Subscribe each task to the sources of its category.
    ///
    /// The script entry is a single file, but the whole script directory is
    /// watched so edits to modules it imports rebuild it too.
    pub fn for_tasks(
        registry: &PathRegistry,
        tasks: &[Arc<dyn Task>],
    ) -> Result<Self, ConfigError> {
        let mut entries = Vec::new();

        for task in tasks {
            let Some(category) = task.category() else {
                continue;
            };

            let mut sources = registry.sources(category)?;
            if category == Category::Scripts {
                let patterns: Vec<String> = sources
                    .bases()
                    .iter()
                    .map(|base| format!("{}/**/*", base.display()))
                    .collect();
                sources = SourceSet::new(patterns.as_slice())?;
            }

            entries.push(Subscription {
                category,
                task: task.name(),
                sources,
            });
        }

        Ok(Self { entries })
    }

    /// Tasks subscribed to a project-relative path.
    pub fn route(&self, rel_path: &Path) -> Vec<&'static str> {
        self.entries
            .iter()
            .filter(|sub| sub.matches(rel_path))
            .map(|sub| sub.task)
            .collect()
    }

    /// Project-relative directories a watcher must observe.
    pub fn watch_roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = self
            .entries
            .iter()
            .flat_map(|sub| sub.sources.bases())
            .collect();
        roots.sort();
        roots.dedup();
        roots
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.entries.iter()
    }
}

/// Re-runs subscribed tasks on change events.
///
/// Each task has its own worker and a one-slot queue: changes that arrive
/// while a run is pending or in progress collapse into a single follow-up
/// run. Different tasks never wait on each other.
pub struct Dispatcher {
    subscriptions: Subscriptions,
    queues: HashMap<&'static str, mpsc::Sender<()>>,
}

impl Dispatcher {
    /// Start one worker per subscribed task. Must be called inside a Tokio
    /// runtime.
    pub fn spawn(
        tasks: Vec<Arc<dyn Task>>,
        subscriptions: Subscriptions,
        ctx: TaskContext,
        sink: Option<Arc<dyn ReloadSink>>,
        delay: Duration,
    ) -> Self {
        let mut queues = HashMap::new();

        for task in tasks {
            if !subscriptions.iter().any(|sub| sub.task == task.name()) {
                continue;
            }

            let (tx, rx) = mpsc::channel(1);
            queues.insert(task.name(), tx);
            tokio::spawn(worker(task, rx, ctx.clone(), sink.clone(), delay));
        }

        Self {
            subscriptions,
            queues,
        }
    }

    /// Queue every task subscribed to `rel_path`. Returns the routed tasks.
    pub fn dispatch(&self, rel_path: &Path) -> Vec<&'static str> {
        let tasks = self.subscriptions.route(rel_path);

        for task in &tasks {
            if let Some(queue) = self.queues.get(task) {
                // A full queue already holds a pending run.
                let _ = queue.try_send(());
            }
        }

        if !tasks.is_empty() {
            tracing::debug!("{} changed, queued {:?}", rel_path.display(), tasks);
        }
        tasks
    }

    pub fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }
}

async fn worker(
    task: Arc<dyn Task>,
    mut rx: mpsc::Receiver<()>,
    ctx: TaskContext,
    sink: Option<Arc<dyn ReloadSink>>,
    delay: Duration,
) {
    while rx.recv().await.is_some() {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        while rx.try_recv().is_ok() {}

        let name = task.name();
        let run_task = Arc::clone(&task);
        let run_ctx = ctx.clone();
        tracing::info!("Starting '{}'...", name);

        match tokio::task::spawn_blocking(move || run_task.run(&run_ctx)).await {
            Ok(Ok(report)) => {
                tracing::info!(
                    "Finished '{}' ({} written, {} failed)",
                    name,
                    report.written.len(),
                    report.failures
                );
                if let Some(sink) = &sink {
                    if !report.written.is_empty() {
                        sink.reload(&report);
                    }
                }
            }
            Ok(Err(e)) => ctx.notifier.notify(name, &e.to_string()),
            Err(e) => ctx.notifier.notify(name, &e.to_string()),
        }
    }
}
