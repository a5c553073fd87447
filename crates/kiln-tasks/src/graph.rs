//! Directed acyclic graph of named tasks and its concurrent scheduler.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;

use crate::registry::ConfigError;
use crate::task::{Task, TaskContext, TaskError, TaskReport};

/// Errors detected while building a graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Task '{0}' is defined more than once")]
    Duplicate(&'static str),

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency {
        task: &'static str,
        dependency: &'static str,
    },

    #[error("Task graph has a cycle through '{0}'")]
    Cycle(&'static str),
}

/// Errors raised while running a graph.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Task '{task}' failed: {source}")]
    Task {
        task: &'static str,
        #[source]
        source: TaskError,
    },

    #[error("Task did not complete: {0}")]
    Join(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

struct Node {
    task: Arc<dyn Task>,
    deps: Vec<usize>,
}

/// Builder collecting tasks and their declared dependencies.
#[derive(Default)]
pub struct TaskGraphBuilder {
    entries: Vec<(Arc<dyn Task>, Vec<&'static str>)>,
}

impl TaskGraphBuilder {
    /// Add a task that may start once every task in `deps` has completed.
    pub fn task(self, task: impl Task + 'static, deps: &[&'static str]) -> Self {
        self.shared(Arc::new(task), deps)
    }

    /// Add an already shared task.
    pub fn shared(mut self, task: Arc<dyn Task>, deps: &[&'static str]) -> Self {
        self.entries.push((task, deps.to_vec()));
        self
    }

    /// Resolve names and reject duplicates, unknown dependencies and cycles.
    pub fn build(self) -> Result<TaskGraph, GraphError> {
        let mut index = HashMap::new();
        for (i, (task, _)) in self.entries.iter().enumerate() {
            if index.insert(task.name(), i).is_some() {
                return Err(GraphError::Duplicate(task.name()));
            }
        }

        let mut nodes = Vec::with_capacity(self.entries.len());
        for (task, deps) in self.entries {
            let deps = deps
                .into_iter()
                .map(|dep| {
                    index
                        .get(dep)
                        .copied()
                        .ok_or(GraphError::UnknownDependency {
                            task: task.name(),
                            dependency: dep,
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            nodes.push(Node { task, deps });
        }

        let graph = TaskGraph { nodes };
        graph.check_acyclic()?;
        Ok(graph)
    }
}

/// A validated task graph.
pub struct TaskGraph {
    nodes: Vec<Node>,
}

impl TaskGraph {
    pub fn builder() -> TaskGraphBuilder {
        TaskGraphBuilder::default()
    }

    /// Task names in insertion order.
    pub fn names(&self) -> Vec<&'static str> {
        self.nodes.iter().map(|n| n.task.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Tasks in the graph, in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = &Arc<dyn Task>> {
        self.nodes.iter().map(|n| &n.task)
    }

    fn dependents(&self) -> Vec<Vec<usize>> {
        let mut dependents = vec![Vec::new(); self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            for &dep in &node.deps {
                dependents[dep].push(i);
            }
        }
        dependents
    }

    fn check_acyclic(&self) -> Result<(), GraphError> {
        let dependents = self.dependents();
        let mut pending: Vec<usize> = self.nodes.iter().map(|n| n.deps.len()).collect();
        let mut ready: VecDeque<usize> = (0..self.nodes.len()).filter(|&i| pending[i] == 0).collect();
        let mut visited = 0;

        while let Some(i) = ready.pop_front() {
            visited += 1;
            for &next in &dependents[i] {
                pending[next] -= 1;
                if pending[next] == 0 {
                    ready.push_back(next);
                }
            }
        }

        if visited == self.nodes.len() {
            return Ok(());
        }
        let stuck = pending
            .iter()
            .position(|&p| p > 0)
            .map(|i| self.nodes[i].task.name())
            .unwrap_or("?");
        Err(GraphError::Cycle(stuck))
    }

    /// Run every task, starting each as soon as its dependencies completed.
    ///
    /// Independent tasks run concurrently on the blocking pool. After the
    /// first failure no further tasks are started; tasks already running are
    /// awaited and the first failure is returned.
    pub async fn run(&self, ctx: &TaskContext) -> Result<Vec<TaskReport>, PipelineError> {
        let dependents = self.dependents();
        let mut pending: Vec<usize> = self.nodes.iter().map(|n| n.deps.len()).collect();
        let mut set = JoinSet::new();
        let mut reports = Vec::with_capacity(self.nodes.len());
        let mut failure = None;

        for (i, count) in pending.iter().enumerate() {
            if *count == 0 {
                self.spawn(&mut set, i, ctx);
            }
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((i, Ok(report))) => {
                    reports.push(report);
                    if failure.is_some() {
                        continue;
                    }
                    for &next in &dependents[i] {
                        pending[next] -= 1;
                        if pending[next] == 0 {
                            self.spawn(&mut set, next, ctx);
                        }
                    }
                }
                Ok((i, Err(source))) => {
                    let task = self.nodes[i].task.name();
                    tracing::error!("'{}' errored: {}", task, source);
                    failure.get_or_insert(PipelineError::Task { task, source });
                }
                Err(e) => {
                    failure.get_or_insert(PipelineError::Join(e.to_string()));
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(reports),
        }
    }

    fn spawn(
        &self,
        set: &mut JoinSet<(usize, Result<TaskReport, TaskError>)>,
        i: usize,
        ctx: &TaskContext,
    ) {
        let task = Arc::clone(&self.nodes[i].task);
        let ctx = ctx.clone();

        set.spawn_blocking(move || {
            let start = Instant::now();
            tracing::info!("Starting '{}'...", task.name());
            let result = task.run(&ctx);
            if let Ok(report) = &result {
                tracing::info!(
                    "Finished '{}' after {}ms ({} written, {} failed)",
                    task.name(),
                    start.elapsed().as_millis(),
                    report.written.len(),
                    report.failures
                );
            }
            (i, result)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::mode::Mode;
    use crate::registry::{Category, PathRegistry};

    #[derive(Default)]
    struct Probe {
        log: Mutex<Vec<&'static str>>,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    struct Step {
        name: &'static str,
        probe: Arc<Probe>,
        fail: bool,
    }

    impl Task for Step {
        fn name(&self) -> &'static str {
            self.name
        }

        fn category(&self) -> Option<Category> {
            None
        }

        fn run(&self, _ctx: &TaskContext) -> Result<TaskReport, TaskError> {
            let now = self.probe.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.probe.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            self.probe.log.lock().unwrap().push(self.name);
            self.probe.running.fetch_sub(1, Ordering::SeqCst);

            if self.fail {
                return Err(TaskError::io(
                    &PathBuf::from("src"),
                    std::io::Error::other("boom"),
                ));
            }
            Ok(TaskReport::new(self.name))
        }
    }

    fn step(name: &'static str, probe: &Arc<Probe>) -> Step {
        Step {
            name,
            probe: Arc::clone(probe),
            fail: false,
        }
    }

    fn context() -> TaskContext {
        TaskContext::new(".", Arc::new(PathRegistry::default()), Mode::Development)
    }

    #[tokio::test]
    async fn runs_dependencies_first_and_fans_out() {
        let probe = Arc::new(Probe::default());
        let graph = TaskGraph::builder()
            .task(step("clean", &probe), &[])
            .task(step("styles", &probe), &["clean"])
            .task(step("scripts", &probe), &["clean"])
            .build()
            .unwrap();

        let reports = graph.run(&context()).await.unwrap();

        assert_eq!(reports.len(), 3);
        assert_eq!(probe.log.lock().unwrap()[0], "clean");
        assert_eq!(probe.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failure_stops_dependents() {
        let probe = Arc::new(Probe::default());
        let graph = TaskGraph::builder()
            .task(
                Step {
                    name: "clean",
                    probe: Arc::clone(&probe),
                    fail: true,
                },
                &[],
            )
            .task(step("styles", &probe), &["clean"])
            .build()
            .unwrap();

        let err = graph.run(&context()).await.unwrap_err();

        assert!(matches!(err, PipelineError::Task { task: "clean", .. }));
        assert_eq!(*probe.log.lock().unwrap(), vec!["clean"]);
    }

    #[test]
    fn rejects_invalid_graphs() {
        let probe = Arc::new(Probe::default());

        let unknown = TaskGraph::builder()
            .task(step("styles", &probe), &["clean"])
            .build();
        assert!(matches!(
            unknown,
            Err(GraphError::UnknownDependency { dependency: "clean", .. })
        ));

        let duplicate = TaskGraph::builder()
            .task(step("styles", &probe), &[])
            .task(step("styles", &probe), &[])
            .build();
        assert!(matches!(duplicate, Err(GraphError::Duplicate("styles"))));

        let cycle = TaskGraph::builder()
            .task(step("a", &probe), &["b"])
            .task(step("b", &probe), &["a"])
            .build();
        assert!(matches!(cycle, Err(GraphError::Cycle(_))));
    }
}
