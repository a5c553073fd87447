//! Pipeline composition: which tasks run, in which order.

use std::sync::Arc;

use crate::clean::CleanTask;
use crate::graph::{GraphError, PipelineError, TaskGraph};
use crate::registry::Category;
use crate::task::{Task, TaskContext, TaskReport};
use crate::transforms::{
    FontsTask, ImagesTask, MarkupTask, ScriptsTask, SpriteTask, StylesTask, TemplatesTask,
};

/// Every transform task, one per category.
pub fn transform_tasks() -> Vec<Arc<dyn Task>> {
    vec![
        Arc::new(TemplatesTask),
        Arc::new(StylesTask),
        Arc::new(ScriptsTask),
        Arc::new(ImagesTask),
        Arc::new(SpriteTask),
        Arc::new(FontsTask),
        Arc::new(MarkupTask),
    ]
}

/// Names accepted by [`single_task`].
pub fn task_names() -> Vec<&'static str> {
    std::iter::once(CleanTask.name())
        .chain(transform_tasks().iter().map(|t| t.name()))
        .collect()
}

/// Look up the clean task or a transform task by name.
pub fn single_task(name: &str) -> Option<Arc<dyn Task>> {
    if name == CleanTask.name() {
        return Some(Arc::new(CleanTask));
    }
    transform_tasks().into_iter().find(|t| t.name() == name)
}

/// Categories a set of tasks reads from.
pub fn categories(tasks: &[Arc<dyn Task>]) -> Vec<Category> {
    tasks.iter().filter_map(|t| t.category()).collect()
}

/// Clean, then every transform task concurrently.
///
/// Used by both the production build and the development pipeline; the mode
/// carried in the [`TaskContext`] selects the per-task variants.
pub fn full_graph() -> Result<TaskGraph, GraphError> {
    let clean = CleanTask.name();
    transform_tasks()
        .into_iter()
        .fold(TaskGraph::builder().task(CleanTask, &[]), |builder, task| {
            builder.shared(task, &[clean])
        })
        .build()
}

/// Validate the registry for every transform task, then run the full graph.
pub async fn run_full(ctx: &TaskContext) -> Result<Vec<TaskReport>, PipelineError> {
    ctx.registry.validate(&categories(&transform_tasks()))?;
    let graph = full_graph()?;

    tracing::info!("Building {} ({} tasks)", ctx.mode, graph.len());
    graph.run(ctx).await
}

/// Validate and run a single task.
pub async fn run_single(
    task: Arc<dyn Task>,
    ctx: &TaskContext,
) -> Result<TaskReport, PipelineError> {
    if let Some(category) = task.category() {
        ctx.registry.validate(&[category])?;
    }

    let graph = TaskGraph::builder().shared(task, &[]).build()?;
    let mut reports = graph.run(ctx).await?;
    reports
        .pop()
        .ok_or_else(|| PipelineError::Join("task produced no report".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::fs;
    use std::path::{Path, PathBuf};

    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;
    use walkdir::WalkDir;

    use crate::mode::Mode;
    use crate::registry::{PathEntry, PathRegistry};

    fn fixture(dir: &Path) {
        fs::create_dir_all(dir.join("src/sass")).unwrap();
        fs::create_dir_all(dir.join("src/pug/pages")).unwrap();
        fs::write(dir.join("src/sass/site.scss"), ".page { .title { color: #333; } }\n").unwrap();
        fs::write(
            dir.join("src/pug/pages/about.pug"),
            "<main>\n  <h1>About</h1>\n</main>\n",
        )
        .unwrap();
    }

    fn output_files(dir: &Path) -> BTreeSet<PathBuf> {
        let dist = dir.join("dist");
        WalkDir::new(&dist)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().strip_prefix(&dist).unwrap().to_path_buf())
            .collect()
    }

    fn context(dir: &Path, mode: Mode) -> TaskContext {
        TaskContext::new(dir, Arc::new(PathRegistry::default()), mode)
    }

    #[test]
    fn full_graph_runs_clean_before_transforms() {
        let graph = full_graph().unwrap();
        let names = graph.names();

        assert_eq!(names[0], "clean");
        assert_eq!(names.len(), 8);
    }

    #[test]
    fn resolves_single_tasks() {
        for name in task_names() {
            assert_eq!(single_task(name).unwrap().name(), name);
        }
        assert!(single_task("deploy").is_none());
    }

    #[tokio::test]
    async fn production_build_produces_declared_outputs_only() {
        let temp = tempdir().unwrap();
        fixture(temp.path());

        run_full(&context(temp.path(), Mode::Production)).await.unwrap();

        let expected: BTreeSet<PathBuf> = ["about.html", "css/site.css", "css/site.min.css"]
            .iter()
            .map(PathBuf::from)
            .collect();
        assert_eq!(output_files(temp.path()), expected);

        for file in ["css/site.css", "css/site.min.css"] {
            let css = fs::read_to_string(temp.path().join("dist").join(file)).unwrap();
            assert!(!css.contains("sourceMappingURL"));
        }
        let html = fs::read_to_string(temp.path().join("dist/about.html")).unwrap();
        assert_eq!(html, "<main><h1>About</h1></main>");
    }

    #[tokio::test]
    async fn development_build_annotates_styles() {
        let temp = tempdir().unwrap();
        fixture(temp.path());

        run_full(&context(temp.path(), Mode::Development)).await.unwrap();

        let css = fs::read_to_string(temp.path().join("dist/css/site.css")).unwrap();
        assert!(css.contains("sourceMappingURL"));
    }

    #[tokio::test]
    async fn rebuild_leaves_no_stale_files() {
        let temp = tempdir().unwrap();
        fixture(temp.path());
        fs::create_dir_all(temp.path().join("dist/css")).unwrap();
        fs::write(temp.path().join("dist/css/old.css"), "").unwrap();
        fs::write(temp.path().join("dist/removed.html"), "").unwrap();

        run_full(&context(temp.path(), Mode::Production)).await.unwrap();

        let files = output_files(temp.path());
        assert!(!files.contains(Path::new("css/old.css")));
        assert!(!files.contains(Path::new("removed.html")));
        assert_eq!(files.len(), 3);
    }

    #[tokio::test]
    async fn missing_registry_entry_fails_before_running() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("dist")).unwrap();
        let registry = PathRegistry::new(
            "dist",
            IndexMap::from([(Category::Styles, PathEntry::new(["src/sass/*.scss"], "dist/css"))]),
        );
        let ctx = TaskContext::new(temp.path(), Arc::new(registry), Mode::Production);

        let err = run_full(&ctx).await.unwrap_err();

        assert!(matches!(err, PipelineError::Config(_)));
        assert!(temp.path().join("dist").exists());
    }

    #[tokio::test]
    async fn single_task_runs_without_clean() {
        let temp = tempdir().unwrap();
        fixture(temp.path());
        fs::create_dir_all(temp.path().join("dist")).unwrap();
        fs::write(temp.path().join("dist/keep.txt"), "").unwrap();

        let report = run_single(single_task("styles").unwrap(), &context(temp.path(), Mode::Development))
            .await
            .unwrap();

        assert_eq!(report.written.len(), 2);
        assert!(temp.path().join("dist/keep.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unreadable_source_fails_the_build() {
        let temp = tempdir().unwrap();
        fixture(temp.path());
        std::os::unix::fs::symlink(
            temp.path().join("missing.scss"),
            temp.path().join("src/sass/gone.scss"),
        )
        .unwrap();

        let err = run_full(&context(temp.path(), Mode::Production)).await.unwrap_err();

        assert!(matches!(err, PipelineError::Task { task: "styles", .. }));
    }
}
