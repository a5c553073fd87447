//! Template pages compiled to HTML with minijinja.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use minijinja::{context, path_loader, Environment};
use regex::Regex;

use crate::registry::Category;
use crate::task::{write_output, Task, TaskContext, TaskError, TaskReport};
use crate::transforms::{display_name, output_path};

static BETWEEN_TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r">\s+<").expect("Invalid between tags regex"));

/// Renders one HTML page per template in the pages directory.
///
/// Templates are loaded relative to the parent of the pages directory, so a
/// page can `{% extends "layouts/base.pug" %}` or include partials that live
/// next to `pages/`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplatesTask;

impl Task for TemplatesTask {
    fn name(&self) -> &'static str {
        "pug"
    }

    fn category(&self) -> Option<Category> {
        Some(Category::Templates)
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let mut report = TaskReport::new(self.name());
        let out_dir = ctx.output_dir(Category::Templates)?;
        let sources = ctx.registry.sources(Category::Templates)?;

        let Some(pages_dir) = sources.bases().into_iter().next() else {
            return Ok(report);
        };
        let pages_dir = ctx.project_dir.join(pages_dir);
        let loader_root = pages_dir.parent().unwrap_or(&pages_dir).to_path_buf();

        let mut env = Environment::new();
        env.set_loader(path_loader(&loader_root));
        env.set_keep_trailing_newline(true);

        for source in sources.collect(&ctx.project_dir)? {
            let name = template_name(&loader_root, &source.path);

            let rendered = env.get_template(&name).and_then(|tmpl| {
                tmpl.render(context! {
                    mode => ctx.mode.to_string(),
                    production => ctx.mode.is_production(),
                })
            });

            match rendered {
                Ok(html) => {
                    let html = if ctx.mode.is_production() {
                        compact_html(&html)
                    } else {
                        html
                    };
                    write_output(
                        &mut report,
                        output_path(&out_dir, &source.relative, "html"),
                        html,
                    )?;
                }
                Err(e) => {
                    ctx.notifier
                        .notify("Pug", &format!("{}: {:#}", display_name(&source.path), e));
                    report.failures += 1;
                }
            }
        }

        Ok(report)
    }
}

/// Loader-relative template name with forward slashes.
fn template_name(root: &Path, path: &Path) -> String {
    let relative: PathBuf = path.strip_prefix(root).unwrap_or(path).to_path_buf();
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Drop whitespace between tags.
fn compact_html(html: &str) -> String {
    BETWEEN_TAGS.replace_all(html.trim(), "><").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use crate::mode::Mode;
    use crate::notify::testing::RecordingNotifier;
    use crate::registry::PathRegistry;

    fn fixture(dir: &Path) {
        let pug = dir.join("src/pug");
        fs::create_dir_all(pug.join("pages")).unwrap();
        fs::create_dir_all(pug.join("layouts")).unwrap();
        fs::write(
            pug.join("layouts/base.pug"),
            "<html>\n  <body>\n    {% block body %}{% endblock %}\n  </body>\n</html>\n",
        )
        .unwrap();
        fs::write(
            pug.join("pages/index.pug"),
            "{% extends \"layouts/base.pug\" %}{% block body %}<h1>{{ mode }}</h1>{% endblock %}",
        )
        .unwrap();
    }

    #[test]
    fn renders_pages_with_layouts() {
        let temp = tempdir().unwrap();
        fixture(temp.path());

        let ctx = TaskContext::new(temp.path(), Arc::new(PathRegistry::default()), Mode::Development);
        let report = TemplatesTask.run(&ctx).unwrap();

        assert_eq!(report.written, vec![temp.path().join("dist/index.html")]);
        let html = fs::read_to_string(temp.path().join("dist/index.html")).unwrap();
        assert!(html.contains("<h1>development</h1>"));
        assert!(html.contains("\n  <body>"));
    }

    #[test]
    fn production_output_is_compact() {
        let temp = tempdir().unwrap();
        fixture(temp.path());

        let ctx = TaskContext::new(temp.path(), Arc::new(PathRegistry::default()), Mode::Production);
        TemplatesTask.run(&ctx).unwrap();

        let html = fs::read_to_string(temp.path().join("dist/index.html")).unwrap();
        assert_eq!(html, "<html><body><h1>production</h1></body></html>");
    }

    #[test]
    fn syntax_error_is_notified_and_other_pages_render() {
        let temp = tempdir().unwrap();
        fixture(temp.path());
        fs::write(temp.path().join("src/pug/pages/broken.pug"), "{% if %}").unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = TaskContext::new(temp.path(), Arc::new(PathRegistry::default()), Mode::Development)
            .with_notifier(notifier.clone());
        let report = TemplatesTask.run(&ctx).unwrap();

        assert_eq!(report.failures, 1);
        assert_eq!(notifier.titles(), vec!["Pug".to_string()]);
        assert!(temp.path().join("dist/index.html").exists());
        assert!(!temp.path().join("dist/broken.html").exists());
    }
}
