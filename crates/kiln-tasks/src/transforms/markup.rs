//! Static pages copied into the output root.

use crate::registry::Category;
use crate::task::{read_bytes, write_output, Task, TaskContext, TaskError, TaskReport};

/// Copies `.html`/`.php` pages verbatim.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkupTask;

impl Task for MarkupTask {
    fn name(&self) -> &'static str {
        "html"
    }

    fn category(&self) -> Option<Category> {
        Some(Category::Markup)
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let mut report = TaskReport::new(self.name());
        let out_dir = ctx.output_dir(Category::Markup)?;

        for source in ctx.sources(Category::Markup)? {
            let bytes = read_bytes(&source.path)?;
            write_output(&mut report, out_dir.join(&source.relative), bytes)?;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;

    use tempfile::tempdir;

    use crate::mode::Mode;
    use crate::registry::PathRegistry;

    #[test]
    fn copies_pages_to_root() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/index.html"), "<p>hi</p>").unwrap();
        fs::write(temp.path().join("src/mail.php"), "<?php ?>").unwrap();
        fs::write(temp.path().join("src/notes.md"), "# no").unwrap();

        let ctx = TaskContext::new(temp.path(), Arc::new(PathRegistry::default()), Mode::Development);
        let report = MarkupTask.run(&ctx).unwrap();

        assert_eq!(report.written.len(), 2);
        assert_eq!(
            fs::read_to_string(temp.path().join("dist/index.html")).unwrap(),
            "<p>hi</p>"
        );
        assert!(temp.path().join("dist/mail.php").exists());
        assert!(!temp.path().join("dist/notes.md").exists());
    }
}
