//! Combines vector icons into a single `<symbol>` sprite.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;

use crate::registry::Category;
use crate::task::{read_string, write_output, Task, TaskContext, TaskError, TaskReport};
use crate::transforms::display_name;

/// File name of the combined sprite inside the icons output directory.
pub const SPRITE_NAME: &str = "sprite.svg";

static SVG_ROOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<svg\b([^>]*)>(.*)</svg>").expect("Invalid svg root regex"));
static VIEW_BOX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"viewBox\s*=\s*["']([^"']*)["']"#).expect("Invalid view box regex"));

#[derive(Debug, Default, Clone, Copy)]
pub struct SpriteTask;

impl Task for SpriteTask {
    fn name(&self) -> &'static str {
        "sprite"
    }

    fn category(&self) -> Option<Category> {
        Some(Category::Icons)
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let mut report = TaskReport::new(self.name());
        let out_dir = ctx.output_dir(Category::Icons)?;

        let mut symbols = Vec::new();
        for source in ctx.sources(Category::Icons)? {
            let svg = read_string(&source.path)?;
            let id = source
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();

            match symbol(&id, &svg) {
                Some(symbol) => symbols.push(symbol),
                None => {
                    ctx.notifier.notify(
                        "Sprite",
                        &format!("{}: no <svg> root element", display_name(&source.path)),
                    );
                    report.failures += 1;
                }
            }
        }

        if symbols.is_empty() {
            return Ok(report);
        }

        let mut sprite = String::from(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:xlink=\"http://www.w3.org/1999/xlink\" style=\"position:absolute;width:0;height:0\">\n",
        );
        for symbol in symbols {
            sprite.push_str(&symbol);
        }
        sprite.push_str("</svg>\n");

        write_output(&mut report, out_dir.join(SPRITE_NAME), sprite)?;
        Ok(report)
    }
}

/// Wrap the children of an icon's `<svg>` in a `<symbol>`.
fn symbol(id: &str, svg: &str) -> Option<String> {
    let caps = SVG_ROOT.captures(svg)?;
    let attrs = caps.get(1).map_or("", |m| m.as_str());
    let body = caps.get(2).map_or("", |m| m.as_str()).trim();

    let mut out = format!("  <symbol id=\"{}\"", id);
    if let Some(view_box) = VIEW_BOX.captures(attrs).and_then(|c| c.get(1)) {
        let _ = write!(out, " viewBox=\"{}\"", view_box.as_str());
    }
    let _ = writeln!(out, ">{}</symbol>", body);
    Some(out)
}
