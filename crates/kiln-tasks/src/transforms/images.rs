//! Image optimization (production) or pass-through copy (development).

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::ImageFormat;
use rayon::prelude::*;
use regex::Regex;

use crate::registry::{Category, SourceFile};
use crate::task::{read_bytes, write_output, Task, TaskContext, TaskError, TaskReport};
use crate::transforms::display_name;

const JPEG_QUALITY: u8 = 70;

static XML_PROLOG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<\?xml[^>]*\?>").expect("Invalid xml prolog regex"));
static DOCTYPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<!DOCTYPE[^>]*>").expect("Invalid doctype regex"));
static COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("Invalid comment regex"));
static EMPTY_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\s+[A-Za-z_:][\w:.-]*=(?:""|'')"#).expect("Invalid empty attr regex"));
static BETWEEN_TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r">\s+<").expect("Invalid between tags regex"));

/// Copies images, re-encoding them with a fixed codec chain in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImagesTask;

enum Processed {
    Ready { output: PathBuf, bytes: Vec<u8> },
    Failed { name: String, message: String },
}

impl Task for ImagesTask {
    fn name(&self) -> &'static str {
        "images"
    }

    fn category(&self) -> Option<Category> {
        Some(Category::Images)
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let mut report = TaskReport::new(self.name());
        let out_dir = ctx.output_dir(Category::Images)?;
        let optimize = ctx.mode.is_production();

        let processed: Vec<Result<Processed, TaskError>> = ctx
            .sources(Category::Images)?
            .par_iter()
            .map(|source| process(source, &out_dir, optimize))
            .collect();

        for item in processed {
            match item? {
                Processed::Ready { output, bytes } => write_output(&mut report, output, bytes)?,
                Processed::Failed { name, message } => {
                    ctx.notifier.notify("Images", &format!("{}: {}", name, message));
                    report.failures += 1;
                }
            }
        }

        Ok(report)
    }
}

fn process(source: &SourceFile, out_dir: &Path, optimize: bool) -> Result<Processed, TaskError> {
    let original = read_bytes(&source.path)?;
    let output = out_dir.join(&source.relative);

    if !optimize {
        return Ok(Processed::Ready {
            output,
            bytes: original,
        });
    }

    let bytes = match optimize_bytes(&original, &source.path) {
        Ok(Some(optimized)) if optimized.len() < original.len() => optimized,
        Ok(_) => original,
        Err(message) => {
            return Ok(Processed::Failed {
                name: display_name(&source.path),
                message,
            })
        }
    };

    Ok(Processed::Ready { output, bytes })
}

/// Re-encode by file type. `None` means the type has no optimizer.
fn optimize_bytes(bytes: &[u8], path: &Path) -> Result<Option<Vec<u8>>, String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => {
            let img = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
                .map_err(|e| e.to_string())?;
            let mut out = Vec::new();
            img.write_with_encoder(JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY))
                .map_err(|e| e.to_string())?;
            Ok(Some(out))
        }
        "png" => {
            let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)
                .map_err(|e| e.to_string())?;
            let mut out = Vec::new();
            img.write_with_encoder(PngEncoder::new_with_quality(
                &mut out,
                CompressionType::Best,
                FilterType::Adaptive,
            ))
            .map_err(|e| e.to_string())?;
            Ok(Some(out))
        }
        "svg" => {
            let text = std::str::from_utf8(bytes).map_err(|e| e.to_string())?;
            Ok(Some(minify_svg(text).into_bytes()))
        }
        _ => Ok(None),
    }
}

/// Strip comments, prolog, doctype, empty attributes and inter-tag
/// whitespace. `viewBox` and ids are left alone.
pub(crate) fn minify_svg(svg: &str) -> String {
    let svg = XML_PROLOG.replace_all(svg, "");
    let svg = DOCTYPE.replace_all(&svg, "");
    let svg = COMMENT.replace_all(&svg, "");
    let svg = EMPTY_ATTR.replace_all(&svg, "");
    BETWEEN_TAGS.replace_all(svg.trim(), "><").into_owned()
}
