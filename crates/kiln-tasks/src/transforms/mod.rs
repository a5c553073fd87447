//! One transform task per asset category.

pub mod fonts;
pub mod images;
pub mod markup;
pub mod scripts;
pub mod sprite;
pub mod styles;
pub mod templates;

use std::path::{Path, PathBuf};

pub use fonts::FontsTask;
pub use images::ImagesTask;
pub use markup::MarkupTask;
pub use scripts::ScriptsTask;
pub use sprite::SpriteTask;
pub use styles::StylesTask;
pub use templates::TemplatesTask;

/// Output path for a source: `relative` placed below `dir` with its extension
/// replaced.
pub(crate) fn output_path(dir: &Path, relative: &Path, extension: &str) -> PathBuf {
    dir.join(relative).with_extension(extension)
}

/// Short display name for notifications.
pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
