//! Path registry: asset categories mapped to source globs and output directories.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::task::TaskError;

/// An asset category handled by exactly one transform task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Styles,
    Scripts,
    /// Static `.html`/`.php` pages copied as-is.
    #[serde(rename = "html")]
    Markup,
    /// Template pages compiled to HTML.
    #[serde(rename = "pug")]
    Templates,
    Images,
    Icons,
    Fonts,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Styles,
        Category::Scripts,
        Category::Markup,
        Category::Templates,
        Category::Images,
        Category::Icons,
        Category::Fonts,
    ];

    /// Key used in `kiln.toml`.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Styles => "styles",
            Category::Scripts => "scripts",
            Category::Markup => "html",
            Category::Templates => "pug",
            Category::Images => "images",
            Category::Icons => "icons",
            Category::Fonts => "fonts",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration errors, raised before any task runs.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No path registry entry for category '{0}'")]
    MissingEntry(Category),

    #[error("Category '{0}' has no source patterns")]
    EmptySources(Category),

    #[error("Invalid glob pattern '{pattern}': {message}")]
    InvalidGlob { pattern: String, message: String },
}

/// Source patterns and output directory for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    /// Glob patterns relative to the project directory; a leading `!` excludes.
    pub sources: Vec<String>,

    /// Output directory relative to the project directory.
    pub output: PathBuf,
}

impl PathEntry {
    pub fn new<S: Into<String>>(sources: impl IntoIterator<Item = S>, output: impl Into<PathBuf>) -> Self {
        Self {
            sources: sources.into_iter().map(Into::into).collect(),
            output: output.into(),
        }
    }
}

/// Immutable mapping of categories to their paths.
#[derive(Debug, Clone)]
pub struct PathRegistry {
    root: PathBuf,
    entries: IndexMap<Category, PathEntry>,
}

impl Default for PathRegistry {
    fn default() -> Self {
        let entries = IndexMap::from([
            (
                Category::Styles,
                PathEntry::new(["src/sass/**/*.{sass,scss}"], "dist/css"),
            ),
            (Category::Scripts, PathEntry::new(["src/js/main.js"], "dist/js")),
            (Category::Markup, PathEntry::new(["src/*.{html,php}"], "dist")),
            (
                Category::Templates,
                PathEntry::new(["src/pug/pages/*.pug"], "dist"),
            ),
            (
                Category::Images,
                PathEntry::new(["src/img/**/*.*", "!src/img/icons/*.svg"], "dist/img"),
            ),
            (Category::Icons, PathEntry::new(["src/img/icons/*.svg"], "dist/img")),
            (Category::Fonts, PathEntry::new(["src/fonts/**/*.ttf"], "dist/fonts")),
        ]);

        Self {
            root: PathBuf::from("dist"),
            entries,
        }
    }
}

impl PathRegistry {
    /// Create a registry from an explicit set of entries.
    pub fn new(root: impl Into<PathBuf>, entries: IndexMap<Category, PathEntry>) -> Self {
        Self {
            root: root.into(),
            entries,
        }
    }

    /// Start from the default table and replace the given root and entries.
    pub fn with_overrides(
        root: Option<PathBuf>,
        overrides: impl IntoIterator<Item = (Category, PathEntry)>,
    ) -> Result<Self, ConfigError> {
        let mut registry = Self::default();
        if let Some(root) = root {
            registry.root = root;
        }
        for (category, entry) in overrides {
            registry.entries.insert(category, entry);
        }
        registry.validate(&Category::ALL)?;
        Ok(registry)
    }

    /// Output root removed by the clean task and served by the dev server.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Look up the entry for a category.
    pub fn entry(&self, category: Category) -> Result<&PathEntry, ConfigError> {
        self.entries
            .get(&category)
            .ok_or(ConfigError::MissingEntry(category))
    }

    /// Output directory for a category.
    pub fn output(&self, category: Category) -> Result<&Path, ConfigError> {
        Ok(&self.entry(category)?.output)
    }

    /// Compile the source patterns of a category.
    pub fn sources(&self, category: Category) -> Result<SourceSet, ConfigError> {
        let entry = self.entry(category)?;
        if entry.sources.is_empty() {
            return Err(ConfigError::EmptySources(category));
        }
        SourceSet::new(entry.sources.as_slice())
    }

    /// Check that every category has an entry with valid patterns.
    pub fn validate(&self, categories: &[Category]) -> Result<(), ConfigError> {
        for category in categories {
            self.sources(*category)?;
        }
        Ok(())
    }

    /// Categories whose sources match a project-relative path.
    pub fn categories_for(&self, rel_path: &Path) -> Vec<Category> {
        self.entries
            .keys()
            .copied()
            .filter(|category| {
                self.sources(*category)
                    .map(|set| set.matches(rel_path))
                    .unwrap_or(false)
            })
            .collect()
    }
}

/// A source file matched by a [`SourceSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute (or project-joined) path to read from.
    pub path: PathBuf,

    /// Path below the glob base, used to place the output.
    pub relative: PathBuf,
}

#[derive(Debug, Clone)]
struct Include {
    base: PathBuf,
    matcher: GlobMatcher,
}

/// Compiled include/exclude patterns.
#[derive(Debug, Clone)]
pub struct SourceSet {
    includes: Vec<Include>,
    excludes: GlobSet,
}

impl SourceSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigError> {
        let mut includes = Vec::new();
        let mut excludes = GlobSetBuilder::new();

        for pattern in patterns {
            let pattern = pattern.as_ref();
            if let Some(negated) = pattern.strip_prefix('!') {
                excludes.add(
                    GlobBuilder::new(negated)
                        .literal_separator(true)
                        .build()
                        .map_err(|e| invalid_glob(negated, e))?,
                );
            } else {
                let matcher = GlobBuilder::new(pattern)
                    .literal_separator(true)
                    .build()
                    .map_err(|e| invalid_glob(pattern, e))?
                    .compile_matcher();
                includes.push(Include {
                    base: glob_base(pattern),
                    matcher,
                });
            }
        }

        let excludes = excludes
            .build()
            .map_err(|e| invalid_glob(&patterns_display(patterns), e))?;

        Ok(Self { includes, excludes })
    }

    /// Whether a project-relative path belongs to this set.
    pub fn matches(&self, rel_path: &Path) -> bool {
        !self.excludes.is_match(rel_path)
            && self.includes.iter().any(|inc| inc.matcher.is_match(rel_path))
    }

    /// Directories to watch for this set, relative to the project.
    pub fn bases(&self) -> Vec<PathBuf> {
        let mut bases: Vec<PathBuf> = self.includes.iter().map(|inc| inc.base.clone()).collect();
        bases.dedup();
        bases
    }

    /// List matching files below `project_dir`, sorted by path. Unreadable
    /// directories, broken links and link loops fail the listing.
    pub fn collect(&self, project_dir: &Path) -> Result<Vec<SourceFile>, TaskError> {
        let mut found = BTreeMap::new();

        for include in &self.includes {
            let base_dir = project_dir.join(&include.base);
            if !base_dir.exists() {
                continue;
            }

            for entry in WalkDir::new(&base_dir).follow_links(true) {
                let entry = entry.map_err(|e| walk_error(&base_dir, e))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path();
                let Ok(rel) = path.strip_prefix(project_dir) else {
                    continue;
                };
                if !include.matcher.is_match(rel) || self.excludes.is_match(rel) {
                    continue;
                }
                let relative = rel.strip_prefix(&include.base).unwrap_or(rel).to_path_buf();
                found.entry(path.to_path_buf()).or_insert(relative);
            }
        }

        Ok(found
            .into_iter()
            .map(|(path, relative)| SourceFile { path, relative })
            .collect())
    }
}

fn walk_error(base_dir: &Path, err: walkdir::Error) -> TaskError {
    let path = err.path().unwrap_or(base_dir).to_path_buf();
    TaskError::Io {
        path,
        source: err.into(),
    }
}

/// Literal directory prefix of a pattern (everything before the first glob
/// metacharacter). A pattern without metacharacters names a file, so its base
/// is the parent directory.
fn glob_base(pattern: &str) -> PathBuf {
    let mut base = PathBuf::new();
    let mut literal = true;

    for segment in pattern.split('/') {
        if segment.contains(['*', '?', '[', '{']) {
            literal = false;
            break;
        }
        base.push(segment);
    }

    if literal {
        base.pop();
    }
    base
}

fn invalid_glob(pattern: &str, err: globset::Error) -> ConfigError {
    ConfigError::InvalidGlob {
        pattern: pattern.to_string(),
        message: err.to_string(),
    }
}

fn patterns_display<S: AsRef<str>>(patterns: &[S]) -> String {
    patterns
        .iter()
        .map(|p| p.as_ref())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn default_table_covers_every_category() {
        let registry = PathRegistry::default();
        registry.validate(&Category::ALL).unwrap();
        assert_eq!(registry.root(), Path::new("dist"));
        assert_eq!(
            registry.output(Category::Styles).unwrap(),
            Path::new("dist/css")
        );
    }

    #[test]
    fn missing_entry_fails_validation() {
        let registry = PathRegistry::new(
            "dist",
            IndexMap::from([(Category::Styles, PathEntry::new(["src/*.scss"], "dist/css"))]),
        );
        let err = registry.validate(&[Category::Styles, Category::Fonts]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEntry(Category::Fonts)));
    }

    #[test]
    fn invalid_glob_is_config_error() {
        let err = PathRegistry::with_overrides(
            None,
            [(Category::Fonts, PathEntry::new(["src/{fonts"], "dist/fonts"))],
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidGlob { .. }));
    }

    #[test]
    fn computes_glob_base() {
        assert_eq!(glob_base("src/sass/**/*.scss"), PathBuf::from("src/sass"));
        assert_eq!(glob_base("src/*.{html,php}"), PathBuf::from("src"));
        assert_eq!(glob_base("src/js/main.js"), PathBuf::from("src/js"));
    }

    #[test]
    fn images_exclude_icons() {
        let registry = PathRegistry::default();
        let images = registry.sources(Category::Images).unwrap();

        assert!(images.matches(Path::new("src/img/photo.jpg")));
        assert!(images.matches(Path::new("src/img/nested/logo.png")));
        assert!(!images.matches(Path::new("src/img/icons/arrow.svg")));
        assert!(images.matches(Path::new("src/img/icons/readme.txt")));
    }

    #[test]
    fn star_does_not_cross_directories() {
        let registry = PathRegistry::default();
        let markup = registry.sources(Category::Markup).unwrap();

        assert!(markup.matches(Path::new("src/index.html")));
        assert!(markup.matches(Path::new("src/contact.php")));
        assert!(!markup.matches(Path::new("src/pug/index.html")));
    }

    #[test]
    fn routes_paths_to_categories() {
        let registry = PathRegistry::default();

        assert_eq!(
            registry.categories_for(Path::new("src/sass/main.scss")),
            vec![Category::Styles]
        );
        assert_eq!(
            registry.categories_for(Path::new("src/img/icons/arrow.svg")),
            vec![Category::Icons]
        );
        assert!(registry.categories_for(Path::new("README.md")).is_empty());
    }

    #[test]
    fn collects_files_relative_to_base() {
        let temp = tempdir().unwrap();
        let sass = temp.path().join("src/sass/blocks");
        fs::create_dir_all(&sass).unwrap();
        fs::write(temp.path().join("src/sass/main.scss"), "").unwrap();
        fs::write(sass.join("header.sass"), "").unwrap();
        fs::write(sass.join("notes.txt"), "").unwrap();

        let set = PathRegistry::default().sources(Category::Styles).unwrap();
        let files = set.collect(temp.path()).unwrap();
        let relative: Vec<_> = files.iter().map(|f| f.relative.clone()).collect();

        assert_eq!(
            relative,
            vec![PathBuf::from("blocks/header.sass"), PathBuf::from("main.scss")]
        );
    }

    #[cfg(unix)]
    #[test]
    fn broken_link_fails_the_listing() {
        let temp = tempdir().unwrap();
        let sass = temp.path().join("src/sass");
        fs::create_dir_all(&sass).unwrap();
        fs::write(sass.join("main.scss"), "").unwrap();
        std::os::unix::fs::symlink(temp.path().join("missing.scss"), sass.join("gone.scss")).unwrap();

        let set = PathRegistry::default().sources(Category::Styles).unwrap();
        let err = set.collect(temp.path()).unwrap_err();

        match err {
            TaskError::Io { path, .. } => assert!(path.ends_with("gone.scss")),
            other => panic!("expected an I/O error, got {other:?}"),
        }
    }
}
