//! Sass/SCSS compilation with a minified companion file.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use grass::{InputSyntax, OutputStyle};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use parcel_sourcemap::SourceMap;

use crate::mode::Mode;
use crate::registry::Category;
use crate::task::{read_string, write_output, Task, TaskContext, TaskError, TaskReport};
use crate::transforms::{display_name, output_path};

/// Compiles stylesheets to `<name>.css` and `<name>.min.css`.
///
/// Files whose name starts with `_` are partials: they are only reachable
/// through `@use`/`@import` and produce no output of their own. Development
/// output carries an inline source map comment. The map covers the compiled
/// CSS only, so its source is named `<name>.css`, not the Sass file.
#[derive(Debug, Default, Clone, Copy)]
pub struct StylesTask;

impl Task for StylesTask {
    fn name(&self) -> &'static str {
        "styles"
    }

    fn category(&self) -> Option<Category> {
        Some(Category::Styles)
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let mut report = TaskReport::new(self.name());
        let out_dir = ctx.output_dir(Category::Styles)?;

        for source in ctx.sources(Category::Styles)? {
            if is_partial(&source.path) {
                continue;
            }

            let input = read_string(&source.path)?;
            let name = display_name(&source.path.with_extension("css"));

            let outputs = compile(&input, &source.path)
                .and_then(|css| {
                    let expanded = print_css(&css, &name, false, ctx.mode)?;
                    let minified = print_css(&css, &name, true, ctx.mode)?;
                    Ok((expanded, minified))
                });

            match outputs {
                Ok((expanded, minified)) => {
                    write_output(
                        &mut report,
                        output_path(&out_dir, &source.relative, "css"),
                        expanded,
                    )?;
                    write_output(
                        &mut report,
                        output_path(&out_dir, &source.relative, "min.css"),
                        minified,
                    )?;
                }
                Err(message) => {
                    ctx.notifier.notify("Sass", &format!("{}: {}", name, message));
                    report.failures += 1;
                }
            }
        }

        Ok(report)
    }
}

fn is_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('_'))
}

/// Compile Sass or SCSS source with imports resolved next to the file.
fn compile(input: &str, path: &Path) -> Result<String, String> {
    let syntax = match path.extension().and_then(|e| e.to_str()) {
        Some("sass") => InputSyntax::Sass,
        _ => InputSyntax::Scss,
    };

    let mut options = grass::Options::default()
        .style(OutputStyle::Expanded)
        .input_syntax(syntax);
    if let Some(dir) = path.parent() {
        options = options.load_path(dir);
    }

    grass::from_string(input.to_string(), &options).map_err(|e| e.to_string())
}

/// Print CSS through lightningcss, minified or not, with an inline source map
/// in development.
fn print_css(css: &str, filename: &str, minify: bool, mode: Mode) -> Result<String, String> {
    let mut stylesheet = StyleSheet::parse(
        css,
        ParserOptions {
            filename: filename.to_string(),
            ..ParserOptions::default()
        },
    )
    .map_err(|e| format!("CSS parse error: {}", e))?;

    if minify {
        stylesheet
            .minify(MinifyOptions::default())
            .map_err(|e| format!("CSS minify error: {}", e))?;
    }

    let mut source_map = if mode.is_development() {
        let mut map = SourceMap::new("/");
        map.add_source(filename);
        map.set_source_content(0, css)
            .map_err(|e| format!("Source map error: {:?}", e))?;
        Some(map)
    } else {
        None
    };

    let printed = stylesheet
        .to_css(PrinterOptions {
            minify,
            source_map: source_map.as_mut(),
            ..PrinterOptions::default()
        })
        .map_err(|e| format!("CSS print error: {}", e))?;

    let mut code = printed.code;
    if let Some(mut map) = source_map {
        let json = map
            .to_json(None)
            .map_err(|e| format!("Source map error: {:?}", e))?;
        code.push_str(&format!(
            "\n/*# sourceMappingURL=data:application/json;charset=utf-8;base64,{} */\n",
            STANDARD.encode(json)
        ));
    }

    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;

    use tempfile::tempdir;

    use crate::notify::testing::RecordingNotifier;
    use crate::registry::PathRegistry;

    fn fixture(dir: &Path) {
        let sass = dir.join("src/sass");
        fs::create_dir_all(&sass).unwrap();
        fs::write(sass.join("_vars.scss"), "$brand: #ff0000;\n").unwrap();
        fs::write(
            sass.join("main.scss"),
            "@import 'vars';\n.button {\n  color: $brand;\n  .icon { padding: 10px; }\n}\n",
        )
        .unwrap();
    }

    fn run(dir: &Path, mode: Mode) -> TaskReport {
        let ctx = TaskContext::new(dir, Arc::new(PathRegistry::default()), mode);
        StylesTask.run(&ctx).unwrap()
    }

    #[test]
    fn writes_plain_and_minified_copies() {
        let temp = tempdir().unwrap();
        fixture(temp.path());

        let report = run(temp.path(), Mode::Production);

        let css_dir = temp.path().join("dist/css");
        assert_eq!(
            report.written,
            vec![css_dir.join("main.css"), css_dir.join("main.min.css")]
        );
        assert!(!css_dir.join("_vars.css").exists());

        let css = fs::read_to_string(css_dir.join("main.css")).unwrap();
        assert!(css.contains(".button .icon"));
        let min = fs::read_to_string(css_dir.join("main.min.css")).unwrap();
        assert!(min.contains(".button{color:red}"));
        assert!(!min.contains('\n'));
    }

    #[test]
    fn source_maps_only_in_development() {
        let temp = tempdir().unwrap();
        fixture(temp.path());
        let css_dir = temp.path().join("dist/css");

        run(temp.path(), Mode::Development);
        for file in ["main.css", "main.min.css"] {
            let css = fs::read_to_string(css_dir.join(file)).unwrap();
            assert!(css.contains("sourceMappingURL=data:application/json"), "{file}");
        }

        run(temp.path(), Mode::Production);
        for file in ["main.css", "main.min.css"] {
            let css = fs::read_to_string(css_dir.join(file)).unwrap();
            assert!(!css.contains("sourceMappingURL"), "{file}");
        }
    }

    #[test]
    fn source_map_names_the_compiled_css() {
        let temp = tempdir().unwrap();
        fixture(temp.path());

        run(temp.path(), Mode::Development);

        let css = fs::read_to_string(temp.path().join("dist/css/main.css")).unwrap();
        let encoded = css
            .split("base64,")
            .nth(1)
            .and_then(|rest| rest.split(" */").next())
            .unwrap();
        let map = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();

        assert!(map.contains("\"main.css\""), "{map}");
        assert!(!map.contains("main.scss"), "{map}");
    }

    #[test]
    fn compiles_indented_syntax() {
        let temp = tempdir().unwrap();
        let sass = temp.path().join("src/sass/blocks");
        fs::create_dir_all(&sass).unwrap();
        fs::write(sass.join("nav.sass"), ".nav\n  margin: 0\n").unwrap();

        run(temp.path(), Mode::Production);

        let css = fs::read_to_string(temp.path().join("dist/css/blocks/nav.css")).unwrap();
        assert!(css.contains(".nav"));
        assert!(temp.path().join("dist/css/blocks/nav.min.css").exists());
    }

    #[test]
    fn malformed_stylesheet_is_notified() {
        let temp = tempdir().unwrap();
        fixture(temp.path());
        fs::write(temp.path().join("src/sass/broken.scss"), ".a { color: $missing; }").unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = TaskContext::new(temp.path(), Arc::new(PathRegistry::default()), Mode::Development)
            .with_notifier(notifier.clone());
        let report = StylesTask.run(&ctx).unwrap();

        assert_eq!(report.failures, 1);
        assert_eq!(notifier.titles(), vec!["Sass".to_string()]);
        assert!(temp.path().join("dist/css/main.css").exists());
        assert!(!temp.path().join("dist/css/broken.css").exists());
    }
}
