//! Script entry compilation with oxc.

use std::path::Path;

use oxc_allocator::Allocator;
use oxc_ast::ast::Statement;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_syntax::es_target::ESTarget;
use oxc_transformer::{TransformOptions, Transformer};

use crate::mode::Mode;
use crate::registry::Category;
use crate::task::{read_string, write_output, Task, TaskContext, TaskError, TaskReport};
use crate::transforms::{display_name, output_path};

/// Syntax level scripts are lowered to. The minifier must not raise it again.
const TARGET: &str = "es2015";
const MINIFY_TARGET: ESTarget = ESTarget::ES2015;

/// Compiles the script entry point into `main.min.js`.
///
/// The entry must be a self-contained script. Module syntax (`import` and
/// `export`) cannot run from a classic `<script>` tag and nothing resolves
/// it here, so it is reported as a transform error and no file is written.
///
/// The entry goes through two stages. The bundling stage lowers syntax to
/// [`TARGET`] and minifies in production. The compression stage minifies
/// again but only runs in development. Both conditions are kept as they are
/// in existing builds.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptsTask;

impl Task for ScriptsTask {
    fn name(&self) -> &'static str {
        "scripts"
    }

    fn category(&self) -> Option<Category> {
        Some(Category::Scripts)
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let mut report = TaskReport::new(self.name());
        let out_dir = ctx.output_dir(Category::Scripts)?;

        for source in ctx.sources(Category::Scripts)? {
            let input = read_string(&source.path)?;

            let compiled = bundle(&input, &source.path, ctx.mode).and_then(|code| {
                if ctx.mode.is_development() {
                    compress(&code)
                } else {
                    Ok(code)
                }
            });

            match compiled {
                Ok(code) => write_output(
                    &mut report,
                    output_path(&out_dir, &source.relative, "min.js"),
                    code,
                )?,
                Err(message) => {
                    ctx.notifier.notify(
                        "Scripts",
                        &format!("{}: {}", display_name(&source.path), message),
                    );
                    report.failures += 1;
                }
            }
        }

        Ok(report)
    }
}

/// Parse, lower to [`TARGET`] and print. Minifies in production.
fn bundle(source: &str, path: &Path, mode: Mode) -> Result<String, String> {
    let allocator = Allocator::default();
    let source_type = SourceType::from_path(path).unwrap_or_else(|_| SourceType::mjs());

    let parsed = Parser::new(&allocator, source, source_type).parse();
    if parsed.panicked || !parsed.errors.is_empty() {
        return Err(join_errors(&parsed.errors));
    }
    let mut program = parsed.program;

    let module_syntax = module_statements(&program.body);
    if !module_syntax.is_empty() {
        return Err(format!(
            "module syntax cannot be bundled: {}",
            module_syntax.join(", ")
        ));
    }

    let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();
    let options = TransformOptions::from_target(TARGET)?;
    let transformed =
        Transformer::new(&allocator, path, &options).build_with_scoping(scoping, &mut program);
    if !transformed.errors.is_empty() {
        return Err(join_errors(&transformed.errors));
    }

    let minify = mode.is_production();
    let scoping = if minify {
        Minifier::new(minifier_options())
            .build(&allocator, &mut program)
            .scoping
    } else {
        None
    };

    Ok(Codegen::new()
        .with_options(CodegenOptions {
            minify,
            ..CodegenOptions::default()
        })
        .with_scoping(scoping)
        .build(&program)
        .code)
}

/// Whitespace removal and identifier mangling on already-lowered code.
fn compress(source: &str) -> Result<String, String> {
    let allocator = Allocator::default();

    let parsed = Parser::new(&allocator, source, SourceType::mjs()).parse();
    if parsed.panicked || !parsed.errors.is_empty() {
        return Err(join_errors(&parsed.errors));
    }
    let mut program = parsed.program;

    let minified = Minifier::new(minifier_options()).build(&allocator, &mut program);

    Ok(Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            ..CodegenOptions::default()
        })
        .with_scoping(minified.scoping)
        .build(&program)
        .code)
}

fn minifier_options() -> MinifierOptions {
    MinifierOptions {
        compress: Some(CompressOptions {
            target: MINIFY_TARGET,
            ..CompressOptions::default()
        }),
        ..MinifierOptions::default()
    }
}

/// Describe each top-level `import`/`export` statement.
fn module_statements(body: &[Statement<'_>]) -> Vec<String> {
    body.iter()
        .filter_map(|stmt| match stmt {
            Statement::ImportDeclaration(decl) => Some(format!("import '{}'", decl.source.value)),
            Statement::ExportAllDeclaration(decl) => {
                Some(format!("export * from '{}'", decl.source.value))
            }
            Statement::ExportNamedDeclaration(decl) => Some(match &decl.source {
                Some(source) => format!("export from '{}'", source.value),
                None => "export".to_string(),
            }),
            Statement::ExportDefaultDeclaration(_) => Some("export default".to_string()),
            _ => None,
        })
        .collect()
}

fn join_errors<E: std::fmt::Display>(errors: &[E]) -> String {
    if errors.is_empty() {
        return "parser aborted".to_string();
    }
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
