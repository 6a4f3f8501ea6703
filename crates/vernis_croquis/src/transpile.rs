//! Lowering and printing of entry snippets with OXC.
//!
//! Besides the OXC target names, `es5` is accepted. It selects the `es2015`
//! target plus arrow function lowering, which is the only ES2015 syntax OXC
//! lowers. `let`/`const`, template literals, classes and destructuring are
//! printed unchanged.

use std::path::Path;

use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{ArrowFunctionsOptions, TransformOptions, Transformer};

/// Options for [`transpile`].
#[derive(Debug, Clone)]
pub struct TranspileOptions {
    /// ECMAScript target, e.g. `es5` or `es2015`.
    pub target: String,
    /// Print without insignificant whitespace.
    pub minify: bool,
}

impl Default for TranspileOptions {
    fn default() -> Self {
        Self {
            target: ES5.to_string(),
            minify: false,
        }
    }
}

const ES5: &str = "es5";

/// Transpile failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranspileError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid target `{target}`: {message}")]
    Target { target: String, message: String },

    #[error("transform error: {0}")]
    Transform(String),
}

/// Validate a target name without transforming anything.
pub fn check_target(target: &str) -> Result<(), String> {
    transform_options(target).map(|_| ())
}

fn transform_options(target: &str) -> Result<TransformOptions, String> {
    if target.eq_ignore_ascii_case(ES5) {
        let mut options = TransformOptions::from_target("es2015")?;
        options.env.es2015.arrow_function = Some(ArrowFunctionsOptions::default());
        return Ok(options);
    }
    TransformOptions::from_target(target)
}

/// Lower `source` to the configured target and print it.
pub fn transpile(source: &str, options: &TranspileOptions) -> Result<String, TranspileError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::default()).parse();
    if ret.panicked || !ret.errors.is_empty() {
        return Err(TranspileError::Parse(join_errors(&ret.errors)));
    }
    let mut program = ret.program;

    let transform_options =
        transform_options(&options.target).map_err(|message| TranspileError::Target {
            target: options.target.clone(),
            message,
        })?;

    let semantic_ret = SemanticBuilder::new().build(&program);
    if !semantic_ret.errors.is_empty() {
        return Err(TranspileError::Parse(join_errors(&semantic_ret.errors)));
    }
    let scoping = semantic_ret.semantic.into_scoping();

    let transformed = Transformer::new(&allocator, Path::new(""), &transform_options)
        .build_with_scoping(scoping, &mut program);
    if !transformed.errors.is_empty() {
        return Err(TranspileError::Transform(join_errors(&transformed.errors)));
    }

    Ok(print(&program, options.minify))
}

/// Reprint `source` without insignificant whitespace.
///
/// Identifiers are never renamed, so the output keeps working when it is
/// concatenated with other fragments that reference its globals.
pub fn minify_script(source: &str) -> Result<String, TranspileError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::default()).parse();
    if ret.panicked || !ret.errors.is_empty() {
        return Err(TranspileError::Parse(join_errors(&ret.errors)));
    }
    Ok(print(&ret.program, true))
}

fn print(program: &oxc_ast::ast::Program<'_>, minify: bool) -> String {
    let options = if minify {
        CodegenOptions::minify()
    } else {
        CodegenOptions::default()
    };
    Codegen::new().with_options(options).build(program).code
}

fn join_errors<E: std::fmt::Display>(errors: &[E]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
