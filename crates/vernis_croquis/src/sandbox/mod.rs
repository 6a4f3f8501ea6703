//! Restricted evaluation of scoped script blocks.
//!
//! A scoped script block is author code whose only job is to *describe* the
//! asset it contributes: which external assets it needs, which files are
//! concatenated in front of it, and which callbacks run at load time. The
//! block is parsed with OXC and evaluated by a small interpreter covering the
//! ES5-era statements, operators and array/string methods such blocks use.
//! The interpreter has no host globals apart from `exports`, owns all of its
//! state, and stops with an error once a block exceeds its step, call depth
//! or size limits.
//!
//! ```
//! use vernis_croquis::evaluate_exports;
//!
//! let meta = evaluate_exports(
//!     r#"
//!     exports.required = ["js/vendor/jquery.js"];
//!     exports.include.push("resources/js/widgets.js");
//!     exports.ready = function () { initWidgets(); };
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(meta.required, vec!["js/vendor/jquery.js"]);
//! assert_eq!(meta.include, vec!["resources/js/widgets.js"]);
//! assert!(meta.ready.unwrap().starts_with("function ()"));
//! ```

mod builtins;
mod interpreter;
mod value;

use oxc_allocator::Allocator;
use oxc_parser::Parser;
use oxc_span::SourceType;

pub use value::Value;

use interpreter::Interpreter;

/// Metadata harvested from the `exports` object of a scoped script block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptMetadata {
    /// Asset import paths included ahead of the compiled entry point.
    pub required: Vec<String>,
    /// Filesystem paths concatenated verbatim ahead of the entry snippet.
    pub include: Vec<String>,
    /// Source of the load-time callback.
    pub init: Option<String>,
    /// Source of the callback bound to the host readiness event.
    pub ready: Option<String>,
}

impl ScriptMetadata {
    /// Whether evaluation produced an entry snippet at all.
    pub fn has_entry(&self) -> bool {
        self.init.is_some() || self.ready.is_some()
    }
}

/// Failure while evaluating a script block.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SandboxError {
    /// The block is not valid JavaScript.
    #[error("SyntaxError: {0}")]
    Syntax(String),

    /// The block threw.
    #[error("Uncaught {0}")]
    Thrown(String),

    /// A name outside the sandbox was read.
    #[error("ReferenceError: {0} is not defined")]
    Reference(String),

    /// An operation on a value of the wrong shape.
    #[error("TypeError: {0}")]
    Type(String),

    /// A value exceeded a length or depth limit.
    #[error("RangeError: {0}")]
    Range(String),

    /// The block ran for too long.
    #[error("evaluation exceeded {0} steps")]
    StepLimit(u64),

    /// A construct the restricted interpreter does not evaluate.
    #[error("unsupported {construct} at offset {offset}")]
    Unsupported { construct: String, offset: u32 },
}

impl SandboxError {
    /// Message a `catch` clause binds, for errors script code may catch.
    pub(crate) fn caught_value(&self) -> Option<String> {
        match self {
            SandboxError::Thrown(value) => Some(value.clone()),
            SandboxError::Reference(_) | SandboxError::Type(_) | SandboxError::Range(_) => {
                Some(self.to_string())
            }
            _ => None,
        }
    }
}

/// Evaluate a script block and collect what it assigned to `exports`.
///
/// Shapes other than the documented ones are ignored: a non-array `include`
/// contributes nothing, non-string entries are skipped, and a non-function
/// `init` is treated as absent.
pub fn evaluate_exports(source: &str) -> Result<ScriptMetadata, SandboxError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::default()).parse();

    if ret.panicked || !ret.errors.is_empty() {
        let message = ret
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(SandboxError::Syntax(message));
    }

    let mut interpreter = Interpreter::new(source);
    interpreter.run(&ret.program.body)?;
    let exports = interpreter.into_exports();

    let meta = ScriptMetadata {
        required: string_list(&exports.get("required")),
        include: string_list(&exports.get("include")),
        init: function_source(&exports.get("init")),
        ready: function_source(&exports.get("ready"))
            .or_else(|| function_source(&exports.get("main"))),
    };

    tracing::debug!(
        required = meta.required.len(),
        include = meta.include.len(),
        init = meta.init.is_some(),
        ready = meta.ready.is_some(),
        "evaluated script exports"
    );

    Ok(meta)
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .borrow()
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn function_source(value: &Value) -> Option<String> {
    match value {
        Value::Function(function) => Some(function.source().to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_block_yields_defaults() {
        let meta = evaluate_exports("").unwrap();
        assert_eq!(meta, ScriptMetadata::default());
        assert!(!meta.has_entry());
    }

    #[test]
    fn test_ready_function_source_is_verbatim() {
        let meta = evaluate_exports("exports.ready=function(){};").unwrap();
        assert_eq!(meta.ready.as_deref(), Some("function(){}"));
        assert_eq!(meta.init, None);
    }

    #[test]
    fn test_main_is_accepted_as_ready() {
        let meta = evaluate_exports("exports.main = () => go();").unwrap();
        assert_eq!(meta.ready.as_deref(), Some("() => go()"));
    }

    #[test]
    fn test_ready_wins_over_main() {
        let meta =
            evaluate_exports("exports.main = () => a(); exports.ready = () => b();").unwrap();
        assert_eq!(meta.ready.as_deref(), Some("() => b()"));
    }

    #[test]
    fn test_other_shapes_are_ignored() {
        let meta = evaluate_exports(
            r#"
            exports.required = "not-a-list";
            exports.include = ["a.js", 3, null, "b.js"];
            exports.init = 42;
            exports.extra = { anything: true };
            "#,
        )
        .unwrap();
        assert!(meta.required.is_empty());
        assert_eq!(meta.include, vec!["a.js", "b.js"]);
        assert_eq!(meta.init, None);
    }

    #[test]
    fn test_syntax_error() {
        let err = evaluate_exports("exports.init = function( {").unwrap_err();
        assert!(matches!(err, SandboxError::Syntax(_)));
    }

    #[test]
    fn test_host_globals_are_not_reachable() {
        let err = evaluate_exports("exports.include = [process.cwd()];").unwrap_err();
        assert_eq!(err, SandboxError::Reference("process".to_string()));

        let err = evaluate_exports("require('fs');").unwrap_err();
        assert_eq!(err, SandboxError::Reference("require".to_string()));
    }

    #[test]
    fn test_limit_errors_are_not_catchable() {
        let err = evaluate_exports("try { for (;;) {} } catch (e) { exports.include.push('x'); }")
            .unwrap_err();
        assert_eq!(err, SandboxError::StepLimit(1_000_000));
    }

    #[test]
    fn test_thrown_error_is_reported() {
        let err = evaluate_exports("throw new Error('boom');").unwrap_err();
        assert_eq!(err, SandboxError::Thrown("Error: boom".to_string()));
        assert_eq!(err.to_string(), "Uncaught Error: boom");
    }
}
