//! Style compilation.
//!
//! Plain CSS passes through untouched; LightningCSS only sees it when the
//! build minifies. Other dialects are handed to an external compiler
//! configured per dialect. The call returns only after the compiler has
//! exited, so the asset content is complete before it is staged.

use std::io::Write as _;
use std::process::{Command, Stdio};

use lightningcss::printer::PrinterOptions;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, StyleSheet};
use vernis_carton::FxHashMap;

use crate::error::CompileErrorKind;
use crate::extract::DEFAULT_STYLE_DIALECT;

/// Compiles a style block body written in some dialect to CSS.
pub trait StyleCompiler {
    fn compile(&self, source: &str, dialect: &str, filename: &str) -> Result<String, String>;
}

/// Default style compiler.
#[derive(Debug, Clone, Default)]
pub struct LightningStyleCompiler {
    commands: FxHashMap<String, Vec<String>>,
}

impl LightningStyleCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `commands` (dialect -> argv) for non-CSS dialects.
    pub fn with_dialects(commands: FxHashMap<String, Vec<String>>) -> Self {
        let commands = commands
            .into_iter()
            .map(|(dialect, argv)| (dialect.to_ascii_lowercase(), argv))
            .collect();
        Self { commands }
    }
}

impl StyleCompiler for LightningStyleCompiler {
    fn compile(&self, source: &str, dialect: &str, _filename: &str) -> Result<String, String> {
        if let Some(argv) = self.commands.get(dialect) {
            return run_command(argv, source);
        }
        if dialect == DEFAULT_STYLE_DIALECT {
            return Ok(source.to_string());
        }
        Err(format!(
            "no compiler configured for dialect `{}` (add it to `styleDialects`)",
            dialect
        ))
    }
}

/// Compile a style block body and minify the result if requested.
pub fn compile_style(
    compiler: &dyn StyleCompiler,
    source: &str,
    dialect: &str,
    filename: &str,
    minify: bool,
) -> Result<String, CompileErrorKind> {
    let error = |message: String| CompileErrorKind::Style {
        dialect: dialect.to_string(),
        message,
    };

    let css = compiler.compile(source, dialect, filename).map_err(error)?;
    tracing::debug!(dialect, filename, bytes = css.len(), "compiled style block");

    if minify {
        minify_css(&css, filename).map_err(error)
    } else {
        Ok(css)
    }
}

/// Minify CSS with LightningCSS.
pub fn minify_css(css: &str, filename: &str) -> Result<String, String> {
    let parser_options = ParserOptions {
        filename: filename.to_string(),
        ..Default::default()
    };

    let mut stylesheet =
        StyleSheet::parse(css, parser_options).map_err(|e| format!("CSS parse error: {}", e))?;

    stylesheet
        .minify(MinifyOptions::default())
        .map_err(|e| format!("CSS minify error: {}", e))?;

    let printer_options = PrinterOptions {
        minify: true,
        ..Default::default()
    };

    stylesheet
        .to_css(printer_options)
        .map(|result| result.code)
        .map_err(|e| format!("CSS print error: {}", e))
}

/// Run `argv` with `input` on stdin and return its stdout.
fn run_command(argv: &[String], input: &str) -> Result<String, String> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| "empty compiler command".to_string())?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("failed to start `{}`: {}", program, e))?;

    let stdin = child.stdin.take();
    let output = std::thread::scope(|scope| {
        // stdin is fed while stdout is drained.
        let writer = scope.spawn(move || match stdin {
            Some(mut stdin) => stdin.write_all(input.as_bytes()),
            None => Ok(()),
        });
        let output = child.wait_with_output();
        let written = writer
            .join()
            .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));
        output.and_then(|output| written.map(|()| output))
    })
    .map_err(|e| format!("`{}` failed: {}", program, e))?;

    if !output.status.success() {
        return Err(format!(
            "`{}` exited with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    String::from_utf8(output.stdout).map_err(|e| format!("`{}` produced invalid UTF-8: {}", program, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_css_passes_through() {
        let compiler = LightningStyleCompiler::new();
        let css = compiler.compile("h1{color:#ff0000}", "css", "a.css").unwrap();
        assert_eq!(css, "h1{color:#ff0000}");
    }

    #[test]
    fn test_ie_hacks_survive_without_minify() {
        let compiler = LightningStyleCompiler::new();
        let body = "\n.clearfix { *zoom: 1; }\n.a { _height: 1px; }\n";
        let css = compile_style(&compiler, body, "css", "a.css", false).unwrap();
        assert_eq!(css, body);
    }

    #[test]
    fn test_minified_output() {
        let compiler = LightningStyleCompiler::new();
        let css = compile_style(&compiler, "h1 {\n  color: red;\n}\n", "css", "a.css", true).unwrap();
        assert_eq!(css, "h1{color:red}");
    }

    #[test]
    fn test_unconfigured_dialect() {
        let compiler = LightningStyleCompiler::new();
        let err = compile_style(&compiler, "@a: red;", "less", "a.less", false).unwrap_err();
        assert!(err.to_string().contains("styleDialects"), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn test_dialect_command_receives_stdin() {
        let mut commands = FxHashMap::default();
        commands.insert("Plain".to_string(), vec!["cat".to_string()]);
        let compiler = LightningStyleCompiler::with_dialects(commands);
        let css = compiler.compile("a { b: c }", "plain", "a.plain").unwrap();
        assert_eq!(css, "a { b: c }");
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_dialect_command() {
        let mut commands = FxHashMap::default();
        commands.insert("sass".to_string(), vec!["false".to_string()]);
        let compiler = LightningStyleCompiler::with_dialects(commands);
        assert!(compiler.compile("a{}", "sass", "a.sass").is_err());
    }
}
