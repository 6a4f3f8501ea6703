//! Script asset assembly.
//!
//! A scoped script block is evaluated in the sandbox; its metadata decides
//! what the compiled asset contains:
//!
//! ```text
//! include[0] contents
//! include[1] contents
//! ...
//! transpiled entry snippet   (init call, then ready registration)
//! ```

use std::path::Path;

use vernis_croquis::{evaluate_exports, minify_script, transpile, ScriptMetadata, TranspileOptions};

use crate::error::CompileErrorKind;
use crate::options::{render_template, CompileOptions, FN_PLACEHOLDER};
use crate::store::BuildStore;

/// A compiled script asset plus the external assets it requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptBuild {
    pub contents: String,
    /// Asset paths to include ahead of the compiled asset, in order.
    pub required: Vec<String>,
}

/// Call `init` immediately, then register `ready` through the wrapper.
pub fn entry_snippet(meta: &ScriptMetadata, ready_wrapper: &str) -> String {
    let mut snippet = String::new();
    if let Some(init) = &meta.init {
        snippet.push('(');
        snippet.push_str(init);
        snippet.push_str(")();\n\n");
    }
    if let Some(ready) = &meta.ready {
        snippet.push_str(&render_template(ready_wrapper, FN_PLACEHOLDER, ready));
    }
    snippet
}

/// Evaluate a scoped script block and assemble its asset.
pub fn build_script<S: BuildStore + ?Sized>(
    store: &S,
    options: &CompileOptions,
    source: &str,
) -> Result<ScriptBuild, CompileErrorKind> {
    let meta = evaluate_exports(source)?;

    let mut fragments = Vec::with_capacity(meta.include.len() + 1);
    for include in &meta.include {
        let path = Path::new(include);
        let code = store
            .read(path)?
            .ok_or_else(|| CompileErrorKind::IncludeRead {
                path: path.to_path_buf(),
            })?;
        let code = if options.minify {
            minify_script(&code)?
        } else {
            code
        };
        fragments.push(code);
    }

    let snippet = entry_snippet(&meta, &options.ready_wrapper);
    if !snippet.trim().is_empty() {
        let transpiled = transpile(
            &snippet,
            &TranspileOptions {
                target: options.script_target.clone(),
                minify: options.minify,
            },
        )?;
        fragments.push(transpiled);
    }

    tracing::debug!(
        includes = meta.include.len(),
        required = meta.required.len(),
        entry = meta.has_entry(),
        "assembled script asset"
    );

    Ok(ScriptBuild {
        contents: fragments.join("\n"),
        required: meta.required,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn options() -> CompileOptions {
        CompileOptions::new("js", "css")
    }

    #[test]
    fn test_entry_snippet_order() {
        let meta = ScriptMetadata {
            init: Some("function(){a()}".to_string()),
            ready: Some("function(){b()}".to_string()),
            ..Default::default()
        };
        insta::assert_snapshot!(entry_snippet(&meta, "$($fn);"), @r"
        (function(){a()})();

        $(function(){b()});
        ");
    }

    #[test]
    fn test_custom_ready_wrapper() {
        let meta = ScriptMetadata {
            ready: Some("() => go()".to_string()),
            ..Default::default()
        };
        assert_eq!(
            entry_snippet(&meta, "document.addEventListener('DOMContentLoaded', $fn);"),
            "document.addEventListener('DOMContentLoaded', () => go());"
        );
    }

    #[test]
    fn test_includes_precede_snippet() {
        let mut store = MemoryStore::new();
        store.insert("resources/js/a.js", "var a = 1;");
        store.insert("resources/js/b.js", "var b = 2;");

        let build = build_script(
            &store,
            &options(),
            r#"
            exports.include = ["resources/js/a.js", "resources/js/b.js"];
            exports.required = ["js/vendor/jquery.js"];
            exports.ready = function () { start(); };
            "#,
        )
        .unwrap();

        assert_eq!(build.required, vec!["js/vendor/jquery.js"]);
        let a = build.contents.find("var a = 1;").unwrap();
        let b = build.contents.find("var b = 2;").unwrap();
        let ready = build.contents.find("$(function").unwrap();
        assert!(a < b && b < ready, "{}", build.contents);
    }

    #[test]
    fn test_arrow_callbacks_are_lowered() {
        let store = MemoryStore::new();
        let build = build_script(&store, &options(), "exports.ready = () => { start(); };").unwrap();
        assert!(build.contents.starts_with("$(function"), "{}", build.contents);
        assert!(!build.contents.contains("=>"), "{}", build.contents);
    }

    #[test]
    fn test_empty_snippet_is_omitted() {
        let mut store = MemoryStore::new();
        store.insert("lib.js", "lib();");
        let build = build_script(&store, &options(), "exports.include = ['lib.js'];").unwrap();
        assert_eq!(build.contents, "lib();");
    }

    #[test]
    fn test_missing_include() {
        let store = MemoryStore::new();
        let err = build_script(&store, &options(), "exports.include = ['nope.js'];").unwrap_err();
        assert!(matches!(err, CompileErrorKind::IncludeRead { ref path } if path == Path::new("nope.js")));
    }

    #[test]
    fn test_sandbox_error_propagates() {
        let store = MemoryStore::new();
        let err = build_script(&store, &options(), "exports.include = [window.x];").unwrap_err();
        assert!(matches!(err, CompileErrorKind::Sandbox(_)));
    }

    #[test]
    fn test_minified_include() {
        let mut store = MemoryStore::new();
        store.insert("lib.js", "function   keep ( name ) {\n\n  return name ;\n}\n");
        let mut options = options();
        options.minify = true;
        let build = build_script(&store, &options, "exports.include = ['lib.js'];").unwrap();
        assert!(build.contents.contains("keep"));
        assert!(build.contents.contains("name"));
        assert!(!build.contents.contains("\n\n"));
    }
}
