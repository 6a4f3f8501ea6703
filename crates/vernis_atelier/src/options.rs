//! Compile options.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use vernis_carton::FxHashMap;

use crate::error::ConfigError;

/// Placeholder substituted in include directive templates.
pub const PATH_PLACEHOLDER: &str = "$path";

/// Placeholder substituted in the readiness wrapper.
pub const FN_PLACEHOLDER: &str = "$fn";

/// Options for one build run.
///
/// All paths are interpreted relative to the project root the store is
/// rooted at.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileOptions {
    /// Public directory for script assets, e.g. `js/views`.
    #[serde(default)]
    pub script_dist_path: String,

    /// Public directory for style assets, e.g. `css/views`.
    #[serde(default)]
    pub style_dist_path: String,

    /// Filesystem root the dist paths live under.
    #[serde(default = "default_public_root")]
    pub public_root: PathBuf,

    /// Root that template paths are relative to.
    #[serde(default = "default_template_root")]
    pub template_root: PathBuf,

    /// Root compiled templates, fingerprints and loaders are written to.
    #[serde(default = "default_template_dist")]
    pub template_dist: PathBuf,

    /// Template file suffix.
    #[serde(default = "default_template_suffix")]
    pub template_suffix: String,

    #[serde(default)]
    pub minify: bool,

    /// Build-version tag mixed into every fingerprint.
    #[serde(default)]
    pub version: String,

    /// Directive template for a style asset.
    #[serde(default = "default_style_include")]
    pub style_include: String,

    /// Directive template for a script asset.
    #[serde(default = "default_script_include")]
    pub script_include: String,

    /// Directive template that includes a loader fragment.
    #[serde(default = "default_loader_include")]
    pub loader_include: String,

    /// ECMAScript target for entry snippets.
    #[serde(default = "default_script_target")]
    pub script_target: String,

    /// Readiness registration wrapped around the `ready` callback.
    #[serde(default = "default_ready_wrapper")]
    pub ready_wrapper: String,

    /// External compiler command per style dialect. The block body is
    /// written to the command's stdin; stdout is the compiled CSS.
    #[serde(default)]
    pub style_dialects: FxHashMap<String, Vec<String>>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            script_dist_path: String::new(),
            style_dist_path: String::new(),
            public_root: default_public_root(),
            template_root: default_template_root(),
            template_dist: default_template_dist(),
            template_suffix: default_template_suffix(),
            minify: false,
            version: String::new(),
            style_include: default_style_include(),
            script_include: default_script_include(),
            loader_include: default_loader_include(),
            script_target: default_script_target(),
            ready_wrapper: default_ready_wrapper(),
            style_dialects: FxHashMap::default(),
        }
    }
}

impl CompileOptions {
    /// Options with both dist paths set and everything else defaulted.
    pub fn new(script_dist_path: impl Into<String>, style_dist_path: impl Into<String>) -> Self {
        Self {
            script_dist_path: script_dist_path.into(),
            style_dist_path: style_dist_path.into(),
            ..Default::default()
        }
    }

    /// Check everything that does not depend on a particular file.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.script_dist_path.trim().is_empty() {
            return Err(ConfigError::MissingScriptDist);
        }
        if self.style_dist_path.trim().is_empty() {
            return Err(ConfigError::MissingStyleDist);
        }

        let templates = [
            ("styleInclude", &self.style_include, PATH_PLACEHOLDER),
            ("scriptInclude", &self.script_include, PATH_PLACEHOLDER),
            ("loaderInclude", &self.loader_include, PATH_PLACEHOLDER),
            ("readyWrapper", &self.ready_wrapper, FN_PLACEHOLDER),
        ];
        for (option, template, placeholder) in templates {
            if !template.contains(placeholder) {
                return Err(ConfigError::MissingPlaceholder {
                    option,
                    placeholder,
                });
            }
        }

        vernis_croquis::check_target(&self.script_target).map_err(|message| {
            ConfigError::InvalidScriptTarget {
                target: self.script_target.clone(),
                message,
            }
        })
    }
}

/// Substitute the first occurrence of `placeholder` in a directive template.
pub fn render_template(template: &str, placeholder: &str, value: &str) -> String {
    template.replacen(placeholder, value, 1)
}

fn default_public_root() -> PathBuf {
    PathBuf::from("public")
}

fn default_template_root() -> PathBuf {
    PathBuf::from("resources/views")
}

fn default_template_dist() -> PathBuf {
    PathBuf::from("storage/vernis/views")
}

fn default_template_suffix() -> String {
    ".blade.php".to_string()
}

fn default_style_include() -> String {
    "@push('css')\n    <link href=\"{{ asset('$path') }}\" rel=\"stylesheet\" type=\"text/css\">\n@endpush"
        .to_string()
}

fn default_script_include() -> String {
    "@push('scripts')\n    <script src=\"{{ asset('$path') }}\"></script>\n@endpush".to_string()
}

fn default_loader_include() -> String {
    "@include('$path')".to_string()
}

fn default_script_target() -> String {
    "es5".to_string()
}

fn default_ready_wrapper() -> String {
    "$($fn);".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_json() {
        let options: CompileOptions =
            serde_json::from_str(r#"{"scriptDistPath":"js/v","styleDistPath":"css/v"}"#).unwrap();
        assert_eq!(options.template_root, PathBuf::from("resources/views"));
        assert_eq!(options.template_suffix, ".blade.php");
        assert_eq!(options.loader_include, "@include('$path')");
        assert!(!options.minify);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_missing_dist_paths() {
        let options = CompileOptions::new("", "css");
        assert!(matches!(options.validate(), Err(ConfigError::MissingScriptDist)));
        let options = CompileOptions::new("js", "  ");
        assert!(matches!(options.validate(), Err(ConfigError::MissingStyleDist)));
    }

    #[test]
    fn test_placeholder_is_required() {
        let mut options = CompileOptions::new("js", "css");
        options.loader_include = "@include('fixed')".to_string();
        let err = options.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "option `loaderInclude` must contain the `$path` placeholder"
        );
    }

    #[test]
    fn test_invalid_script_target() {
        let mut options = CompileOptions::new("js", "css");
        options.script_target = "es1999".to_string();
        assert!(matches!(
            options.validate(),
            Err(ConfigError::InvalidScriptTarget { .. })
        ));
    }

    #[test]
    fn test_render_template_first_occurrence() {
        assert_eq!(render_template("$path|$path", "$path", "a"), "a|$path");
    }

    #[test]
    fn test_style_dialects_from_json() {
        let options: CompileOptions = serde_json::from_str(
            r#"{"scriptDistPath":"js","styleDistPath":"css","styleDialects":{"less":["lessc","-"]}}"#,
        )
        .unwrap();
        assert_eq!(options.style_dialects["less"], vec!["lessc", "-"]);
    }
}
