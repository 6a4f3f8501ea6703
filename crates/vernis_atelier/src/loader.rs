//! Loader fragments.
//!
//! Every compiled template gets two generated fragments next to its output,
//! one per asset kind, which aggregate the include directives for that kind:
//!
//! ```text
//! <templateDist>/pages/home__style.blade.php     id: pages.home__style
//! <templateDist>/pages/home__script.blade.php    id: pages.home__script
//! ```
//!
//! Both are always written, possibly empty, so a template importing from this
//! one can include them whether or not anything was declared.

use std::path::{Path, PathBuf};

use serde::Serialize;
use vernis_carton::{dotted_identifier, strip_suffix, to_slash};

use crate::asset::AssetKind;
use crate::options::{render_template, CompileOptions, PATH_PLACEHOLDER};

/// Template path without its suffix, `/`-separated.
fn stem(relative: &Path, suffix: &str) -> String {
    strip_suffix(&to_slash(relative), suffix).to_string()
}

/// Dotted identifier of a template's loader fragment.
pub fn loader_identifier(relative: &Path, kind: AssetKind, suffix: &str) -> String {
    let mut id = dotted_identifier(&stem(relative, suffix));
    id.push_str(kind.loader_suffix());
    id
}

/// Where a template's loader fragment is written, relative to the project
/// root.
pub fn loader_path(relative: &Path, kind: AssetKind, options: &CompileOptions) -> PathBuf {
    let suffix = &options.template_suffix;
    let mut name = stem(relative, suffix);
    name.push_str(kind.loader_suffix());
    name.push_str(suffix);
    options.template_dist.join(name)
}

/// One loader fragment under construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderFragment {
    pub kind: AssetKind,
    pub identifier: String,
    pub path: PathBuf,
    nested: Vec<String>,
    required: Vec<String>,
    owned: Vec<String>,
}

impl LoaderFragment {
    pub fn new(owner: &Path, kind: AssetKind, options: &CompileOptions) -> Self {
        Self {
            kind,
            identifier: loader_identifier(owner, kind, &options.template_suffix),
            path: loader_path(owner, kind, options),
            nested: Vec::new(),
            required: Vec::new(),
            owned: Vec::new(),
        }
    }

    /// Include the same-kind loader of an imported template.
    pub fn add_nested(&mut self, target: &Path, options: &CompileOptions) {
        let id = loader_identifier(target, self.kind, &options.template_suffix);
        self.nested
            .push(render_template(&options.loader_include, PATH_PLACEHOLDER, &id));
    }

    /// Include an external asset the owned asset depends on.
    pub fn add_required(&mut self, import_path: &str, options: &CompileOptions) {
        let directive = self.asset_directive(import_path, options);
        self.required.push(directive);
    }

    /// Include the template's own compiled asset.
    pub fn add_owned(&mut self, import_path: &str, options: &CompileOptions) {
        let directive = self.asset_directive(import_path, options);
        self.owned.push(directive);
    }

    fn asset_directive(&self, import_path: &str, options: &CompileOptions) -> String {
        render_template(
            self.kind.include_template(options),
            PATH_PLACEHOLDER,
            import_path,
        )
    }

    /// Directives in emission order: nested loaders, required assets, then
    /// the owned asset.
    pub fn directives(&self) -> impl Iterator<Item = &str> {
        self.nested
            .iter()
            .chain(&self.required)
            .chain(&self.owned)
            .map(String::as_str)
    }

    /// Whether any block of this kind contributed to the fragment.
    pub fn is_used(&self) -> bool {
        self.directives().next().is_some()
    }

    pub fn render(&self) -> String {
        self.directives().collect::<Vec<_>>().join("\n")
    }

    /// Directive that includes this fragment from its owner.
    pub fn include_directive(&self, options: &CompileOptions) -> String {
        render_template(&options.loader_include, PATH_PLACEHOLDER, &self.identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> CompileOptions {
        let mut options = CompileOptions::new("js", "css");
        options.template_dist = PathBuf::from("dist");
        options.style_include = "<link href=\"$path\">".to_string();
        options.script_include = "<script src=\"$path\"></script>".to_string();
        options
    }

    #[test]
    fn test_identifier_and_path() {
        let options = options();
        let rel = Path::new("pages/home.blade.php");
        assert_eq!(
            loader_identifier(rel, AssetKind::Style, ".blade.php"),
            "pages.home__style"
        );
        assert_eq!(
            loader_path(rel, AssetKind::Script, &options),
            PathBuf::from("dist/pages/home__script.blade.php")
        );
    }

    #[test]
    fn test_empty_fragment() {
        let options = options();
        let loader = LoaderFragment::new(Path::new("a.blade.php"), AssetKind::Style, &options);
        assert!(!loader.is_used());
        assert_eq!(loader.render(), "");
        assert_eq!(loader.include_directive(&options), "@include('a__style')");
    }

    #[test]
    fn test_directive_order_is_independent_of_insertion() {
        let options = options();
        let mut loader =
            LoaderFragment::new(Path::new("pages/home.blade.php"), AssetKind::Script, &options);
        loader.add_owned("js/own.js?v=1", &options);
        loader.add_required("js/vendor/jquery.js", &options);
        loader.add_required("js/vendor/lodash.js", &options);
        loader.add_nested(Path::new("partials/nav.blade.php"), &options);

        insta::assert_snapshot!(loader.render(), @r#"
        @include('partials.nav__script')
        <script src="js/vendor/jquery.js"></script>
        <script src="js/vendor/lodash.js"></script>
        <script src="js/own.js?v=1"></script>
        "#);
    }
}
