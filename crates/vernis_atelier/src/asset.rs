//! Content-derived asset naming.
//!
//! An asset's filename depends only on the owning template's path relative
//! to the template root and the asset kind, so any file can compute the name
//! of another file's asset without reading it.

use std::path::{Path, PathBuf};

use serde::Serialize;
use vernis_carton::{digest_hex, to_slash};

use crate::cache::Fingerprint;
use crate::options::CompileOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Style,
    Script,
}

impl AssetKind {
    pub fn extension(self) -> &'static str {
        match self {
            AssetKind::Style => "css",
            AssetKind::Script => "js",
        }
    }

    /// Suffix that distinguishes a template's loader fragments.
    pub fn loader_suffix(self) -> &'static str {
        match self {
            AssetKind::Style => "__style",
            AssetKind::Script => "__script",
        }
    }

    pub fn dist_path(self, options: &CompileOptions) -> &str {
        match self {
            AssetKind::Style => &options.style_dist_path,
            AssetKind::Script => &options.script_dist_path,
        }
    }

    /// Directive template used to include an asset of this kind.
    pub fn include_template(self, options: &CompileOptions) -> &str {
        match self {
            AssetKind::Style => &options.style_include,
            AssetKind::Script => &options.script_include,
        }
    }
}

/// `digest(relative path) + extension`.
pub fn asset_filename(relative: &Path, kind: AssetKind) -> String {
    let mut name = digest_hex(to_slash(relative).as_bytes());
    name.push('.');
    name.push_str(kind.extension());
    name
}

/// A compiled asset referenced by a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRef {
    pub kind: AssetKind,
    /// Template that owns the asset, relative to the template root.
    pub owner: String,
    pub filename: String,
    /// Public path including the `?v=` fingerprint query.
    pub import_path: String,
    /// Where the asset lives, relative to the project root.
    pub file_path: PathBuf,
    /// Whether this compile wrote the asset, as opposed to referencing the
    /// asset of an imported template.
    pub owned: bool,
}

impl AssetRef {
    fn new(
        kind: AssetKind,
        owner: &Path,
        options: &CompileOptions,
        fingerprint: &Fingerprint,
        owned: bool,
    ) -> Self {
        let filename = asset_filename(owner, kind);
        let dist = kind.dist_path(options).trim_end_matches('/');
        let import_path = format!("{}/{}?v={}", dist, filename, fingerprint);
        let file_path = options.public_root.join(dist).join(&filename);

        Self {
            kind,
            owner: to_slash(owner),
            filename,
            import_path,
            file_path,
            owned,
        }
    }

    /// The asset of the template being compiled.
    pub fn owned(
        kind: AssetKind,
        owner: &Path,
        options: &CompileOptions,
        fingerprint: &Fingerprint,
    ) -> Self {
        Self::new(kind, owner, options, fingerprint, true)
    }

    /// The asset of an imported template. The query carries the importer's
    /// fingerprint.
    pub fn imported(
        kind: AssetKind,
        target: &Path,
        options: &CompileOptions,
        fingerprint: &Fingerprint,
    ) -> Self {
        Self::new(kind, target, options, fingerprint, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_depends_on_path_and_kind_only() {
        let rel = Path::new("pages/home.blade.php");
        let css = asset_filename(rel, AssetKind::Style);
        let js = asset_filename(rel, AssetKind::Script);
        assert!(css.ends_with(".css"));
        assert!(js.ends_with(".js"));
        assert_eq!(css.trim_end_matches(".css"), js.trim_end_matches(".js"));
        assert_eq!(css.len(), 32 + 4);
        assert_ne!(css, asset_filename(Path::new("pages/about.blade.php"), AssetKind::Style));
    }

    #[test]
    fn test_asset_ref_paths() {
        let options = CompileOptions::new("js/views/", "css/views");
        let fp = Fingerprint::compute("x", "");
        let rel = Path::new("home.blade.php");
        let asset = AssetRef::owned(AssetKind::Script, rel, &options, &fp);

        assert_eq!(
            asset.import_path,
            format!("js/views/{}?v={}", asset.filename, fp)
        );
        assert_eq!(
            asset.file_path,
            PathBuf::from("public/js/views").join(&asset.filename)
        );
        assert_eq!(asset.owner, "home.blade.php");
        assert!(asset.owned);
    }
}
