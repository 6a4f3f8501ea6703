//! Per-file compilation.
//!
//! Stages run in a fixed order on the body as it stands after the previous
//! stage: owned style, imported style, owned script, imported script. Then
//! loader includes are appended and the rewriter cleans the result.
//!
//! Nothing is written until every stage of a file has succeeded. Writes are
//! then flushed in the order assets, loader fragments, compiled output,
//! fingerprint record, so a recorded fingerprint always implies a complete
//! output set.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use vernis_carton::{normalize_path, to_slash};

use crate::asset::{AssetKind, AssetRef};
use crate::cache::{Fingerprint, FingerprintCache};
use crate::error::{CompileError, CompileErrorKind, CompileResult, ConfigError, StoreError};
use crate::extract::{canonical_target, count_blocks, find_block, remove_block, Block, BlockKind, ExtractedBlock};
use crate::loader::LoaderFragment;
use crate::options::CompileOptions;
use crate::rewrite::rewrite;
use crate::script::build_script;
use crate::store::BuildStore;
use crate::style::{compile_style, LightningStyleCompiler, StyleCompiler};

const STAGES: [BlockKind; 4] = [
    BlockKind::OwnedStyle,
    BlockKind::ImportedStyle,
    BlockKind::OwnedScript,
    BlockKind::ImportedScript,
];

/// A template handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path relative to the template root.
    pub path: PathBuf,
    /// `None` for entries without content, which are passed through.
    pub contents: Option<String>,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: Some(contents.into()),
        }
    }

    pub fn without_contents(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            contents: None,
        }
    }
}

/// Result of compiling one template.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledTemplate {
    pub relative_path: String,
    pub fingerprint: Fingerprint,
    pub code: String,
    /// Assets written or referenced by this compile. Empty on a cache hit.
    pub assets: Vec<AssetRef>,
    /// Style and script loaders. Empty on a cache hit.
    pub loaders: Vec<LoaderFragment>,
}

#[derive(Debug, Clone)]
pub enum CompileOutcome {
    /// The file had no content.
    Skipped,
    /// The fingerprint matched; `code` is the previous output.
    Cached(CompiledTemplate),
    Fresh(CompiledTemplate),
}

impl CompileOutcome {
    pub fn template(&self) -> Option<&CompiledTemplate> {
        match self {
            CompileOutcome::Skipped => None,
            CompileOutcome::Cached(t) | CompileOutcome::Fresh(t) => Some(t),
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, CompileOutcome::Fresh(_))
    }
}

/// Everything one compile wants to write.
struct Build {
    code: String,
    assets: Vec<AssetRef>,
    asset_contents: Vec<(PathBuf, String)>,
    loaders: Vec<LoaderFragment>,
}

/// The template compilation engine.
pub struct Atelier<S: BuildStore> {
    options: CompileOptions,
    store: S,
    cache: FingerprintCache,
    style_compiler: Box<dyn StyleCompiler>,
}

impl<S: BuildStore> Atelier<S> {
    /// Validate `options` and create an engine writing to `store`.
    pub fn new(options: CompileOptions, store: S) -> Result<Self, ConfigError> {
        options.validate()?;
        let cache = FingerprintCache::new(&options.template_dist);
        let style_compiler = Box::new(LightningStyleCompiler::with_dialects(
            options.style_dialects.clone(),
        ));
        Ok(Self {
            options,
            store,
            cache,
            style_compiler,
        })
    }

    /// Replace the style compiler.
    pub fn with_style_compiler(mut self, compiler: impl StyleCompiler + 'static) -> Self {
        self.style_compiler = Box::new(compiler);
        self
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Compile one template.
    pub fn compile(&mut self, file: &SourceFile) -> CompileResult<CompileOutcome> {
        let Some(text) = file.contents.as_deref() else {
            tracing::debug!(path = %file.path.display(), "no content, skipping");
            return Ok(CompileOutcome::Skipped);
        };

        let relative = normalize_path(&file.path);
        if !matches!(relative.components().next(), Some(Component::Normal(_))) {
            return Err(CompileError::new(
                &file.path,
                CompileErrorKind::OutsideTemplateRoot {
                    path: file.path.clone(),
                },
            ));
        }
        let fail = |kind: CompileErrorKind| CompileError::new(&relative, kind);

        let fingerprint = Fingerprint::compute(text, &self.options.version);
        let recompile = self
            .cache
            .should_recompile(&self.store, &relative, &fingerprint)
            .map_err(|e| fail(e.into()))?;

        if !recompile {
            let code = self
                .cache
                .load_previous_output(&self.store, &relative)
                .map_err(|e| fail(e.into()))?
                .ok_or_else(|| {
                    fail(CompileErrorKind::StaleCacheRead {
                        path: self.cache.output_path(&relative),
                    })
                })?;
            tracing::debug!(path = %relative.display(), "fingerprint unchanged");
            return Ok(CompileOutcome::Cached(CompiledTemplate {
                relative_path: to_slash(&relative),
                fingerprint,
                code,
                assets: Vec::new(),
                loaders: Vec::new(),
            }));
        }

        let build = self.build(&relative, text, &fingerprint).map_err(fail)?;
        self.flush(&relative, &fingerprint, &build)
            .map_err(|e| fail(e.into()))?;

        tracing::info!(
            path = %relative.display(),
            fingerprint = %fingerprint,
            assets = build.asset_contents.len(),
            "compiled template"
        );

        Ok(CompileOutcome::Fresh(CompiledTemplate {
            relative_path: to_slash(&relative),
            fingerprint,
            code: build.code,
            assets: build.assets,
            loaders: build.loaders,
        }))
    }

    fn build(
        &self,
        relative: &Path,
        text: &str,
        fingerprint: &Fingerprint,
    ) -> Result<Build, CompileErrorKind> {
        let options = &self.options;
        let mut body = text.to_string();
        let mut style_loader = LoaderFragment::new(relative, AssetKind::Style, options);
        let mut script_loader = LoaderFragment::new(relative, AssetKind::Script, options);
        let mut assets = Vec::new();
        let mut asset_contents = Vec::new();

        for kind in STAGES {
            let Some(found) = next_block(&body, kind, relative) else {
                continue;
            };

            match &found.block {
                Block::OwnedStyle {
                    dialect,
                    body: source,
                } => {
                    let asset = AssetRef::owned(AssetKind::Style, relative, options, fingerprint);
                    let css = compile_style(
                        self.style_compiler.as_ref(),
                        source,
                        dialect,
                        &asset.filename,
                        options.minify,
                    )?;
                    style_loader.add_owned(&asset.import_path, options);
                    asset_contents.push((asset.file_path.clone(), css));
                    assets.push(asset);
                }
                Block::OwnedScript { body: source } => {
                    let asset = AssetRef::owned(AssetKind::Script, relative, options, fingerprint);
                    let script = build_script(&self.store, options, source)?;
                    for required in &script.required {
                        script_loader.add_required(required, options);
                    }
                    script_loader.add_owned(&asset.import_path, options);
                    asset_contents.push((asset.file_path.clone(), script.contents));
                    assets.push(asset);
                }
                Block::ImportedStyle { target } => {
                    let target = self.resolve_target(target, relative)?;
                    style_loader.add_nested(&target, options);
                    assets.push(AssetRef::imported(AssetKind::Style, &target, options, fingerprint));
                }
                Block::ImportedScript { target } => {
                    let target = self.resolve_target(target, relative)?;
                    script_loader.add_nested(&target, options);
                    assets.push(AssetRef::imported(AssetKind::Script, &target, options, fingerprint));
                }
            }

            body = remove_block(&body, &found);
        }

        for loader in [&style_loader, &script_loader] {
            if loader.is_used() {
                body.push('\n');
                body.push_str(&loader.include_directive(options));
            }
        }

        Ok(Build {
            code: rewrite(&body),
            assets,
            asset_contents,
            loaders: vec![style_loader, script_loader],
        })
    }

    fn resolve_target(&self, target: &str, relative: &Path) -> Result<PathBuf, CompileErrorKind> {
        canonical_target(target, relative, &self.options.template_suffix).ok_or_else(|| {
            CompileErrorKind::OutsideTemplateRoot {
                path: PathBuf::from(target),
            }
        })
    }

    fn flush(
        &mut self,
        relative: &Path,
        fingerprint: &Fingerprint,
        build: &Build,
    ) -> Result<(), StoreError> {
        for (path, contents) in &build.asset_contents {
            self.store.write(path, contents)?;
        }
        for loader in &build.loaders {
            self.store.write(&loader.path, &loader.render())?;
        }
        self.store
            .write(&self.cache.output_path(relative), &build.code)?;
        self.cache.commit(&mut self.store, relative, fingerprint)
    }
}

/// First block of `kind`, warning when more are present.
fn next_block(body: &str, kind: BlockKind, relative: &Path) -> Option<ExtractedBlock> {
    let found = find_block(body, kind)?;
    let total = count_blocks(body, kind);
    if total > 1 {
        tracing::warn!(
            path = %relative.display(),
            block = kind.as_str(),
            ignored = total - 1,
            "only the first block of each kind is compiled"
        );
    }
    Some(found)
}
