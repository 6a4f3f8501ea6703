//! Error types for the template engine.

use std::path::PathBuf;

use vernis_croquis::{SandboxError, TranspileError};

/// Invalid configuration; fatal to the whole run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing `scriptDistPath` option")]
    MissingScriptDist,

    #[error("missing `styleDistPath` option")]
    MissingStyleDist,

    #[error("option `{option}` must contain the `{placeholder}` placeholder")]
    MissingPlaceholder {
        option: &'static str,
        placeholder: &'static str,
    },

    #[error("invalid `scriptTarget` `{target}`: {message}")]
    InvalidScriptTarget { target: String, message: String },
}

/// Build store failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A failure that aborts one file. Nothing of the file is written.
#[derive(Debug, thiserror::Error)]
#[error("{}: {kind}", .path.display())]
pub struct CompileError {
    /// Template path relative to the template root.
    pub path: PathBuf,
    pub kind: CompileErrorKind,
}

impl CompileError {
    pub fn new(path: impl Into<PathBuf>, kind: impl Into<CompileErrorKind>) -> Self {
        Self {
            path: path.into(),
            kind: kind.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompileErrorKind {
    /// The scoped script block failed to evaluate.
    #[error("script block: {0}")]
    Sandbox(#[from] SandboxError),

    /// A file listed in `exports.include` could not be read.
    #[error("cannot read include {}", .path.display())]
    IncludeRead { path: PathBuf },

    /// The fingerprint matched but the previous output is gone.
    #[error("fingerprint is current but {} is missing", .path.display())]
    StaleCacheRead { path: PathBuf },

    #[error("style block ({dialect}): {message}")]
    Style { dialect: String, message: String },

    #[error("script: {0}")]
    Transpile(#[from] TranspileError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A template or import target resolves outside the template root.
    #[error("{} is outside the template root", .path.display())]
    OutsideTemplateRoot { path: PathBuf },
}

pub type CompileResult<T> = Result<T, CompileError>;
