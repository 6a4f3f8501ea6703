//! # vernis_atelier
//!
//! Atelier - The template workshop for Vernis.
//!
//! ## Name Origin
//!
//! An **atelier** is an artist's workshop, where raw material is worked into
//! finished pieces. `vernis_atelier` takes raw templates, lifts the scoped
//! style and script blocks out of them, compiles those into standalone assets,
//! and hands back templates that pull the assets in through generated loader
//! fragments.
//!
//! ## Pipeline
//!
//! ```text
//! SourceFile
//!    ↓ fingerprint (skip when unchanged)
//! owned style → imported style → owned script → imported script
//!    ↓
//! loader includes appended, comments stripped
//!    ↓
//! assets → loaders → compiled template → fingerprint record
//! ```
//!
//! ## Example
//!
//! ```
//! use vernis_atelier::{Atelier, CompileOptions, CompileOutcome, MemoryStore, SourceFile};
//!
//! let options = CompileOptions::new("js/views", "css/views");
//! let mut atelier = Atelier::new(options, MemoryStore::new()).unwrap();
//!
//! let file = SourceFile::new("home.blade.php", "<h1>Hi</h1>\n<style data-scoped>h1{color:red}</style>");
//! let outcome = atelier.compile(&file).unwrap();
//!
//! let CompileOutcome::Fresh(template) = outcome else { unreachable!() };
//! assert_eq!(template.code, "<h1>Hi</h1>\n\n@include('home__style')");
//! ```

pub mod asset;
pub mod cache;
pub mod compile;
pub mod error;
pub mod extract;
pub mod loader;
pub mod options;
pub mod rewrite;
pub mod script;
pub mod store;
pub mod style;

pub use asset::{asset_filename, AssetKind, AssetRef};
pub use cache::{Fingerprint, FingerprintCache};
pub use compile::{Atelier, CompileOutcome, CompiledTemplate, SourceFile};
pub use error::{CompileError, CompileErrorKind, CompileResult, ConfigError, StoreError};
pub use loader::{loader_identifier, loader_path, LoaderFragment};
pub use options::CompileOptions;
pub use store::{BuildStore, FsStore, MemoryStore};
pub use style::{LightningStyleCompiler, StyleCompiler};
