//! Carton - The artist's toolbox for Vernis.
//!
//! This crate provides the small foundational utilities shared by the Vernis
//! crates, much like a carton (artist's portfolio case) holds the essential
//! tools an artist reaches for while working.
//!
//! # Modules
//!
//! - **hash**: xxHash3 digests for fingerprints and content-derived asset names
//! - **path**: lexical path normalization and template-path helpers
//!
//! # Example
//!
//! ```
//! use vernis_carton::{digest_hex, to_slash};
//! use std::path::Path;
//!
//! let name = digest_hex(to_slash(Path::new("pages/home.blade.php")).as_bytes());
//! assert_eq!(name.len(), 32);
//! ```

pub mod hash;
pub mod path;

// Re-export rustc-hash for fast hash maps/sets
pub use rustc_hash::FxHashMap;

pub use hash::{digest_hex, hash_bytes, hash_to_hex};
pub use path::{dotted_identifier, normalize_path, strip_suffix, to_slash};
