//! # vernis_croquis
//!
//! Croquis - The script analysis layer for Vernis.
//!
//! ## Name Origin
//!
//! **Croquis** (/kʁɔ.ki/) is a French term for a quick, sketchy drawing that captures
//! the essential features of a subject. `vernis_croquis` takes the same quick look at
//! the scripts embedded in templates: it reads what a block *declares* without ever
//! running it on the host.
//!
//! ## Purpose
//!
//! - **Sandbox**: evaluate a scoped script block in a restricted interpreter whose
//!   only window to the outside is the `exports` object, yielding [`ScriptMetadata`]
//! - **Transpile**: lower an entry snippet to a configured ECMAScript target
//! - **Minify**: whitespace-only printing that keeps every identifier intact
//!
//! ## Architecture
//!
//! ```text
//! template text
//!        ↓
//! vernis_atelier (extract <script data-scoped>)
//!        ↓
//! vernis_croquis (sandbox → metadata, transpile)  ← This crate
//!        ↓
//! vernis_atelier (script asset + loader fragment)
//! ```

pub mod sandbox;
pub mod transpile;

pub use sandbox::{evaluate_exports, SandboxError, ScriptMetadata};
pub use transpile::{check_target, minify_script, transpile, TranspileError, TranspileOptions};
