//! Configuration file loading for vernis.
//!
//! Reads `vernis.config.json` from the project root. Every key of
//! [`CompileOptions`] is accepted at the top level:
//!
//! ```json
//! {
//!   "scriptDistPath": "js/views",
//!   "styleDistPath": "css/views",
//!   "minify": true,
//!   "styleDialects": { "less": ["lessc", "-"] }
//! }
//! ```

use serde::Deserialize;
use std::path::Path;
use vernis_atelier::CompileOptions;

pub const CONFIG_FILE: &str = "vernis.config.json";

/// Top-level vernis configuration.
#[derive(Debug, Default, Deserialize)]
pub struct VernisConfig {
    /// JSON Schema reference (for editor autocompletion).
    #[serde(rename = "$schema", default)]
    #[allow(dead_code)]
    pub schema: Option<String>,

    #[serde(flatten)]
    pub compile: CompileOptions,
}

/// Load the config at `path`. A missing file yields the defaults, which
/// leave both dist paths unset.
pub fn load_config(path: &Path) -> Result<VernisConfig, String> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(VernisConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
}
