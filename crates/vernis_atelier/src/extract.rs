//! Structural detection of scoped and imported blocks.
//!
//! Blocks are found with patterns, not by parsing the template language:
//!
//! ```text
//! <style data-scoped lang="less"> ... </style>     owned style
//! <style data-import="partials/nav"></style>       imported style
//! <script data-scoped> ... </script>               owned script
//! <script data-import="partials/nav"></script>     imported script
//! ```
//!
//! The legacy markers `data-inside` (owned) and `data-same` (imported) are
//! accepted too. Only the first block of each kind is recognized.

use std::ops::Range;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use vernis_carton::normalize_path;

static OWNED_STYLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<style\b([^>]*\bdata-(?:scoped|inside)\b[^>]*)>(.*?)</style\s*>")
        .expect("valid owned style pattern")
});

static IMPORTED_STYLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<style\b[^>]*\bdata-(?:import|same)\s*=\s*["']([^"']*)["'][^>]*>\s*</style\s*>"#)
        .expect("valid imported style pattern")
});

static OWNED_SCRIPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b([^>]*\bdata-(?:scoped|inside)\b[^>]*)>(.*?)</script\s*>")
        .expect("valid owned script pattern")
});

static IMPORTED_SCRIPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<script\b[^>]*\bdata-(?:import|same)\s*=\s*["']([^"']*)["'][^>]*>\s*</script\s*>"#)
        .expect("valid imported script pattern")
});

static LANG_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\blang\s*=\s*["']([^"']+)["']"#).expect("valid lang pattern")
});

static SCOPED_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bdata-(?:scoped|inside)\s*=\s*["']([^"']+)["']"#)
        .expect("valid scoped value pattern")
});

/// Dialect of a style block that declares none.
pub const DEFAULT_STYLE_DIALECT: &str = "css";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    OwnedStyle,
    ImportedStyle,
    OwnedScript,
    ImportedScript,
}

impl BlockKind {
    fn pattern(self) -> &'static Regex {
        match self {
            BlockKind::OwnedStyle => &OWNED_STYLE,
            BlockKind::ImportedStyle => &IMPORTED_STYLE,
            BlockKind::OwnedScript => &OWNED_SCRIPT,
            BlockKind::ImportedScript => &IMPORTED_SCRIPT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BlockKind::OwnedStyle => "owned style",
            BlockKind::ImportedStyle => "imported style",
            BlockKind::OwnedScript => "owned script",
            BlockKind::ImportedScript => "imported script",
        }
    }
}

/// A recognized block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    OwnedStyle {
        dialect: String,
        body: String,
    },
    ImportedStyle {
        target: String,
    },
    OwnedScript {
        body: String,
    },
    ImportedScript {
        target: String,
    },
}

/// A block together with the byte range it occupies in the body it was
/// found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedBlock {
    pub block: Block,
    pub range: Range<usize>,
}

/// Find the first block of `kind` in `body`.
pub fn find_block(body: &str, kind: BlockKind) -> Option<ExtractedBlock> {
    let caps = kind.pattern().captures(body)?;
    let whole = caps.get(0)?;
    let first = caps.get(1).map_or("", |m| m.as_str());

    let block = match kind {
        BlockKind::OwnedStyle => Block::OwnedStyle {
            dialect: style_dialect(first),
            body: caps.get(2).map_or("", |m| m.as_str()).to_string(),
        },
        BlockKind::OwnedScript => Block::OwnedScript {
            body: caps.get(2).map_or("", |m| m.as_str()).to_string(),
        },
        BlockKind::ImportedStyle => Block::ImportedStyle {
            target: first.trim().to_string(),
        },
        BlockKind::ImportedScript => Block::ImportedScript {
            target: first.trim().to_string(),
        },
    };

    Some(ExtractedBlock {
        block,
        range: whole.range(),
    })
}

/// Number of blocks of `kind` in `body`.
pub fn count_blocks(body: &str, kind: BlockKind) -> usize {
    kind.pattern().find_iter(body).count()
}

/// Splice `replacement` over `range`.
pub fn replace_range(body: &str, range: Range<usize>, replacement: &str) -> String {
    let mut out = String::with_capacity(body.len() - range.len() + replacement.len());
    out.push_str(&body[..range.start]);
    out.push_str(replacement);
    out.push_str(&body[range.end..]);
    out
}

/// Remove a block from the body it was found in.
pub fn remove_block(body: &str, block: &ExtractedBlock) -> String {
    replace_range(body, block.range.clone(), "")
}

fn style_dialect(attributes: &str) -> String {
    LANG_ATTR
        .captures(attributes)
        .or_else(|| SCOPED_VALUE.captures(attributes))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_ascii_lowercase())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| DEFAULT_STYLE_DIALECT.to_string())
}

/// Resolve an import target to a path relative to the template root.
///
/// The suffix is appended when absent and the target is resolved against the
/// importing file's directory. Returns `None` when the result would leave the
/// template root.
pub fn canonical_target(target: &str, importer: &Path, suffix: &str) -> Option<PathBuf> {
    let mut target = target.to_string();
    if !target.ends_with(suffix) {
        target.push_str(suffix);
    }

    let target = Path::new(&target);
    if target.is_absolute() {
        return None;
    }

    let base = importer.parent().unwrap_or_else(|| Path::new(""));
    let resolved = normalize_path(&base.join(target));

    match resolved.components().next() {
        Some(std::path::Component::Normal(_)) => Some(resolved),
        _ => None,
    }
}
