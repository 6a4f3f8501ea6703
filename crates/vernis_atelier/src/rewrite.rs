//! Final cleanup of a rewritten template body.

use once_cell::sync::Lazy;
use regex::Regex;

/// A `//@` marker plus the single `$`, `\n` or `\r` after it. On a CRLF
/// break only the `\r` goes, which leaves the `\n` in place.
static CONTINUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"//@[$\n\r]").expect("valid continuation pattern"));

/// `{{-- @formatter:off --}}` style editor pragmas.
static FORMATTER_PRAGMA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\{\{--\s*@formatter:\S+\s*--\}\}\n?").expect("valid pragma pattern")
});

/// HTML comments, except conditional comments (`<!--[if IE]>`).
static HTML_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<!--[^\[][\s\S]*?-->\n?").expect("valid comment pattern"));

/// Strip continuation markers, formatter pragmas and HTML comments.
pub fn rewrite(body: &str) -> String {
    let body = CONTINUATION.replace_all(body, "");
    let body = FORMATTER_PRAGMA.replace_all(&body, "");
    HTML_COMMENT.replace_all(&body, "").into_owned()
}
