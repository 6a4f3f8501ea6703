//! Lexical path helpers.
//!
//! Nothing here touches the filesystem: templates referenced through an
//! import may not exist yet when the importing file is compiled, so paths are
//! resolved purely by their components.

use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` components without consulting the filesystem.
///
/// Leading `..` components of a relative path are kept, since there is
/// nothing to pop them against.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }

    out.iter().map(|c| c.as_os_str()).collect()
}

/// Render a path with `/` separators regardless of platform.
///
/// Used wherever a path feeds a digest, so names stay identical across
/// operating systems.
pub fn to_slash(path: &Path) -> String {
    let mut out = String::new();
    for component in path.components() {
        let part = match component {
            Component::RootDir => {
                out.push('/');
                continue;
            }
            Component::Prefix(prefix) => prefix.as_os_str().to_string_lossy(),
            other => other.as_os_str().to_string_lossy(),
        };
        if !out.is_empty() && !out.ends_with('/') {
            out.push('/');
        }
        out.push_str(&part);
    }
    out
}

/// Strip `suffix` from the end of `path` if present.
#[inline]
pub fn strip_suffix<'a>(path: &'a str, suffix: &str) -> &'a str {
    path.strip_suffix(suffix).unwrap_or(path)
}

/// Turn a slash-separated template stem into a dotted view identifier
/// (`pages/home` -> `pages.home`).
pub fn dotted_identifier(stem: &str) -> String {
    stem.trim_start_matches('/').replace('/', ".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_resolves_dots() {
        assert_eq!(
            normalize_path(Path::new("views/pages/./../partials/nav.blade.php")),
            PathBuf::from("views/partials/nav.blade.php")
        );
    }

    #[test]
    fn test_normalize_keeps_leading_parent() {
        assert_eq!(
            normalize_path(Path::new("../shared/a.blade.php")),
            PathBuf::from("../shared/a.blade.php")
        );
    }

    #[test]
    fn test_normalize_stops_at_root() {
        assert_eq!(normalize_path(Path::new("/../a")), PathBuf::from("/a"));
    }

    #[test]
    fn test_to_slash() {
        assert_eq!(to_slash(Path::new("pages/home.blade.php")), "pages/home.blade.php");
        assert_eq!(to_slash(Path::new("/srv/views/a")), "/srv/views/a");
    }

    #[test]
    fn test_dotted_identifier() {
        assert_eq!(dotted_identifier("pages/home__style"), "pages.home__style");
        assert_eq!(strip_suffix("pages/home.blade.php", ".blade.php"), "pages/home");
        assert_eq!(strip_suffix("pages/home.php", ".blade.php"), "pages/home.php");
    }
}
