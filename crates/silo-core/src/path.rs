//! Path normalization shared by every backend
//!
//! Store paths are slash separated. `""` and `"/"` both name the root. Flat
//! backends use the normalized form (no leading or trailing slash) as their
//! object key and append a single trailing slash for directory markers.

use crate::{Result, StoreError};

/// Separator used by every store path.
pub const SEPARATOR: char = '/';

/// Remove a single leading slash.
pub fn strip_leading_slash(path: &str) -> &str {
    path.strip_prefix(SEPARATOR).unwrap_or(path)
}

/// Remove a single trailing slash.
pub fn strip_trailing_slash(path: &str) -> &str {
    path.strip_suffix(SEPARATOR).unwrap_or(path)
}

/// Append a trailing slash unless one is already present.
pub fn with_trailing_slash(path: &str) -> String {
    if path.ends_with(SEPARATOR) {
        path.to_string()
    } else {
        format!("{path}{SEPARATOR}")
    }
}

/// Key form of a path: no leading slash, no trailing slash.
pub fn normalize(path: &str) -> &str {
    strip_trailing_slash(strip_leading_slash(path))
}

/// True when the path names the root.
pub fn is_root(path: &str) -> bool {
    normalize(path).is_empty()
}

/// Last element of a path, ignoring a trailing slash. Empty for the root.
pub fn last_element(path: &str) -> &str {
    let path = normalize(path);
    match path.rfind(SEPARATOR) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Normalized parent of a path; `None` when the path sits directly under
/// (or is) the root.
pub fn parent(path: &str) -> Option<&str> {
    let path = normalize(path);
    path.rfind(SEPARATOR).map(|idx| &path[..idx])
}

/// Non-empty segments of a path.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty())
}

/// Reject paths with a `.` or `..` segment.
///
/// Store paths name nodes directly; relative segments are never resolved.
pub fn check_segments(path: &str) -> Result<()> {
    if segments(path).any(|s| s == "." || s == "..") {
        return Err(StoreError::InvalidPath(format!(
            "{path}: relative segments are not allowed"
        )));
    }
    Ok(())
}

/// Join a child name onto a base path without doubling separators.
pub fn join(base: &str, name: &str) -> String {
    if base.is_empty() {
        return name.to_string();
    }
    if base.ends_with(SEPARATOR) {
        format!("{base}{name}")
    } else {
        format!("{base}{SEPARATOR}{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/a/b/"), "a/b");
        assert_eq!(normalize("a/b"), "a/b");
        assert_eq!(normalize("/"), "");
        assert_eq!(normalize(""), "");
        assert!(is_root("/"));
        assert!(!is_root("/a"));
    }

    #[test]
    fn test_trailing_slash() {
        assert_eq!(with_trailing_slash("a/b"), "a/b/");
        assert_eq!(with_trailing_slash("a/b/"), "a/b/");
        assert_eq!(strip_trailing_slash("a/b/"), "a/b");
    }

    #[test]
    fn test_last_element_and_parent() {
        assert_eq!(last_element("/a/b/c"), "c");
        assert_eq!(last_element("/a/b/c/"), "c");
        assert_eq!(last_element("top"), "top");
        assert_eq!(last_element("/"), "");

        assert_eq!(parent("/a/b/c"), Some("a/b"));
        assert_eq!(parent("a/"), None);
        assert_eq!(parent("/"), None);
    }

    #[test]
    fn test_check_segments() {
        assert!(check_segments("/a/b.c/..d").is_ok());
        assert!(check_segments("/").is_ok());
        assert!(matches!(
            check_segments("/a/../b"),
            Err(StoreError::InvalidPath(_))
        ));
        assert!(check_segments("./a").is_err());
    }

    #[test]
    fn test_join_and_segments() {
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a", "1"), "/a/1");
        assert_eq!(join("", "a"), "a");
        assert_eq!(segments("/a//b/").collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
