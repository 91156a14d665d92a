//! URL helpers for virtual file URLs.
//!
//! A virtual file URL is `protocol://path`. Paths always use `/` as the
//! separator; archive-nested paths put [`ARCHIVE_SEPARATOR`] between the
//! archive file and the entry inside it:
//!
//! ```text
//! file:///home/me/project/src/main.rs
//! jar:///home/me/lib/outer.jar!/a/b.class
//!        |-------- outer --------| |inner|
//! ```
//!
//! Everything here is a pure string function.

use std::borrow::Cow;

use percent_encoding::percent_decode_str;

/// Separates the protocol from the path.
pub const PROTOCOL_SEPARATOR: &str = "://";

/// Separates an archive file from the path inside it.
pub const ARCHIVE_SEPARATOR: &str = "!/";

/// Protocol part of a URL, or `None` if the URL has no protocol.
pub fn extract_protocol(url: &str) -> Option<&str> {
    let idx = url.find(PROTOCOL_SEPARATOR)?;
    let protocol = &url[..idx];
    (!protocol.is_empty()).then_some(protocol)
}

/// Path part of a URL (everything after `://`), or the input itself.
pub fn extract_path(url: &str) -> &str {
    match url.find(PROTOCOL_SEPARATOR) {
        Some(idx) => &url[idx + PROTOCOL_SEPARATOR.len()..],
        None => url,
    }
}

/// Build a URL from a protocol and a path.
pub fn construct_url(protocol: &str, path: &str) -> String {
    format!("{protocol}{PROTOCOL_SEPARATOR}{path}")
}

/// Replace Windows separators with `/`.
pub fn to_system_independent(url: &str) -> Cow<'_, str> {
    if url.contains('\\') {
        Cow::Owned(url.replace('\\', "/"))
    } else {
        Cow::Borrowed(url)
    }
}

/// Strip a single trailing `/` from the path part of a URL.
///
/// The root path and an archive root (`…jar!/`) keep their separator:
/// the `/` of `!/` belongs to the archive marker, not to the outer path.
///
/// - `file:///a/b/` -> `file:///a/b`
/// - `jar:///a.jar!/dir/` -> `jar:///a.jar!/dir`
/// - `jar:///a.jar!/` -> unchanged
/// - `file:///` -> unchanged
pub fn strip_trailing_separator(url: &str) -> &str {
    let path = extract_path(url);
    if path.len() > 1 && path.ends_with('/') && !path.ends_with(ARCHIVE_SEPARATOR) {
        &url[..url.len() - 1]
    } else {
        url
    }
}

/// Fold `.` and `..` segments and repeated separators out of a path.
///
/// A leading `/` is kept and `..` never climbs above the root. Archive-nested
/// paths are folded on each side of the marker, so `/a.jar!/` stays an
/// archive root.
///
/// - `/a/./b` -> `/a/b`
/// - `/a/x/../b` -> `/a/b`
/// - `/a//b` -> `/a/b`
pub fn normalize_path(path: &str) -> Cow<'_, str> {
    let dirty = path.contains("//")
        || path.split('/').any(|segment| segment == "." || segment == "..");
    if !dirty {
        return Cow::Borrowed(path);
    }

    let (outer, inner) = split_archive_path(path);
    let mut folded = fold_segments(outer);
    if let Some(inner) = inner {
        folded.push_str(ARCHIVE_SEPARATOR);
        folded.push_str(&fold_segments(inner));
    }
    Cow::Owned(folded)
}

fn fold_segments(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }
    let joined = segments.join("/");
    if path.starts_with('/') {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Split a path into its outer part and, for archive-nested paths, the
/// part inside the archive.
///
/// An archive root (`/a.jar!/`) has an empty inner part, which is still
/// `Some` to tell it apart from the archive file itself.
pub fn split_archive_path(path: &str) -> (&str, Option<&str>) {
    match path.find(ARCHIVE_SEPARATOR) {
        Some(idx) => (&path[..idx], Some(&path[idx + ARCHIVE_SEPARATOR.len()..])),
        None => (path, None),
    }
}

/// Case-fold a path for lookups on a case-insensitive file system.
pub fn fold_case(path: &str, case_sensitive: bool) -> Cow<'_, str> {
    if case_sensitive {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(path.to_lowercase())
    }
}

/// Compare two paths under the given case rule.
pub fn paths_equal(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.to_lowercase() == b.to_lowercase()
    }
}

/// Filesystem-style ancestor test: `path` is `ancestor` or lies below it.
///
/// Unlike a plain string prefix test, `/a/bc` is not below `/a/b`.
pub fn is_ancestor_path(ancestor: &str, path: &str, case_sensitive: bool) -> bool {
    let ancestor = ancestor.trim_end_matches('/');
    if ancestor.is_empty() {
        return path.starts_with('/');
    }
    let Some(head) = path.get(..ancestor.len()) else {
        return false;
    };
    if !paths_equal(head, ancestor, case_sensitive) {
        return false;
    }
    let rest = &path[ancestor.len()..];
    rest.is_empty() || rest.starts_with('/')
}

/// Whether `candidate` is at or below `target`, respecting archive boundaries.
///
/// Both paths are split at the archive marker first:
/// - candidate inside an archive, target inside an archive: the outer paths
///   must be equal and the candidate's inner path must start with the
///   target's inner path.
/// - candidate inside an archive, target outside any archive: the candidate's
///   outer path must lie below the target (deleting the directory that holds
///   an archive affects everything inside it).
/// - candidate outside any archive, target outside any archive: plain
///   filesystem-style ancestor test.
/// - candidate outside any archive, target inside one: never.
pub fn is_under(candidate: &str, target: &str, case_sensitive: bool) -> bool {
    let (candidate_outer, candidate_inner) = split_archive_path(candidate);
    let (target_outer, target_inner) = split_archive_path(target);

    match (candidate_inner, target_inner) {
        (Some(candidate_inner), Some(target_inner)) => {
            paths_equal(candidate_outer, target_outer, case_sensitive)
                && candidate_inner.starts_with(target_inner)
        }
        (_, None) => is_ancestor_path(target_outer, candidate_outer, case_sensitive),
        (None, Some(_)) => false,
    }
}

/// Last path segment of a URL or path.
///
/// For an archive root (`/lib/a.jar!/`) this is the archive's name.
pub fn file_name(url: &str) -> &str {
    let path = extract_path(url);
    let path = path.strip_suffix(ARCHIVE_SEPARATOR).unwrap_or(path);
    let path = path.trim_end_matches('/');
    path.rsplit('/').next().unwrap_or(path)
}

/// Parent path of a path, or `None` for the root.
pub fn parent_path(path: &str) -> Option<&str> {
    let trimmed = path.strip_suffix(ARCHIVE_SEPARATOR).unwrap_or(path);
    let trimmed = trimmed.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) if trimmed.len() > 1 => Some("/"),
        Some(0) | None => None,
        Some(idx) if trimmed[..idx].ends_with('!') => Some(&path[..idx + 1]),
        Some(idx) => Some(&trimmed[..idx]),
    }
}

/// Join a parent path and a child name.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Human-readable form of a URL: the decoded path without the protocol.
pub fn presentable(url: &str) -> String {
    let path = extract_path(url);
    percent_decode_str(path)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_protocol() {
        assert_eq!(extract_protocol("file:///a/b"), Some("file"));
        assert_eq!(extract_protocol("jar:///a.jar!/x"), Some("jar"));
        assert_eq!(extract_protocol("/a/b"), None);
        assert_eq!(extract_protocol("://a"), None);
    }

    #[test]
    fn test_extract_path() {
        assert_eq!(extract_path("file:///a/b"), "/a/b");
        assert_eq!(extract_path("/a/b"), "/a/b");
    }

    #[test]
    fn test_system_independent() {
        assert_eq!(to_system_independent("file://C:\\a\\b"), "file://C:/a/b");
        assert!(matches!(to_system_independent("file:///a"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_strip_trailing_separator() {
        assert_eq!(strip_trailing_separator("file:///a/b/"), "file:///a/b");
        assert_eq!(strip_trailing_separator("file:///a/b"), "file:///a/b");
        assert_eq!(strip_trailing_separator("file:///"), "file:///");
        assert_eq!(strip_trailing_separator("jar:///a.jar!/"), "jar:///a.jar!/");
        assert_eq!(strip_trailing_separator("jar:///a.jar!/dir/"), "jar:///a.jar!/dir");
        // Only a single separator is stripped
        assert_eq!(strip_trailing_separator("file:///a//"), "file:///a/");
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/a/./b"), "/a/b");
        assert_eq!(normalize_path("/a/x/../b"), "/a/b");
        assert_eq!(normalize_path("/a//b"), "/a/b");
        assert_eq!(normalize_path("/.."), "/");
        assert_eq!(normalize_path("/x/a.jar!/d/../e"), "/x/a.jar!/e");
        assert_eq!(normalize_path("/x/./a.jar!/"), "/x/a.jar!/");
        assert_eq!(normalize_path("C:/a/./b"), "C:/a/b");
        // Dots inside names are not segments
        assert!(matches!(normalize_path("/a/..b/.c"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_split_archive_path() {
        assert_eq!(split_archive_path("/a/b"), ("/a/b", None));
        assert_eq!(split_archive_path("/a.jar!/x/y"), ("/a.jar", Some("x/y")));
        assert_eq!(split_archive_path("/a.jar!/"), ("/a.jar", Some("")));
    }

    #[test]
    fn test_is_ancestor_path() {
        assert!(is_ancestor_path("/a/b", "/a/b", true));
        assert!(is_ancestor_path("/a/b", "/a/b/c", true));
        assert!(is_ancestor_path("/a/b/", "/a/b/c", true));
        assert!(!is_ancestor_path("/a/b", "/a/bc", true));
        assert!(!is_ancestor_path("/a/b/c", "/a/b", true));
        assert!(is_ancestor_path("/", "/a", true));
        assert!(!is_ancestor_path("/A/b", "/a/b/c", true));
        assert!(is_ancestor_path("/A/b", "/a/b/c", false));
    }

    #[test]
    fn test_is_under_archive_boundary() {
        assert!(is_under("/x/outer.jar!/a/b", "/x/outer.jar!/a", true));
        assert!(!is_under("/x/outer.jar!/a/b", "/x/outer2.jar!/a", true));
        // Archive root covers everything inside
        assert!(is_under("/x/outer.jar!/a/b", "/x/outer.jar!/", true));
        // Deleting the archive file or its directory reaches inside
        assert!(is_under("/x/outer.jar!/a/b", "/x/outer.jar", true));
        assert!(is_under("/x/outer.jar!/a/b", "/x", true));
        assert!(!is_under("/x/outer.jar!/a/b", "/x/outer", true));
        // An archive file is not below its own entries
        assert!(!is_under("/x/outer.jar", "/x/outer.jar!/a", true));
    }

    #[test]
    fn test_is_under_plain() {
        assert!(is_under("/a/b.txt", "/a", true));
        assert!(is_under("/a", "/a", true));
        assert!(!is_under("/ab/c", "/a", true));
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("file:///a/b.txt"), "b.txt");
        assert_eq!(file_name("jar:///lib/a.jar!/"), "a.jar");
        assert_eq!(file_name("jar:///lib/a.jar!/x/Y.class"), "Y.class");
        assert_eq!(file_name("file:///a/dir/"), "dir");
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("/a/b/c"), Some("/a/b"));
        assert_eq!(parent_path("/a"), Some("/"));
        assert_eq!(parent_path("/"), None);
        assert_eq!(parent_path("/lib/a.jar!/x"), Some("/lib/a.jar!/"));
        assert_eq!(parent_path("/lib/a.jar!/"), Some("/lib"));
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/a", "b"), "/a/b");
        assert_eq!(join_path("/", "b"), "/b");
        assert_eq!(join_path("/a.jar!/", "x"), "/a.jar!/x");
    }

    #[test]
    fn test_presentable() {
        assert_eq!(presentable("file:///a/my%20file.txt"), "/a/my file.txt");
    }
}
