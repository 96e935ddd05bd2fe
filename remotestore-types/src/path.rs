//! POSIX-style path handling for object names.
//!
//! Object names are always relative to a collection root. Joining normalizes `.` and `..`
//! segments as well as duplicate or leading separators. A `..` at the root is dropped, so a
//! normalized path never escapes its root.

/// Normalizes a relative path into its canonical `a/b/c` form.
///
/// The result never starts or ends with a `/`, and an empty result denotes the root.
pub fn normalize(path: &str) -> String {
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
    segments.join("/")
}

/// Joins `path` onto `root` and normalizes the result.
///
/// `path` is always treated as relative to `root`, even if it has a leading `/`.
pub fn join(root: &str, path: &str) -> String {
    let root = normalize(root);
    let path = normalize(path);
    match (root.is_empty(), path.is_empty()) {
        (true, _) => path,
        (false, true) => root,
        (false, false) => normalize(&format!("{root}/{path}")),
    }
}

/// Splits a normalized path into its parent directory and its final segment.
///
/// The parent is empty for paths directly below the root.
pub fn split(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", path),
    }
}
