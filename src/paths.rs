//! Resource paths
//!
//! A path is a sequence of names joined with `/`. The empty string is the
//! base (root) path. Leading, trailing and doubled slashes carry no meaning
//! and are dropped when a path is broken into names.

/// Path of the base resource.
pub const BASE: &str = "";

/// Split a path into its names, dropping empty segments.
pub fn names(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Normalized form of `path` (names joined with `/`).
pub fn normalize(path: &str) -> String {
    names(path).join("/")
}

/// Join path items into a single normalized path.
///
/// Each item may itself contain slashes. A lone `None` item is the "no path"
/// sentinel and yields `None`; other `None` items are skipped.
pub fn path(items: &[Option<&str>]) -> Option<String> {
    if let [None] = items {
        return None;
    }
    let joined = items
        .iter()
        .flatten()
        .flat_map(|item| names(item))
        .collect::<Vec<_>>()
        .join("/");
    Some(joined)
}

/// Join names that are known to be present.
pub fn join<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .flat_map(|item| names(item.as_ref()))
        .collect::<Vec<_>>()
        .join("/")
}

/// Parent path, `Some(BASE)` for a top level name, `None` for the base itself.
pub fn parent(path: &str) -> Option<String> {
    match path.rfind('/') {
        Some(last) => Some(path[..last].to_string()),
        None if path == BASE => None,
        None => Some(BASE.to_string()),
    }
}

/// Last name in the path.
pub fn name(path: &str) -> &str {
    match path.rfind('/') {
        Some(last) => &path[last + 1..],
        None => path,
    }
}

/// Extension of the last name, without the dot.
pub fn extension(path: &str) -> Option<&str> {
    let name = name(path);
    name.rfind('.').map(|dot| &name[dot + 1..])
}

/// Path of a sibling resource sharing the same base name but a different extension.
pub fn sidecar(path: &str, extension: &str) -> String {
    let start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[start..].rfind('.') {
        Some(dot) => format!("{}.{}", &path[..start + dot], extension),
        None => format!("{}.{}", path, extension),
    }
}
