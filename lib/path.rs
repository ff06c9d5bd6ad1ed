//! Traversal-safe filename resolution.
//!
//! Everything here is lexical: no component is looked up on disk, so symlinks inside the root are
//! followed by the OS at open time exactly as they would be for any other path.

use std::path::{Component, Path, PathBuf};

/// Resolve `filename` to the path a handle will open.
///
/// With a `root`, the filename is forced relative to it first: drive prefixes and leading `/` are
/// stripped and `..` can never climb above the root, so the result always lies within `root`.
/// Without a root the filename is made absolute against the current directory.
#[must_use]
pub fn resolve(filename: &Path, root: Option<&Path>) -> PathBuf {
    match root {
        Some(root) => {
            let mut resolved = normalize(root);
            resolved.extend(confine(filename));
            debug_assert!(is_within(&resolved, root), "{} escaped its root", resolved.display());
            resolved
        }
        None => {
            let absolute = std::path::absolute(filename).unwrap_or_else(|_| filename.to_owned());
            normalize(&absolute)
        }
    }
}

/// Returns `true` if `path` lies at or below `root`, compared lexically.
#[must_use]
pub fn is_within(path: &Path, root: &Path) -> bool {
    normalize(path).starts_with(normalize(root))
}

/// The normal components of `filename` once it is re-rooted at `/`.
fn confine(filename: &Path) -> Vec<&std::ffi::OsStr> {
    let mut parts = Vec::new();
    for component in filename.components() {
        match component {
            // Any root or prefix restarts the walk, as if the path began there.
            Component::Prefix(_) | Component::RootDir => parts.clear(),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop();
            }
            Component::Normal(part) => parts.push(part),
        }
    }
    parts
}

/// Collapse `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root; a relative path keeps its leading `..`s.
                let climbing = matches!(out.components().next_back(), Some(Component::ParentDir));
                if climbing || out.as_os_str().is_empty() {
                    out.push(Component::ParentDir);
                } else {
                    out.pop();
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_plain_name_under_root() {
        let resolved = resolve(Path::new("test.txt"), Some(Path::new("/data")));
        assert_eq!(resolved, PathBuf::from("/data/test.txt"));
    }

    #[test]
    fn parent_escapes_collapse_into_root() {
        let name = "../../../../../../../../../../../../../tmp";
        let resolved = resolve(Path::new(name), Some(Path::new("/data/store")));
        assert_eq!(resolved, PathBuf::from("/data/store/tmp"));
    }

    #[test]
    fn absolute_filename_is_rerooted() {
        let resolved = resolve(Path::new("/etc/passwd"), Some(Path::new("/data")));
        assert_eq!(resolved, PathBuf::from("/data/etc/passwd"));
    }

    #[test]
    fn interior_parent_segments_stay_confined() {
        let resolved = resolve(Path::new("a/b/../../../../c/./d"), Some(Path::new("/data")));
        assert_eq!(resolved, PathBuf::from("/data/c/d"));
        assert!(is_within(&resolved, Path::new("/data")));
    }

    #[test]
    fn root_itself_is_normalized() {
        let resolved = resolve(Path::new("x"), Some(Path::new("/data/./sub/../store")));
        assert_eq!(resolved, PathBuf::from("/data/store/x"));
    }

    #[test]
    fn without_root_path_becomes_absolute() {
        let resolved = resolve(Path::new("some/file.bin"), None);
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("some/file.bin"));
    }

    #[test]
    fn without_root_absolute_path_is_kept() {
        let resolved = resolve(Path::new("/var/tmp/../lib/x"), None);
        assert_eq!(resolved, PathBuf::from("/var/lib/x"));
    }

    #[test]
    fn is_within_rejects_siblings() {
        assert!(!is_within(Path::new("/data2/x"), Path::new("/data")));
        assert!(is_within(Path::new("/data"), Path::new("/data")));
    }
}
