//! Lexical path helpers.

use std::path::{Component, Path, PathBuf};

/// Normalizes `.` and `..` components without touching the filesystem.
///
/// `..` never climbs above the root of an absolute path.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match cleaned.components().next_back() {
                Some(Component::Normal(_)) => {
                    cleaned.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => cleaned.push(".."),
            },
            other => cleaned.push(other.as_os_str()),
        }
    }

    if cleaned.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        cleaned
    }
}

/// Joins `candidate` onto `root` unless it is already absolute, then cleans it.
pub fn join_clean(root: &Path, candidate: &Path) -> PathBuf {
    if candidate.is_absolute() {
        clean_path(candidate)
    } else {
        clean_path(&root.join(candidate))
    }
}

/// Returns true for references that name a file rather than a package.
pub fn is_local_reference(reference: &str) -> bool {
    reference.starts_with('.') || reference.starts_with('/')
}

/// Returns true if `path` is a filesystem root (it has no parent).
pub fn is_filesystem_root(path: &Path) -> bool {
    let cleaned = clean_path(path);
    cleaned.is_absolute() && cleaned.parent().is_none()
}
