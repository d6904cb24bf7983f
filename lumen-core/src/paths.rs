//! Path normalization shared by snapshots, pending change sets and the
//! watcher registry.
//!
//! Normalization is purely lexical: relative paths are anchored at the
//! current directory, `.` segments are dropped and `..` pops the previous
//! segment. The filesystem is never consulted, so paths that no longer exist
//! (removal notifications) normalize the same way as live ones.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Absolute, lexically cleaned form of `path`.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        cwd.join(path)
    };

    let mut clean = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                clean.push(component.as_os_str())
            }
            Component::CurDir => {}
            Component::ParentDir => {
                // Never pop past the root
                if clean.parent().is_some() {
                    clean.pop();
                }
            }
            Component::Normal(segment) => clean.push(segment),
        }
    }
    clean
}

/// Join a root-relative name onto `root`, rejecting names that escape it.
pub fn join_within_root(root: &Path, relative: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => clean.push(segment),
            Component::CurDir => {}
            Component::ParentDir => {
                if !clean.pop() {
                    return None;
                }
            }
            _ => return None,
        }
    }

    let mut joined = root.to_path_buf();
    joined.push(clean);
    Some(joined)
}
