use std::collections::HashSet;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{IndexError, Result};
use crate::scan::ignore::IgnoreMatcher;
use crate::types::{FileSystemInfo, ScanIssue, is_supported_extension};

/// Candidate files found under a root.
#[derive(Debug, Default)]
pub struct DirectoryListing {
    pub files: Vec<FileSystemInfo>,
    /// Entries that could not be read and were left out.
    pub skipped: Vec<ScanIssue>,
}

/// Walk `root` and collect supported, non-ignored files.
///
/// Errors on individual entries are logged and skipped; only a missing or
/// unreadable root fails the walk. Symbolic links are not followed.
/// Concurrent modification is tolerated: entries that vanish mid-walk are
/// simply skipped.
pub fn scan(
    root: &Path,
    ignore: &IgnoreMatcher,
    extensions: &HashSet<String>,
    recursive: bool,
) -> Result<DirectoryListing> {
    let root_meta =
        fs::metadata(root).map_err(|err| IndexError::from_io(root, err))?;
    if !root_meta.is_dir() {
        return Err(IndexError::NotADirectory(root.to_path_buf()));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let walker = WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && ignore.is_ignored_dir(entry.path(), root))
        });

    let mut listing = DirectoryListing::default();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf());
                let issue = match err.into_io_error() {
                    Some(io) => IndexError::from_io(&path, io),
                    None => IndexError::Filesystem {
                        path: path.clone(),
                        message: "filesystem loop detected".to_string(),
                    },
                };
                warn!(
                    target: "scan::walk",
                    path = %path.display(),
                    error = %issue,
                    "skipping entry due to walk error"
                );
                listing.skipped.push(ScanIssue::from(issue));
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !is_supported_extension(path, extensions) {
            continue;
        }
        if ignore.is_ignored(path, root) {
            debug!(
                target: "scan::walk",
                path = %path.display(),
                "ignored by rule"
            );
            continue;
        }

        match entry.metadata() {
            Ok(meta) => listing
                .files
                .push(FileSystemInfo::from_metadata(path.to_path_buf(), &meta)),
            Err(err) => {
                let issue = match err.into_io_error() {
                    Some(io) => IndexError::from_io(path, io),
                    None => IndexError::Filesystem {
                        path: path.to_path_buf(),
                        message: "metadata unavailable".to_string(),
                    },
                };
                warn!(
                    target: "scan::walk",
                    path = %path.display(),
                    error = %issue,
                    "skipping entry due to metadata error"
                );
                listing.skipped.push(ScanIssue::from(issue));
            }
        }
    }

    debug!(
        target: "scan::walk",
        root = %root.display(),
        files = listing.files.len(),
        skipped = listing.skipped.len(),
        recursive,
        "walk finished"
    );
    Ok(listing)
}
