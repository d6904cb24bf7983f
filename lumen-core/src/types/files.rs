use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::AssetId;

/// Cached index row used for change detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub id: AssetId,
    pub filepath: PathBuf,
    pub size: u64,
    pub modified_ms: i64,
    pub hash: String,
}

/// Read-only view of the index keyed by normalized path.
///
/// A snapshot is loaded once per full pass and never refreshed while the
/// pass runs, so every comparison inside the pass sees the same state.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    entries: HashMap<PathBuf, Metadata>,
}

impl IndexSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, metadata: Metadata) {
        self.entries.insert(metadata.filepath.clone(), metadata);
    }

    pub fn get(&self, path: &Path) -> Option<&Metadata> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Metadata> {
        self.entries.values()
    }
}

impl FromIterator<Metadata> for IndexSnapshot {
    fn from_iter<I: IntoIterator<Item = Metadata>>(iter: I) -> Self {
        let mut snapshot = IndexSnapshot::new();
        for metadata in iter {
            snapshot.insert(metadata);
        }
        snapshot
    }
}

/// What the filesystem currently reports for a candidate file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSystemInfo {
    pub path: PathBuf,
    pub size: u64,
    pub modified_ms: i64,
    pub created_ms: i64,
    /// Content hash, filled in by the hashing stage.
    pub hash: Option<String>,
}

impl FileSystemInfo {
    pub fn from_metadata(path: PathBuf, metadata: &fs::Metadata) -> Self {
        let modified_ms = metadata
            .modified()
            .map(system_time_to_ms)
            .unwrap_or_default();
        // Not every filesystem records birth time
        let created_ms = metadata
            .created()
            .map(system_time_to_ms)
            .unwrap_or(modified_ms);

        Self {
            path,
            size: metadata.len(),
            modified_ms,
            created_ms,
            hash: None,
        }
    }
}

/// Convert a filesystem timestamp into milliseconds since the Unix epoch.
pub fn system_time_to_ms(time: SystemTime) -> i64 {
    DateTime::<Utc>::from(time).timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Not present in the index.
    New,
    /// Indexed, but size or modification time changed.
    NeedsHashCheck,
    /// Indexed and identical.
    Unchanged,
    /// Indexed and the content hash differs.
    Modified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAnalysisResult {
    pub file_info: FileSystemInfo,
    pub status: FileStatus,
    pub existing_metadata: Option<Metadata>,
}

impl FileAnalysisResult {
    /// Whether the item still needs a content hash before it can be resolved.
    pub fn needs_hash(&self) -> bool {
        matches!(self.status, FileStatus::New | FileStatus::NeedsHashCheck)
    }

    /// Whether the asset processor should (re)build this item.
    pub fn needs_processing(&self) -> bool {
        self.file_info.hash.is_some()
            && matches!(self.status, FileStatus::New | FileStatus::Modified)
    }
}
