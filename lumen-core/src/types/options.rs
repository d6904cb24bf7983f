use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use super::asset::default_media_extensions;

/// How index entries disappear when their file is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    /// Keep the row but hide it from queries.
    #[default]
    Soft,
    /// Remove the row entirely.
    Hard,
}

/// Per-root scan behaviour. Watchers keep a copy and callers may replace it
/// through `ensure_watcher`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Allow-list of extensions (without the dot), compared case-insensitively.
    pub extensions: Vec<String>,
    pub delete_mode: DeleteMode,
    /// Ask the thumbnail service for a thumbnail of every built asset.
    pub generate_thumbnails: bool,
    /// Longest edge, in pixels, of generated thumbnails.
    pub thumbnail_size: u32,
    /// Run a full rescan right after a watcher is registered.
    pub bootstrap_scan: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            extensions: default_media_extensions(),
            delete_mode: DeleteMode::Soft,
            generate_thumbnails: true,
            thumbnail_size: 400,
            bootstrap_scan: true,
        }
    }
}

impl ScanOptions {
    /// Lower-cased extension set used for filtering.
    pub fn extension_set(&self) -> HashSet<String> {
        self.extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect()
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        is_supported_extension(path, &self.extension_set())
    }
}

/// Case-insensitive extension check against a pre-lowered set.
pub fn is_supported_extension(
    path: &Path,
    extensions: &HashSet<String>,
) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.contains(&ext.to_ascii_lowercase()))
        .unwrap_or(false)
}

/// Batch sizing for the parallel stages of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Files hashed per worker-pool task.
    pub hash_batch_size: usize,
    /// Assets built per worker-pool task.
    pub process_batch_size: usize,
    /// Rows per repository create/update call.
    pub persist_batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            hash_batch_size: 32,
            process_batch_size: 16,
            persist_batch_size: 256,
        }
    }
}

/// Configuration knobs for watch processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WatchConfig {
    /// Quiet period after the last observed change before a sync runs.
    pub debounce_window: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(500),
        }
    }
}
