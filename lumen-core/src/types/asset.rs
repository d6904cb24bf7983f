use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::FolderId;

/// Still image extensions understood by the gallery.
pub const PHOTO_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "tif", "tiff", "heic", "heif",
    "avif",
];

/// Video extensions understood by the gallery.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "mkv", "avi", "webm", "m4v", "wmv", "flv", "3gp", "mpg",
    "mpeg", "mts", "m2ts",
];

/// MIME type used when a file could not be probed.
pub const GENERIC_MIME: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Photo,
    Video,
    Unknown,
}

impl AssetType {
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.to_ascii_lowercase();
        if PHOTO_EXTENSIONS.contains(&ext.as_str()) {
            AssetType::Photo
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            AssetType::Video
        } else {
            AssetType::Unknown
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(AssetType::Unknown)
    }
}

/// MIME type derived from the extension alone, used for videos and as a
/// hint before a photo header has been probed.
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "avif" => "image/avif",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "webm" => "video/webm",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        "3gp" => "video/3gpp",
        "mpg" | "mpeg" => "video/mpeg",
        "mts" | "m2ts" => "video/mp2t",
        _ => GENERIC_MIME,
    }
}

/// Extensions indexed when the caller does not supply its own allow-list.
pub fn default_media_extensions() -> Vec<String> {
    PHOTO_EXTENSIONS
        .iter()
        .chain(VIDEO_EXTENSIONS)
        .map(|ext| ext.to_string())
        .collect()
}

/// Fully built asset, ready to be written to the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub filename: String,
    pub path: PathBuf,
    pub asset_type: AssetType,
    pub size: u64,
    pub hash: String,
    pub created_ms: i64,
    pub modified_ms: i64,
    pub folder_id: Option<FolderId>,
    pub width: u32,
    pub height: u32,
    pub mime: String,
}
