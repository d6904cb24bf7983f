use std::fmt;
use std::path::Path;

use crate::error::Result;
use crate::types::Metadata;

/// Thumbnail generation and cleanup for indexed assets.
pub trait ThumbnailService: Send + Sync + fmt::Debug {
    /// Render a thumbnail for the file at `path` whose content hash is
    /// `hash`, bounded by `size` pixels on the long edge.
    fn generate(&self, path: &Path, hash: &str, size: u32) -> Result<()>;

    fn delete(&self, asset: &Metadata) -> Result<()>;
}

/// Thumbnail service that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopThumbnails;

impl ThumbnailService for NoopThumbnails {
    fn generate(&self, _path: &Path, _hash: &str, _size: u32) -> Result<()> {
        Ok(())
    }

    fn delete(&self, _asset: &Metadata) -> Result<()> {
        Ok(())
    }
}
