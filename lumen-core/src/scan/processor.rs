//! Builds [`AssetRecord`]s for new and modified files.
//!
//! Records are built in parallel batches. Each batch acquires its own codec
//! from the [`CodecProvider`] and drops it when the batch ends.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::ImageReader;
use tracing::{debug, warn};

use crate::error::{IndexError, Result};
use crate::ports::{AssetRepository, ThumbnailService};
use crate::runtime::{WorkerPool, run_chunked};
use crate::types::{
    AssetId, AssetRecord, AssetType, FileAnalysisResult, FolderId, GENERIC_MIME,
    ScanOptions, mime_for_extension,
};

/// Header-level facts about an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageProbe {
    pub width: u32,
    pub height: u32,
    pub mime: String,
}

/// Reads image headers. One instance is used by a single batch at a time.
pub trait ImageCodec: Send {
    fn probe(&mut self, path: &Path) -> Result<ImageProbe>;
}

/// Hands out codec instances, one per processing batch.
pub trait CodecProvider: Send + Sync + fmt::Debug {
    fn acquire(&self) -> Box<dyn ImageCodec>;
}

/// [`CodecProvider`] backed by the `image` crate's format detection and
/// header decoding.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCrateCodecs;

impl CodecProvider for ImageCrateCodecs {
    fn acquire(&self) -> Box<dyn ImageCodec> {
        Box::new(ImageCrateCodec)
    }
}

struct ImageCrateCodec;

impl ImageCodec for ImageCrateCodec {
    fn probe(&mut self, path: &Path) -> Result<ImageProbe> {
        let format_err = |message: String| IndexError::Format {
            path: path.to_path_buf(),
            message,
        };

        let reader = ImageReader::open(path)
            .map_err(|err| IndexError::from_io(path, err))?
            .with_guessed_format()
            .map_err(|err| IndexError::from_io(path, err))?;
        let mime = reader
            .format()
            .map(|format| format.to_mime_type().to_string())
            .ok_or_else(|| {
                format_err("unrecognized image format".to_string())
            })?;
        let (width, height) = reader
            .into_dimensions()
            .map_err(|err| format_err(err.to_string()))?;

        Ok(ImageProbe {
            width,
            height,
            mime,
        })
    }
}

/// Parent directory to folder id, resolved before the parallel phase.
#[derive(Debug, Default, Clone)]
pub struct FolderMapping {
    folders: HashMap<PathBuf, FolderId>,
}

impl FolderMapping {
    /// Resolve (creating as needed) the folder of every parent directory of
    /// `paths`. Directories whose folder cannot be resolved are left out and
    /// reported; their assets are built without a folder.
    pub fn build<'a>(
        repository: &dyn AssetRepository,
        paths: impl IntoIterator<Item = &'a Path>,
    ) -> (Self, Vec<IndexError>) {
        let parents: BTreeSet<&Path> =
            paths.into_iter().filter_map(Path::parent).collect();

        let mut mapping = Self::default();
        let mut errors = Vec::new();
        for parent in parents {
            match repository.ensure_folder(parent) {
                Ok(id) => {
                    mapping.folders.insert(parent.to_path_buf(), id);
                }
                Err(err) => {
                    warn!(
                        target: "scan::process",
                        folder = %parent.display(),
                        error = %err,
                        "folder resolution failed"
                    );
                    errors.push(err);
                }
            }
        }
        (mapping, errors)
    }

    pub fn folder_for(&self, path: &Path) -> Option<FolderId> {
        path.parent().and_then(|parent| self.folders.get(parent).copied())
    }

    pub fn len(&self) -> usize {
        self.folders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }
}

/// A record ready to persist. `existing` is set for modified files.
#[derive(Debug, Clone)]
pub struct BuiltAsset {
    pub existing: Option<AssetId>,
    pub record: AssetRecord,
}

/// Output of [`AssetProcessor::process`].
#[derive(Debug, Default)]
pub struct ProcessOutcome {
    pub assets: Vec<BuiltAsset>,
    pub errors: Vec<IndexError>,
}

/// Build one record from an analyzed file.
pub fn build_asset(
    analysis: &FileAnalysisResult,
    folders: &FolderMapping,
    codec: &mut dyn ImageCodec,
) -> Result<BuiltAsset> {
    let info = &analysis.file_info;
    let path = info.path.as_path();
    let hash = info.hash.clone().ok_or_else(|| IndexError::Hash {
        path: path.to_path_buf(),
        message: "content hash unavailable".to_string(),
    })?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| IndexError::Format {
            path: path.to_path_buf(),
            message: "path has no file name".to_string(),
        })?;

    let asset_type = AssetType::from_path(path);
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    let (width, height, mime) = match asset_type {
        AssetType::Photo => match codec.probe(path) {
            Ok(probe) => (probe.width, probe.height, probe.mime),
            Err(err) => {
                warn!(
                    target: "scan::process",
                    path = %path.display(),
                    error = %err,
                    "image probe failed, storing without dimensions"
                );
                (0, 0, GENERIC_MIME.to_string())
            }
        },
        AssetType::Video => (0, 0, mime_for_extension(&extension).to_string()),
        AssetType::Unknown => (0, 0, GENERIC_MIME.to_string()),
    };

    Ok(BuiltAsset {
        existing: analysis.existing_metadata.as_ref().map(|meta| meta.id),
        record: AssetRecord {
            filename,
            path: path.to_path_buf(),
            asset_type,
            size: info.size,
            hash,
            created_ms: info.created_ms,
            modified_ms: info.modified_ms,
            folder_id: folders.folder_for(path),
            width,
            height,
            mime,
        },
    })
}

/// Parallel record builder.
#[derive(Debug, Clone)]
pub struct AssetProcessor {
    pool: Arc<dyn WorkerPool>,
    codecs: Arc<dyn CodecProvider>,
    thumbnails: Arc<dyn ThumbnailService>,
    batch_size: usize,
}

impl AssetProcessor {
    pub fn new(
        pool: Arc<dyn WorkerPool>,
        codecs: Arc<dyn CodecProvider>,
        thumbnails: Arc<dyn ThumbnailService>,
        batch_size: usize,
    ) -> Self {
        Self {
            pool,
            codecs,
            thumbnails,
            batch_size: batch_size.max(1),
        }
    }

    /// Build records for every item that needs processing.
    ///
    /// Items that are unchanged or lack a hash are skipped. Per-item failures
    /// land in [`ProcessOutcome::errors`] without affecting siblings; the
    /// call fails only when the pool rejects a batch.
    pub fn process(
        &self,
        items: Vec<FileAnalysisResult>,
        folders: Arc<FolderMapping>,
        options: &ScanOptions,
    ) -> Result<ProcessOutcome> {
        let items: Vec<_> = items
            .into_iter()
            .filter(FileAnalysisResult::needs_processing)
            .collect();
        if items.is_empty() {
            return Ok(ProcessOutcome::default());
        }

        let requested = items.len();
        let codecs = Arc::clone(&self.codecs);
        let thumbnails = Arc::clone(&self.thumbnails);
        let thumbnail_size = options
            .generate_thumbnails
            .then_some(options.thumbnail_size);

        let built = run_chunked(
            self.pool.as_ref(),
            items,
            self.batch_size,
            move |base, batch| {
                let mut codec = codecs.acquire();
                let built: Vec<Result<BuiltAsset>> = batch
                    .iter()
                    .map(|item| {
                        let asset =
                            build_asset(item, &folders, codec.as_mut())?;
                        if let Some(size) = thumbnail_size {
                            generate_thumbnail(
                                thumbnails.as_ref(),
                                &asset.record,
                                size,
                            );
                        }
                        Ok(asset)
                    })
                    .collect();
                debug!(
                    target: "scan::process",
                    base,
                    items = built.len(),
                    "processing batch finished"
                );
                built
            },
        )?;

        let mut outcome = ProcessOutcome::default();
        for asset in built {
            match asset {
                Ok(asset) => outcome.assets.push(asset),
                Err(err) => {
                    warn!(
                        target: "scan::process",
                        error = %err,
                        "asset build failed"
                    );
                    outcome.errors.push(err);
                }
            }
        }

        debug!(
            target: "scan::process",
            requested,
            built = outcome.assets.len(),
            failed = outcome.errors.len(),
            "processing finished"
        );
        Ok(outcome)
    }
}

fn generate_thumbnail(
    thumbnails: &dyn ThumbnailService,
    record: &AssetRecord,
    size: u32,
) {
    if record.asset_type == AssetType::Unknown {
        return;
    }
    if let Err(err) = thumbnails.generate(&record.path, &record.hash, size) {
        warn!(
            target: "scan::process",
            path = %record.path.display(),
            error = %err,
            "thumbnail generation failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{InMemoryRepository, NoopThumbnails};
    use crate::runtime::{PoolConfig, RayonWorkerPool};
    use crate::types::{FileStatus, FileSystemInfo, Metadata};
    use parking_lot::Mutex;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn pool() -> Arc<dyn WorkerPool> {
        Arc::new(RayonWorkerPool::new(PoolConfig::default()).unwrap())
    }

    fn analysis(
        path: &Path,
        status: FileStatus,
        hash: Option<&str>,
    ) -> FileAnalysisResult {
        FileAnalysisResult {
            file_info: FileSystemInfo {
                path: path.to_path_buf(),
                size: 3,
                modified_ms: 20,
                created_ms: 10,
                hash: hash.map(str::to_string),
            },
            status,
            existing_metadata: None,
        }
    }

    #[derive(Debug, Default)]
    struct CountingCodecs {
        acquired: AtomicUsize,
    }

    struct FixedCodec;

    impl ImageCodec for FixedCodec {
        fn probe(&mut self, _path: &Path) -> Result<ImageProbe> {
            Ok(ImageProbe {
                width: 640,
                height: 480,
                mime: "image/jpeg".to_string(),
            })
        }
    }

    impl CodecProvider for CountingCodecs {
        fn acquire(&self) -> Box<dyn ImageCodec> {
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Box::new(FixedCodec)
        }
    }

    #[derive(Debug, Default)]
    struct RecordingThumbnails {
        generated: Mutex<Vec<(PathBuf, String, u32)>>,
    }

    impl ThumbnailService for RecordingThumbnails {
        fn generate(&self, path: &Path, hash: &str, size: u32) -> Result<()> {
            self.generated
                .lock()
                .push((path.to_path_buf(), hash.to_string(), size));
            Err(IndexError::Persistence("thumbnail store offline".into()))
        }

        fn delete(&self, _asset: &Metadata) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn builds_records_with_folders_and_header_dimensions() {
        let repo = InMemoryRepository::new();
        let a = PathBuf::from("/photos/trip/a.jpg");
        let b = PathBuf::from("/photos/trip/b.mp4");
        let (folders, errors) =
            FolderMapping::build(&repo, [a.as_path(), b.as_path()]);
        assert!(errors.is_empty());
        assert_eq!(folders.len(), 1);

        let codecs = Arc::new(CountingCodecs::default());
        let processor = AssetProcessor::new(
            pool(),
            codecs.clone(),
            Arc::new(NoopThumbnails),
            1,
        );
        let outcome = processor
            .process(
                vec![
                    analysis(&a, FileStatus::New, Some("h-a")),
                    analysis(&b, FileStatus::New, Some("h-b")),
                    analysis(
                        Path::new("/photos/c.jpg"),
                        FileStatus::Unchanged,
                        Some("h-c"),
                    ),
                ],
                Arc::new(folders),
                &ScanOptions::default(),
            )
            .unwrap();

        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.assets.len(), 2);
        // One codec per batch of one item.
        assert_eq!(codecs.acquired.load(Ordering::SeqCst), 2);

        let photo = outcome
            .assets
            .iter()
            .find(|asset| asset.record.path == a)
            .unwrap();
        assert_eq!((photo.record.width, photo.record.height), (640, 480));
        assert_eq!(photo.record.created_ms, 10);
        assert_eq!(photo.record.modified_ms, 20);
        assert_eq!(
            photo.record.folder_id,
            repo.folder_by_path(Path::new("/photos/trip")).unwrap()
        );

        let video = outcome
            .assets
            .iter()
            .find(|asset| asset.record.path == b)
            .unwrap();
        assert_eq!(video.record.asset_type, AssetType::Video);
        assert_eq!(video.record.mime, "video/mp4");
    }

    #[test]
    fn unreadable_photo_degrades_to_generic_mime() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        fs::write(&path, b"definitely not a jpeg").unwrap();

        let mut codec = ImageCrateCodecs.acquire();
        let built = build_asset(
            &analysis(&path, FileStatus::New, Some("h")),
            &FolderMapping::default(),
            codec.as_mut(),
        )
        .unwrap();

        assert_eq!(built.record.width, 0);
        assert_eq!(built.record.height, 0);
        assert_eq!(built.record.mime, GENERIC_MIME);
        assert!(built.record.folder_id.is_none());
    }

    #[test]
    fn reads_real_png_headers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pixel.png");
        image::RgbImage::new(3, 2).save(&path).unwrap();

        let probe = ImageCrateCodecs.acquire().probe(&path).unwrap();
        assert_eq!((probe.width, probe.height), (3, 2));
        assert_eq!(probe.mime, "image/png");
    }

    #[test]
    fn thumbnail_failures_do_not_fail_the_asset() {
        let thumbnails = Arc::new(RecordingThumbnails::default());
        let processor = AssetProcessor::new(
            pool(),
            Arc::new(CountingCodecs::default()),
            thumbnails.clone(),
            16,
        );
        let path = PathBuf::from("/photos/a.jpg");
        let outcome = processor
            .process(
                vec![analysis(&path, FileStatus::Modified, Some("h-a"))],
                Arc::new(FolderMapping::default()),
                &ScanOptions::default(),
            )
            .unwrap();

        assert_eq!(outcome.assets.len(), 1);
        assert!(outcome.errors.is_empty());
        let generated = thumbnails.generated.lock();
        assert_eq!(generated.as_slice(), &[(path, "h-a".to_string(), 400)]);
    }

    #[test]
    fn missing_hash_is_reported_not_built() {
        let mut codec = ImageCrateCodecs.acquire();
        let err = build_asset(
            &analysis(Path::new("/photos/a.jpg"), FileStatus::New, None),
            &FolderMapping::default(),
            codec.as_mut(),
        )
        .unwrap_err();
        assert!(matches!(err, IndexError::Hash { .. }));
    }
}
