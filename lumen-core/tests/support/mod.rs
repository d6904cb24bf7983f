//! Fixtures shared by the lumen-core integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use lumen_core::Result;
use lumen_core::ports::{AssetRepository, InMemoryRepository, ThumbnailService};
use lumen_core::runtime::{PoolConfig, RayonWorkerPool, WorkerPool};
use lumen_core::scan::{
    ImageCrateCodecs, IndexPipeline, PipelineParts, StaticIgnoreRules,
};
use lumen_core::types::{
    AssetId, AssetRecord, FolderId, IndexSnapshot, Metadata, PipelineConfig,
};

/// Debounce used by watcher tests.
pub const TEST_DEBOUNCE: Duration = Duration::from_millis(60);

pub fn pool() -> Arc<dyn WorkerPool> {
    Arc::new(
        RayonWorkerPool::new(PoolConfig {
            threads: 4,
            max_queued: 1024,
        })
        .expect("worker pool"),
    )
}

/// Counts thumbnail requests per path.
#[derive(Debug, Default)]
pub struct RecordingThumbnails {
    pub generated: Mutex<Vec<PathBuf>>,
    pub deleted: Mutex<Vec<PathBuf>>,
}

impl RecordingThumbnails {
    pub fn generated_for(&self, path: &Path) -> usize {
        self.generated
            .lock()
            .iter()
            .filter(|p| p.as_path() == path)
            .count()
    }
}

impl ThumbnailService for RecordingThumbnails {
    fn generate(&self, path: &Path, _hash: &str, _size: u32) -> Result<()> {
        self.generated.lock().push(path.to_path_buf());
        Ok(())
    }

    fn delete(&self, asset: &Metadata) -> Result<()> {
        self.deleted.lock().push(asset.filepath.clone());
        Ok(())
    }
}

/// Repository that slows down lookups and writes and records how many calls
/// ever overlapped.
#[derive(Debug)]
pub struct SlowRepository {
    pub inner: InMemoryRepository,
    delay: Duration,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl SlowRepository {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: InMemoryRepository::new(),
            delay,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    fn slow<T>(&self, call: impl FnOnce() -> T) -> T {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        thread::sleep(self.delay);
        let out = call();
        self.active.fetch_sub(1, Ordering::SeqCst);
        out
    }
}

impl AssetRepository for SlowRepository {
    fn load_index_snapshot(&self) -> Result<IndexSnapshot> {
        self.slow(|| self.inner.load_index_snapshot())
    }

    fn get_by_path(&self, path: &Path) -> Result<Option<Metadata>> {
        self.slow(|| self.inner.get_by_path(path))
    }

    fn get_by_id(&self, id: AssetId) -> Result<Option<Metadata>> {
        self.inner.get_by_id(id)
    }

    fn batch_create(&self, assets: &[AssetRecord]) -> Result<Vec<AssetId>> {
        self.slow(|| self.inner.batch_create(assets))
    }

    fn batch_update(&self, assets: &[(AssetId, AssetRecord)]) -> Result<()> {
        self.slow(|| self.inner.batch_update(assets))
    }

    fn soft_delete(&self, id: AssetId) -> Result<()> {
        self.inner.soft_delete(id)
    }

    fn hard_delete(&self, id: AssetId) -> Result<()> {
        self.inner.hard_delete(id)
    }

    fn folder_by_path(&self, path: &Path) -> Result<Option<FolderId>> {
        self.inner.folder_by_path(path)
    }

    fn create_folder(&self, path: &Path) -> Result<FolderId> {
        self.inner.create_folder(path)
    }
}

pub struct Harness {
    pub repository: Arc<InMemoryRepository>,
    pub rules: Arc<StaticIgnoreRules>,
    pub thumbnails: Arc<RecordingThumbnails>,
    pub pipeline: IndexPipeline,
}

pub fn harness() -> Harness {
    let repository = Arc::new(InMemoryRepository::new());
    let rules = Arc::new(StaticIgnoreRules::new());
    let thumbnails = Arc::new(RecordingThumbnails::default());
    let pipeline =
        pipeline_with(repository.clone(), rules.clone(), thumbnails.clone());
    Harness {
        repository,
        rules,
        thumbnails,
        pipeline,
    }
}

pub fn pipeline_with(
    repository: Arc<dyn AssetRepository>,
    rules: Arc<StaticIgnoreRules>,
    thumbnails: Arc<RecordingThumbnails>,
) -> IndexPipeline {
    IndexPipeline::new(
        PipelineParts {
            repository,
            ignore_rules: rules,
            thumbnails,
            codecs: Arc::new(ImageCrateCodecs),
            pool: pool(),
        },
        PipelineConfig::default(),
    )
}

/// Pipeline with default rules that runs on the given `pool`.
pub fn pipeline_on(
    repository: Arc<dyn AssetRepository>,
    pool: Arc<dyn WorkerPool>,
) -> IndexPipeline {
    IndexPipeline::new(
        PipelineParts {
            repository,
            ignore_rules: Arc::new(StaticIgnoreRules::new()),
            thumbnails: Arc::new(RecordingThumbnails::default()),
            codecs: Arc::new(ImageCrateCodecs),
            pool,
        },
        PipelineConfig::default(),
    )
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(
    timeout: Duration,
    mut condition: impl FnMut() -> bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}
