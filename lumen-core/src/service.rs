use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::error::Result;
use crate::ports::{ChangeNotifier, GalleryChanged};
use crate::scan::IndexPipeline;
use crate::types::{ScanOptions, ScanResult, WatchConfig};
use crate::watch::{
    ChangeSourceFactory, FolderWatcher, SyncScheduler, WatcherRegistry,
};

/// Entry point tying one-shot scans, watchers and change notifications
/// together.
pub struct IndexService {
    pipeline: IndexPipeline,
    registry: WatcherRegistry,
    notifier: ChangeNotifier,
}

impl fmt::Debug for IndexService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexService")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl IndexService {
    pub fn new(
        pipeline: IndexPipeline,
        sources: Arc<dyn ChangeSourceFactory>,
        watch: WatchConfig,
    ) -> Self {
        let notifier = ChangeNotifier::new();
        let scheduler =
            Arc::new(SyncScheduler::new(pipeline.clone(), notifier.clone()));
        Self {
            registry: WatcherRegistry::new(sources, scheduler, watch),
            pipeline,
            notifier,
        }
    }

    /// Start watching `root`, or replace the options of its watcher.
    pub fn ensure_watcher(
        &self,
        root: &Path,
        options: Option<ScanOptions>,
    ) -> Result<Arc<FolderWatcher>> {
        self.registry.ensure(root, options)
    }

    pub fn stop_watcher(&self, root: &Path) -> bool {
        self.registry.stop(root)
    }

    pub fn stop_all_watchers(&self) {
        self.registry.stop_all();
    }

    pub fn watcher(&self, root: &Path) -> Option<Arc<FolderWatcher>> {
        self.registry.get(root)
    }

    pub fn watched_roots(&self) -> Vec<PathBuf> {
        self.registry.roots()
    }

    /// Full scan of `root` outside any watcher. Subscribers are notified
    /// when the index changed.
    pub fn scan_once(
        &self,
        root: &Path,
        options: &ScanOptions,
    ) -> Result<ScanResult> {
        let result = self.pipeline.full_scan(root, options)?;
        if result.has_changes() {
            self.notifier.notify();
        }
        Ok(result)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GalleryChanged> {
        self.notifier.subscribe()
    }

    pub fn pipeline(&self) -> &IndexPipeline {
        &self.pipeline
    }
}
