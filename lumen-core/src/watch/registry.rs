use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{IndexError, Result};
use crate::paths::normalize_path;
use crate::types::{ScanOptions, WatchConfig};
use crate::watch::scheduler::SyncScheduler;
use crate::watch::source::ChangeSourceFactory;
use crate::watch::watcher::FolderWatcher;

/// Active watchers keyed by normalized root.
pub struct WatcherRegistry {
    factory: Arc<dyn ChangeSourceFactory>,
    scheduler: Arc<SyncScheduler>,
    config: WatchConfig,
    watchers: Mutex<HashMap<PathBuf, Arc<FolderWatcher>>>,
}

impl fmt::Debug for WatcherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("WatcherRegistry");
        debug.field("factory", &self.factory).field("config", &self.config);
        match self.watchers.try_lock() {
            Some(guard) => {
                debug.field("watchers", &guard.len());
            }
            None => {
                debug.field("watchers", &"<locked>");
            }
        }
        debug.finish()
    }
}

impl WatcherRegistry {
    pub fn new(
        factory: Arc<dyn ChangeSourceFactory>,
        scheduler: Arc<SyncScheduler>,
        config: WatchConfig,
    ) -> Self {
        Self {
            factory,
            scheduler,
            config,
            watchers: Mutex::new(HashMap::new()),
        }
    }

    /// Watch `root`, or update the options of its existing watcher.
    ///
    /// A new watcher is only visible once its native source is open and its
    /// thread running; when `bootstrap_scan` is set a full rescan is queued
    /// ahead of any incremental pass.
    pub fn ensure(
        &self,
        root: &Path,
        options: Option<ScanOptions>,
    ) -> Result<Arc<FolderWatcher>> {
        let root = normalize_path(root);
        if let Some(existing) = self.watchers.lock().get(&root).cloned() {
            if let Some(options) = options {
                existing.set_options(options);
                debug!(
                    target: "watch::registry",
                    root = %root.display(),
                    "watcher options replaced"
                );
            }
            return Ok(existing);
        }

        let meta = fs::metadata(&root)
            .map_err(|err| IndexError::from_io(&root, err))?;
        if !meta.is_dir() {
            return Err(IndexError::NotADirectory(root));
        }

        let explicit = options.is_some();
        let options = options.unwrap_or_default();
        let source = self.factory.open(&root)?;
        let watcher = Arc::new(FolderWatcher::start(
            root.clone(),
            options.clone(),
            source,
            Arc::clone(&self.scheduler),
            self.config,
        )?);

        let mut guard = self.watchers.lock();
        if let Some(existing) = guard.get(&root).cloned() {
            drop(guard);
            // Lost the race: adopt the registered watcher.
            watcher.stop();
            if explicit {
                existing.set_options(options);
            }
            return Ok(existing);
        }
        guard.insert(root.clone(), Arc::clone(&watcher));
        drop(guard);

        info!(
            target: "watch::registry",
            root = %root.display(),
            bootstrap = options.bootstrap_scan,
            "watcher registered"
        );
        if options.bootstrap_scan {
            watcher.request_full_rescan();
        }
        Ok(watcher)
    }

    /// Stop and forget the watcher of `root`. Returns whether one existed.
    pub fn stop(&self, root: &Path) -> bool {
        let removed = self.watchers.lock().remove(&normalize_path(root));
        match removed {
            Some(watcher) => {
                watcher.stop();
                true
            }
            None => false,
        }
    }

    /// Stop every watcher. The registry lock is released before any watcher
    /// thread is joined.
    pub fn stop_all(&self) {
        let watchers: Vec<_> = {
            let mut guard = self.watchers.lock();
            guard.drain().map(|(_, watcher)| watcher).collect()
        };
        for watcher in &watchers {
            watcher.stop();
        }
        if !watchers.is_empty() {
            info!(
                target: "watch::registry",
                stopped = watchers.len(),
                "all watchers stopped"
            );
        }
    }

    pub fn get(&self, root: &Path) -> Option<Arc<FolderWatcher>> {
        self.watchers.lock().get(&normalize_path(root)).cloned()
    }

    pub fn roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<_> = self.watchers.lock().keys().cloned().collect();
        roots.sort();
        roots
    }
}

impl Drop for WatcherRegistry {
    fn drop(&mut self) {
        self.stop_all();
    }
}
