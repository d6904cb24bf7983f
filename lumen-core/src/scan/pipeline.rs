//! Full and incremental index passes.
//!
//! Both passes share the same tail: analyze → resolve hashes → build
//! folder map → process → persist. They differ in how candidates and the
//! comparison snapshot are gathered and in what gets deleted.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::error::{IndexError, Result};
use crate::paths::normalize_path;
use crate::ports::{AssetRepository, ThumbnailService};
use crate::runtime::WorkerPool;
use crate::scan::analyzer::ChangeAnalyzer;
use crate::scan::hashing::HashingPool;
use crate::scan::ignore::{IgnoreMatcher, IgnoreRuleSource};
use crate::scan::path_scanner;
use crate::scan::processor::{
    AssetProcessor, BuiltAsset, CodecProvider, FolderMapping,
};
use crate::types::{
    AssetId, AssetRecord, DeleteMode, FileAnalysisResult, FileStatus,
    FileSystemInfo, IndexSnapshot, Metadata, PipelineConfig, ScanOptions,
    ScanResult, is_supported_extension,
};

/// Collaborators a pipeline is assembled from.
#[derive(Debug, Clone)]
pub struct PipelineParts {
    pub repository: Arc<dyn AssetRepository>,
    pub ignore_rules: Arc<dyn IgnoreRuleSource>,
    pub thumbnails: Arc<dyn ThumbnailService>,
    pub codecs: Arc<dyn CodecProvider>,
    pub pool: Arc<dyn WorkerPool>,
}

/// Runs index passes for any root. Cheap to clone and safe to share across
/// watcher threads.
#[derive(Debug, Clone)]
pub struct IndexPipeline {
    repository: Arc<dyn AssetRepository>,
    ignore_rules: Arc<dyn IgnoreRuleSource>,
    thumbnails: Arc<dyn ThumbnailService>,
    analyzer: ChangeAnalyzer,
    processor: AssetProcessor,
    pool: Arc<dyn WorkerPool>,
    config: PipelineConfig,
}

impl IndexPipeline {
    pub fn new(parts: PipelineParts, config: PipelineConfig) -> Self {
        let analyzer = ChangeAnalyzer::new(HashingPool::new(
            Arc::clone(&parts.pool),
            config.hash_batch_size,
        ));
        let processor = AssetProcessor::new(
            Arc::clone(&parts.pool),
            parts.codecs,
            Arc::clone(&parts.thumbnails),
            config.process_batch_size,
        );
        Self {
            repository: parts.repository,
            ignore_rules: parts.ignore_rules,
            thumbnails: parts.thumbnails,
            analyzer,
            processor,
            pool: parts.pool,
            config,
        }
    }

    pub fn repository(&self) -> &Arc<dyn AssetRepository> {
        &self.repository
    }

    pub fn pool(&self) -> &Arc<dyn WorkerPool> {
        &self.pool
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Walk `root` and reconcile the index with what is on disk.
    ///
    /// Index entries under the root that the walk no longer produced are
    /// deleted, except below entries the walk could not read.
    pub fn full_scan(
        &self,
        root: &Path,
        options: &ScanOptions,
    ) -> Result<ScanResult> {
        let started = Instant::now();
        let root = normalize_path(root);
        let mut result = ScanResult::new(root.clone(), true);

        let ignore = self.load_ignore(&root)?;
        let listing = path_scanner::scan(
            &root,
            &ignore,
            &options.extension_set(),
            options.recursive,
        )?;
        let unreadable: Vec<PathBuf> = listing
            .skipped
            .iter()
            .filter_map(|issue| issue.path.clone())
            .collect();
        result.errors.extend(listing.skipped);

        let snapshot = self.repository.load_index_snapshot()?;
        let seen: HashSet<PathBuf> =
            listing.files.iter().map(|file| file.path.clone()).collect();
        result.total = listing.files.len();

        self.index_files(listing.files, &snapshot, options, &mut result)?;

        let stale: Vec<&Metadata> = snapshot
            .iter()
            .filter(|meta| {
                is_within_scope(&meta.filepath, &root, options.recursive)
            })
            .filter(|meta| !seen.contains(&meta.filepath))
            .filter(|meta| {
                !unreadable.iter().any(|p| meta.filepath.starts_with(p))
            })
            .collect();
        for meta in stale {
            self.delete_indexed(meta, options.delete_mode, &mut result);
        }

        result.duration = started.elapsed();
        info!(
            target: "scan::pipeline",
            root = %root.display(),
            total = result.total,
            new = result.new,
            updated = result.updated,
            unchanged = result.unchanged,
            deleted = result.deleted,
            hashed = result.hashed,
            errors = result.errors.len(),
            duration_ms = result.duration.as_millis() as u64,
            "full scan finished"
        );
        Ok(result)
    }

    /// Apply an incremental change set under `root`: every remove first,
    /// then every upsert.
    pub fn sync_paths(
        &self,
        root: &Path,
        removes: Vec<PathBuf>,
        upserts: Vec<PathBuf>,
        options: &ScanOptions,
    ) -> Result<ScanResult> {
        let started = Instant::now();
        let root = normalize_path(root);
        let root_meta =
            fs::metadata(&root).map_err(|err| IndexError::from_io(&root, err))?;
        if !root_meta.is_dir() {
            return Err(IndexError::NotADirectory(root));
        }
        let mut result = ScanResult::new(root.clone(), false);

        for path in removes {
            let path = normalize_path(&path);
            self.remove_path(&root, &path, options, &mut result);
        }

        let ignore = self.load_ignore(&root)?;
        let extensions = options.extension_set();
        let mut candidates = Vec::new();
        for path in upserts {
            let path = normalize_path(&path);
            if !is_within_scope(&path, &root, options.recursive) {
                continue;
            }
            let meta = match fs::symlink_metadata(&path) {
                Ok(meta) => meta,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    self.remove_path(&root, &path, options, &mut result);
                    continue;
                }
                Err(err) => {
                    let err = IndexError::from_io(&path, err);
                    warn!(
                        target: "scan::pipeline",
                        error = %err,
                        "cannot stat changed path"
                    );
                    result.push_error(err);
                    continue;
                }
            };
            if !meta.is_file()
                || !is_supported_extension(&path, &extensions)
                || ignore.is_ignored(&path, &root)
            {
                continue;
            }
            candidates.push(FileSystemInfo::from_metadata(path, &meta));
        }

        let mut snapshot = IndexSnapshot::new();
        let mut lookups_ok = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match self.repository.get_by_path(&candidate.path) {
                Ok(existing) => {
                    if let Some(existing) = existing {
                        snapshot.insert(existing);
                    }
                    lookups_ok.push(candidate);
                }
                Err(err) => {
                    error!(
                        target: "scan::pipeline",
                        path = %candidate.path.display(),
                        error = %err,
                        "index lookup failed"
                    );
                    result.push_error(err);
                }
            }
        }
        result.total = lookups_ok.len();

        self.index_files(lookups_ok, &snapshot, options, &mut result)?;

        result.duration = started.elapsed();
        info!(
            target: "scan::pipeline",
            root = %root.display(),
            total = result.total,
            new = result.new,
            updated = result.updated,
            unchanged = result.unchanged,
            deleted = result.deleted,
            hashed = result.hashed,
            errors = result.errors.len(),
            duration_ms = result.duration.as_millis() as u64,
            "incremental sync finished"
        );
        Ok(result)
    }

    fn load_ignore(&self, root: &Path) -> Result<IgnoreMatcher> {
        let folder = self.repository.folder_by_path(root)?;
        IgnoreMatcher::load(self.ignore_rules.as_ref(), folder)
    }

    fn index_files(
        &self,
        files: Vec<FileSystemInfo>,
        snapshot: &IndexSnapshot,
        options: &ScanOptions,
        result: &mut ScanResult,
    ) -> Result<()> {
        let mut analysis = self.analyzer.analyze(files, snapshot);
        let resolution = self.analyzer.resolve_hashes(&mut analysis)?;
        result.hashed += resolution.hashed;
        for failure in resolution.failures {
            result.push_error(failure);
        }
        result.unchanged += analysis
            .iter()
            .filter(|item| item.status == FileStatus::Unchanged)
            .count();

        let pending: Vec<FileAnalysisResult> = analysis
            .into_iter()
            .filter(FileAnalysisResult::needs_processing)
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        let (folders, folder_errors) = FolderMapping::build(
            self.repository.as_ref(),
            pending.iter().map(|item| item.file_info.path.as_path()),
        );
        for err in folder_errors {
            result.push_error(err);
        }

        let outcome =
            self.processor.process(pending, Arc::new(folders), options)?;
        for err in outcome.errors {
            result.push_error(err);
        }
        self.persist(outcome.assets, result);
        Ok(())
    }

    /// Write built records in chunks. A failed chunk is recorded and its
    /// items are not counted; chunks already written stay written.
    fn persist(&self, assets: Vec<BuiltAsset>, result: &mut ScanResult) {
        let mut creates: Vec<AssetRecord> = Vec::new();
        let mut updates: Vec<(AssetId, AssetRecord)> = Vec::new();
        for asset in assets {
            match asset.existing {
                Some(id) => updates.push((id, asset.record)),
                None => creates.push(asset.record),
            }
        }

        let chunk_size = self.config.persist_batch_size.max(1);
        for chunk in creates.chunks(chunk_size) {
            match self.repository.batch_create(chunk) {
                Ok(ids) => result.new += ids.len(),
                Err(err) => {
                    error!(
                        target: "scan::pipeline",
                        items = chunk.len(),
                        error = %err,
                        "batch create failed"
                    );
                    result.push_error(err);
                }
            }
        }
        for chunk in updates.chunks(chunk_size) {
            match self.repository.batch_update(chunk) {
                Ok(()) => result.updated += chunk.len(),
                Err(err) => {
                    error!(
                        target: "scan::pipeline",
                        items = chunk.len(),
                        error = %err,
                        "batch update failed"
                    );
                    result.push_error(err);
                }
            }
        }
        debug!(
            target: "scan::pipeline",
            created = result.new,
            updated = result.updated,
            "persisted built assets"
        );
    }

    /// Delete the asset at `path`. A vanished path with no asset of its own
    /// was a directory, and everything indexed below it goes instead.
    fn remove_path(
        &self,
        root: &Path,
        path: &Path,
        options: &ScanOptions,
        result: &mut ScanResult,
    ) {
        match self.repository.get_by_path(path) {
            Ok(Some(meta)) => {
                self.delete_indexed(&meta, options.delete_mode, result)
            }
            Ok(None) => self.remove_subtree(root, path, options, result),
            Err(err) => {
                error!(
                    target: "scan::pipeline",
                    path = %path.display(),
                    error = %err,
                    "index lookup failed"
                );
                result.push_error(err);
            }
        }
    }

    fn remove_subtree(
        &self,
        root: &Path,
        dir: &Path,
        options: &ScanOptions,
        result: &mut ScanResult,
    ) {
        // A path that exists again is handled by the upserts.
        if fs::symlink_metadata(dir).is_ok() {
            return;
        }
        let entries = match self.repository.list_under(dir) {
            Ok(entries) => entries,
            Err(err) => {
                error!(
                    target: "scan::pipeline",
                    path = %dir.display(),
                    error = %err,
                    "index lookup failed"
                );
                result.push_error(err);
                return;
            }
        };
        if entries.is_empty() {
            return;
        }
        debug!(
            target: "scan::pipeline",
            path = %dir.display(),
            assets = entries.len(),
            "removed path was a directory"
        );
        for meta in entries.iter().filter(|meta| {
            is_within_scope(&meta.filepath, root, options.recursive)
        }) {
            self.delete_indexed(meta, options.delete_mode, result);
        }
    }

    fn delete_indexed(
        &self,
        meta: &Metadata,
        mode: DeleteMode,
        result: &mut ScanResult,
    ) {
        let deleted = match mode {
            DeleteMode::Soft => self.repository.soft_delete(meta.id),
            DeleteMode::Hard => self.repository.hard_delete(meta.id),
        };
        if let Err(err) = deleted {
            error!(
                target: "scan::pipeline",
                path = %meta.filepath.display(),
                error = %err,
                "delete failed"
            );
            result.push_error(err);
            return;
        }
        result.deleted += 1;
        if let Err(err) = self.thumbnails.delete(meta) {
            warn!(
                target: "scan::pipeline",
                path = %meta.filepath.display(),
                error = %err,
                "thumbnail cleanup failed"
            );
        }
    }
}

/// Whether `path` belongs to a scan of `root`: anywhere below it when
/// recursive, direct children only otherwise.
fn is_within_scope(path: &Path, root: &Path, recursive: bool) -> bool {
    if recursive {
        path != root && path.starts_with(root)
    } else {
        path.parent() == Some(root)
    }
}
