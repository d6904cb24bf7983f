use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::error::{IndexError, Result};
use crate::types::{AssetId, AssetRecord, FolderId, IndexSnapshot, Metadata};

/// Persistence boundary for the asset index.
///
/// Implementations execute each call on a single connection without a
/// surrounding transaction; callers treat every call independently and
/// report partial failures instead of rolling back.
pub trait AssetRepository: Send + Sync + fmt::Debug {
    /// Every live asset, keyed by normalized path.
    fn load_index_snapshot(&self) -> Result<IndexSnapshot>;

    fn get_by_path(&self, path: &Path) -> Result<Option<Metadata>>;

    /// Live assets anywhere below `dir`.
    fn list_under(&self, dir: &Path) -> Result<Vec<Metadata>> {
        Ok(self
            .load_index_snapshot()?
            .iter()
            .filter(|meta| {
                meta.filepath != dir && meta.filepath.starts_with(dir)
            })
            .cloned()
            .collect())
    }

    fn get_by_id(&self, id: AssetId) -> Result<Option<Metadata>>;

    /// Insert new assets, returning their ids in input order.
    fn batch_create(&self, assets: &[AssetRecord]) -> Result<Vec<AssetId>>;

    fn batch_update(&self, assets: &[(AssetId, AssetRecord)]) -> Result<()>;

    /// Hide an asset while keeping its row.
    fn soft_delete(&self, id: AssetId) -> Result<()>;

    fn hard_delete(&self, id: AssetId) -> Result<()>;

    fn folder_by_path(&self, path: &Path) -> Result<Option<FolderId>>;

    fn create_folder(&self, path: &Path) -> Result<FolderId>;

    /// Folder id for `path`, creating the folder when it is unknown.
    fn ensure_folder(&self, path: &Path) -> Result<FolderId> {
        match self.folder_by_path(path)? {
            Some(id) => Ok(id),
            None => self.create_folder(path),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredAsset {
    record: AssetRecord,
    deleted: bool,
}

impl StoredAsset {
    fn metadata(&self, id: AssetId) -> Metadata {
        Metadata {
            id,
            filepath: self.record.path.clone(),
            size: self.record.size,
            modified_ms: self.record.modified_ms,
            hash: self.record.hash.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct RepositoryState {
    assets: HashMap<AssetId, StoredAsset>,
    live_by_path: HashMap<PathBuf, AssetId>,
    folders: HashMap<PathBuf, FolderId>,
    write_failure: Option<String>,
}

impl RepositoryState {
    fn check_writable(&self) -> Result<()> {
        match &self.write_failure {
            Some(message) => Err(IndexError::Persistence(message.clone())),
            None => Ok(()),
        }
    }
}

/// Thread-safe in-memory [`AssetRepository`], used by tests and the CLI.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: RwLock<RepositoryState>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with `message` (or succeed again
    /// with `None`).
    pub fn set_write_failure(&self, message: Option<String>) {
        self.state.write().write_failure = message;
    }

    /// Live assets, ordered by path.
    pub fn live_assets(&self) -> Vec<(AssetId, AssetRecord)> {
        let state = self.state.read();
        let mut assets: Vec<_> = state
            .live_by_path
            .values()
            .filter_map(|id| {
                state.assets.get(id).map(|stored| (*id, stored.record.clone()))
            })
            .collect();
        assets.sort_by(|a, b| a.1.path.cmp(&b.1.path));
        assets
    }

    pub fn live_count(&self) -> usize {
        self.state.read().live_by_path.len()
    }

    pub fn soft_deleted_count(&self) -> usize {
        self.state
            .read()
            .assets
            .values()
            .filter(|stored| stored.deleted)
            .count()
    }

    pub fn record_by_path(&self, path: &Path) -> Option<AssetRecord> {
        let state = self.state.read();
        state
            .live_by_path
            .get(path)
            .and_then(|id| state.assets.get(id))
            .map(|stored| stored.record.clone())
    }
}

impl AssetRepository for InMemoryRepository {
    fn load_index_snapshot(&self) -> Result<IndexSnapshot> {
        let state = self.state.read();
        Ok(state
            .live_by_path
            .values()
            .filter_map(|id| {
                state.assets.get(id).map(|stored| stored.metadata(*id))
            })
            .collect())
    }

    fn get_by_path(&self, path: &Path) -> Result<Option<Metadata>> {
        let state = self.state.read();
        Ok(state
            .live_by_path
            .get(path)
            .and_then(|id| {
                state.assets.get(id).map(|stored| stored.metadata(*id))
            }))
    }

    fn list_under(&self, dir: &Path) -> Result<Vec<Metadata>> {
        let state = self.state.read();
        Ok(state
            .live_by_path
            .iter()
            .filter(|(path, _)| path.as_path() != dir && path.starts_with(dir))
            .filter_map(|(_, id)| {
                state.assets.get(id).map(|stored| stored.metadata(*id))
            })
            .collect())
    }

    fn get_by_id(&self, id: AssetId) -> Result<Option<Metadata>> {
        let state = self.state.read();
        Ok(state
            .assets
            .get(&id)
            .filter(|stored| !stored.deleted)
            .map(|stored| stored.metadata(id)))
    }

    fn batch_create(&self, assets: &[AssetRecord]) -> Result<Vec<AssetId>> {
        let mut state = self.state.write();
        state.check_writable()?;

        if let Some(duplicate) = assets
            .iter()
            .find(|record| state.live_by_path.contains_key(&record.path))
        {
            return Err(IndexError::Persistence(format!(
                "asset already indexed at {}",
                duplicate.path.display()
            )));
        }

        let mut ids = Vec::with_capacity(assets.len());
        for record in assets {
            let id = AssetId::new();
            state.live_by_path.insert(record.path.clone(), id);
            state.assets.insert(
                id,
                StoredAsset {
                    record: record.clone(),
                    deleted: false,
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    fn batch_update(&self, assets: &[(AssetId, AssetRecord)]) -> Result<()> {
        let mut state = self.state.write();
        state.check_writable()?;

        if let Some((missing, _)) = assets
            .iter()
            .find(|(id, _)| !state.assets.get(id).is_some_and(|s| !s.deleted))
        {
            return Err(IndexError::Persistence(format!(
                "asset {missing} does not exist"
            )));
        }

        for (id, record) in assets {
            if let Some(stored) = state.assets.get_mut(id) {
                let old_path =
                    std::mem::replace(&mut stored.record, record.clone()).path;
                if old_path != record.path {
                    state.live_by_path.remove(&old_path);
                    state.live_by_path.insert(record.path.clone(), *id);
                }
            }
        }
        Ok(())
    }

    fn soft_delete(&self, id: AssetId) -> Result<()> {
        let mut state = self.state.write();
        state.check_writable()?;
        let path = match state.assets.get_mut(&id) {
            Some(stored) => {
                stored.deleted = true;
                stored.record.path.clone()
            }
            None => {
                return Err(IndexError::Persistence(format!(
                    "asset {id} does not exist"
                )));
            }
        };
        if state.live_by_path.get(&path) == Some(&id) {
            state.live_by_path.remove(&path);
        }
        Ok(())
    }

    fn hard_delete(&self, id: AssetId) -> Result<()> {
        let mut state = self.state.write();
        state.check_writable()?;
        let Some(stored) = state.assets.remove(&id) else {
            return Err(IndexError::Persistence(format!(
                "asset {id} does not exist"
            )));
        };
        if state.live_by_path.get(&stored.record.path) == Some(&id) {
            state.live_by_path.remove(&stored.record.path);
        }
        Ok(())
    }

    fn folder_by_path(&self, path: &Path) -> Result<Option<FolderId>> {
        Ok(self.state.read().folders.get(path).copied())
    }

    fn create_folder(&self, path: &Path) -> Result<FolderId> {
        let mut state = self.state.write();
        state.check_writable()?;
        Ok(*state
            .folders
            .entry(path.to_path_buf())
            .or_insert_with(FolderId::new))
    }
}
