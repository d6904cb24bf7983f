use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::watch::source::RawChange;

/// Per-path intent accumulated between sync passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    Upsert,
    Remove,
}

/// Work drained by one sync pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PendingBatch {
    pub full_rescan: bool,
    pub removes: Vec<PathBuf>,
    pub upserts: Vec<PathBuf>,
}

impl PendingBatch {
    pub fn is_empty(&self) -> bool {
        !self.full_rescan && self.removes.is_empty() && self.upserts.is_empty()
    }
}

/// Coalesced change set of one watched root.
///
/// The last action recorded for a path wins. Once a full rescan is
/// required, per-path entries are dropped until the set is drained.
#[derive(Debug, Default)]
pub struct PendingChanges {
    full_rescan: bool,
    entries: HashMap<PathBuf, (u64, PendingAction)>,
    sequence: u64,
}

impl PendingChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, path: PathBuf, action: PendingAction) {
        if self.full_rescan {
            return;
        }
        self.sequence += 1;
        self.entries.insert(path, (self.sequence, action));
    }

    pub fn require_full_rescan(&mut self) {
        self.full_rescan = true;
        self.entries.clear();
    }

    /// Fold a batch of raw changes in. Any directory-level change escalates
    /// to a full rescan.
    pub fn absorb(&mut self, changes: Vec<RawChange>) {
        if changes.iter().any(|change| change.is_directory) {
            self.require_full_rescan();
            return;
        }
        for change in changes {
            let action = if change.action.is_upsert() {
                PendingAction::Upsert
            } else {
                PendingAction::Remove
            };
            self.record(change.path, action);
        }
    }

    pub fn is_full_rescan(&self) -> bool {
        self.full_rescan
    }

    pub fn is_empty(&self) -> bool {
        !self.full_rescan && self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn action_for(&self, path: &Path) -> Option<PendingAction> {
        self.entries.get(path).map(|(_, action)| *action)
    }

    /// Snapshot and clear. Paths come out in the order their final action
    /// was recorded.
    pub fn take(&mut self) -> PendingBatch {
        let full_rescan = std::mem::take(&mut self.full_rescan);
        let mut entries: Vec<_> = self.entries.drain().collect();
        entries.sort_by_key(|(_, (sequence, _))| *sequence);

        let mut batch = PendingBatch {
            full_rescan,
            ..PendingBatch::default()
        };
        for (path, (_, action)) in entries {
            match action {
                PendingAction::Upsert => batch.upserts.push(path),
                PendingAction::Remove => batch.removes.push(path),
            }
        }
        batch
    }
}
