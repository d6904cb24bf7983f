use serde::{Serialize, Serializer};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ErrorKind, IndexError};

/// A per-item or per-stage failure recorded during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanIssue {
    pub path: Option<PathBuf>,
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&IndexError> for ScanIssue {
    fn from(err: &IndexError) -> Self {
        Self {
            path: err.path().cloned(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<IndexError> for ScanIssue {
    fn from(err: IndexError) -> Self {
        ScanIssue::from(&err)
    }
}

/// Outcome of one full or incremental pass over a root.
///
/// Passes never fail as a whole because of a single file: counts report what
/// was applied and `errors` lists everything that was skipped.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanResult {
    pub root: PathBuf,
    pub full_rescan: bool,
    /// Candidate files considered by the pass.
    pub total: usize,
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    /// Content hashes computed during the pass.
    pub hashed: usize,
    #[serde(serialize_with = "serialize_duration_ms", rename = "duration_ms")]
    pub duration: Duration,
    pub errors: Vec<ScanIssue>,
}

impl ScanResult {
    pub fn new(root: PathBuf, full_rescan: bool) -> Self {
        Self {
            root,
            full_rescan,
            ..Self::default()
        }
    }

    /// Whether the pass touched the index at all.
    pub fn has_changes(&self) -> bool {
        self.new + self.updated + self.deleted > 0
    }

    pub fn push_error(&mut self, err: impl Into<ScanIssue>) {
        self.errors.push(err.into());
    }
}

fn serialize_duration_ms<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}
