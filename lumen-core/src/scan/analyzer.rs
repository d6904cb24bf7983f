//! Two-tier change classification.
//!
//! Size and modification time are compared first; only files whose cheap
//! metadata disagrees with the index (or that are not indexed at all) are
//! hashed. The hash is authoritative: a touched file with identical content
//! resolves to `Unchanged`.

use tracing::debug;

use crate::error::{IndexError, Result};
use crate::scan::hashing::HashingPool;
use crate::types::{
    FileAnalysisResult, FileStatus, FileSystemInfo, IndexSnapshot,
};

/// Result of [`ChangeAnalyzer::resolve_hashes`].
#[derive(Debug, Default)]
pub struct HashResolution {
    /// Hashes computed.
    pub hashed: usize,
    /// Files left unresolved because they could not be hashed.
    pub failures: Vec<IndexError>,
}

#[derive(Debug, Clone)]
pub struct ChangeAnalyzer {
    hashing: HashingPool,
}

impl ChangeAnalyzer {
    pub fn new(hashing: HashingPool) -> Self {
        Self { hashing }
    }

    /// Classify `files` against `snapshot` without touching file content.
    pub fn analyze(
        &self,
        files: Vec<FileSystemInfo>,
        snapshot: &IndexSnapshot,
    ) -> Vec<FileAnalysisResult> {
        analyze(files, snapshot)
    }

    /// Hash every `New`/`NeedsHashCheck` entry and settle the latter into
    /// `Unchanged` or `Modified`.
    ///
    /// Entries that fail to hash keep their status and stay without a hash,
    /// which excludes them from processing.
    pub fn resolve_hashes(
        &self,
        results: &mut [FileAnalysisResult],
    ) -> Result<HashResolution> {
        let targets: Vec<_> = results
            .iter()
            .enumerate()
            .filter(|(_, result)| result.needs_hash())
            .map(|(index, result)| (index, result.file_info.path.clone()))
            .collect();

        if targets.is_empty() {
            return Ok(HashResolution::default());
        }

        let outcome = self.hashing.compute(targets)?;
        let hashed = outcome.hashes.len();

        for (index, hash) in outcome.hashes {
            let Some(result) = results.get_mut(index) else {
                continue;
            };
            if result.status == FileStatus::NeedsHashCheck {
                let cached = result
                    .existing_metadata
                    .as_ref()
                    .map(|metadata| metadata.hash.as_str());
                result.status = if cached == Some(hash.as_str()) {
                    FileStatus::Unchanged
                } else {
                    FileStatus::Modified
                };
            }
            result.file_info.hash = Some(hash);
        }

        debug!(
            target: "scan::analyze",
            hashed,
            failed = outcome.failures.len(),
            "hash resolution finished"
        );
        Ok(HashResolution {
            hashed,
            failures: outcome.failures,
        })
    }
}

/// Metadata-only classification; see [`ChangeAnalyzer::analyze`].
pub fn analyze(
    files: Vec<FileSystemInfo>,
    snapshot: &IndexSnapshot,
) -> Vec<FileAnalysisResult> {
    files
        .into_iter()
        .map(|file_info| match snapshot.get(&file_info.path) {
            None => FileAnalysisResult {
                file_info,
                status: FileStatus::New,
                existing_metadata: None,
            },
            Some(existing) => {
                let status = if existing.size != file_info.size
                    || existing.modified_ms != file_info.modified_ms
                {
                    FileStatus::NeedsHashCheck
                } else {
                    FileStatus::Unchanged
                };
                FileAnalysisResult {
                    file_info,
                    status,
                    existing_metadata: Some(existing.clone()),
                }
            }
        })
        .collect()
}
