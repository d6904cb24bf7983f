//! Content hashing: xxHash3-128 streamed over the file, computed in parallel
//! batches on the worker pool.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};
use xxhash_rust::xxh3::Xxh3;

use crate::error::{IndexError, Result};
use crate::runtime::{WorkerPool, run_chunked};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Hash the file at `path`, returning 32 lowercase hex characters.
pub fn hash_file(path: &Path) -> Result<String> {
    let hash_err = |err: std::io::Error| IndexError::Hash {
        path: path.to_path_buf(),
        message: err.to_string(),
    };

    let mut file = File::open(path).map_err(hash_err)?;
    let mut hasher = Xxh3::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(hash_err(err)),
        };
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:032x}", hasher.digest128()))
}

/// Hashes produced by one [`HashingPool::compute`] call.
#[derive(Debug, Default)]
pub struct HashOutcome {
    /// `(index, hash)` pairs keyed by the caller's original index.
    pub hashes: Vec<(usize, String)>,
    /// Files that could not be read; they are left unresolved.
    pub failures: Vec<IndexError>,
}

/// Parallel hash computation over fixed-size batches.
#[derive(Debug, Clone)]
pub struct HashingPool {
    pool: Arc<dyn WorkerPool>,
    batch_size: usize,
}

impl HashingPool {
    pub fn new(pool: Arc<dyn WorkerPool>, batch_size: usize) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
        }
    }

    /// Hash every `(index, path)` target.
    ///
    /// Per-file failures are logged and reported in
    /// [`HashOutcome::failures`]. The call only fails when the worker pool
    /// rejects a batch.
    pub fn compute(
        &self,
        targets: Vec<(usize, PathBuf)>,
    ) -> Result<HashOutcome> {
        let requested = targets.len();
        let entries = run_chunked(
            self.pool.as_ref(),
            targets,
            self.batch_size,
            |_, batch| {
                batch
                    .into_iter()
                    .map(|(index, path)| (index, hash_file(&path)))
                    .collect()
            },
        )?;

        let mut outcome = HashOutcome::default();
        for (index, hashed) in entries {
            match hashed {
                Ok(hash) => outcome.hashes.push((index, hash)),
                Err(err) => {
                    warn!(
                        target: "scan::hash",
                        error = %err,
                        "hash failed, skipping file"
                    );
                    outcome.failures.push(err);
                }
            }
        }

        debug!(
            target: "scan::hash",
            requested,
            hashed = outcome.hashes.len(),
            failed = outcome.failures.len(),
            "hash batches completed"
        );
        Ok(outcome)
    }
}
