//! Parallel-for over fixed-size chunks with a completion latch.
//!
//! Every parallel stage of a pass (hashing, asset building) splits its input
//! into chunks, submits one pool task per chunk and blocks on a latch sized
//! to the chunk count. Results are collected into a mutex-guarded list.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::error::{IndexError, Result};
use crate::runtime::pool::WorkerPool;

/// Countdown barrier released once every submitted chunk reported back.
#[derive(Debug)]
pub struct CompletionLatch {
    remaining: Mutex<usize>,
    released: Condvar,
}

impl CompletionLatch {
    pub fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            released: Condvar::new(),
        }
    }

    pub fn count_down(&self) {
        let mut remaining = self.remaining.lock();
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.released.notify_all();
        }
    }

    pub fn is_released(&self) -> bool {
        *self.remaining.lock() == 0
    }

    /// Block until the count reaches zero.
    ///
    /// When called from a rayon worker the thread keeps executing queued pool
    /// jobs while it waits, so a sync pass that runs on the pool can wait on
    /// its own batches without starving them.
    pub fn wait(&self) {
        loop {
            if self.is_released() {
                return;
            }
            match rayon::yield_now() {
                Some(rayon::Yield::Executed) => continue,
                Some(rayon::Yield::Idle) => {
                    let mut remaining = self.remaining.lock();
                    if *remaining > 0 {
                        self.released
                            .wait_for(&mut remaining, Duration::from_millis(2));
                    }
                }
                None => {
                    let mut remaining = self.remaining.lock();
                    while *remaining > 0 {
                        self.released.wait(&mut remaining);
                    }
                    return;
                }
            }
        }
    }
}

/// Counts the latch down even if the chunk panics.
struct ChunkGuard(Arc<CompletionLatch>);

impl Drop for ChunkGuard {
    fn drop(&mut self) {
        self.0.count_down();
    }
}

/// Run `work` over `items` in chunks of `chunk_size` on `pool`.
///
/// `work` receives the index of the chunk's first item in the original
/// ordering plus the owned chunk. Output order across chunks is
/// unspecified; callers that care carry indices in `R`.
///
/// If the pool rejects a chunk, the chunks already submitted are still
/// awaited before the `Submission` error is returned, so no task outlives
/// the call.
pub fn run_chunked<T, R, F>(
    pool: &dyn WorkerPool,
    items: Vec<T>,
    chunk_size: usize,
    work: F,
) -> Result<Vec<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(usize, Vec<T>) -> Vec<R> + Send + Sync + 'static,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::with_capacity(items.len().div_ceil(chunk_size));
    let mut iter = items.into_iter();
    let mut base = 0;
    loop {
        let chunk: Vec<T> = iter.by_ref().take(chunk_size).collect();
        if chunk.is_empty() {
            break;
        }
        let len = chunk.len();
        chunks.push((base, chunk));
        base += len;
    }

    let total = chunks.len();
    let latch = Arc::new(CompletionLatch::new(total));
    let results: Arc<Mutex<Vec<R>>> = Arc::new(Mutex::new(Vec::new()));
    let work = Arc::new(work);
    let mut rejected_at = None;

    for (position, (base, chunk)) in chunks.into_iter().enumerate() {
        let guard = ChunkGuard(Arc::clone(&latch));
        let results = Arc::clone(&results);
        let work = Arc::clone(&work);

        let accepted = pool.submit(Box::new(move || {
            let _guard = guard;
            let mut produced = work(base, chunk);
            results.lock().append(&mut produced);
        }));

        if !accepted {
            // The rejected closure (and its guard) was dropped, which already
            // counted this chunk down; release the ones never submitted.
            for _ in position + 1..total {
                latch.count_down();
            }
            rejected_at = Some(position);
            break;
        }
    }

    latch.wait();

    if let Some(position) = rejected_at {
        return Err(IndexError::Submission(format!(
            "chunk {} of {} was not accepted",
            position + 1,
            total
        )));
    }

    debug!(target: "runtime::batch", chunks = total, "all chunks completed");
    let collected = mem::take(&mut *results.lock());
    Ok(collected)
}
