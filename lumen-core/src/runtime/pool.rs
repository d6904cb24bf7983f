use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tracing::error;

use crate::error::{IndexError, Result};

/// Unit of work accepted by a [`WorkerPool`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Bounded set of reusable threads executing queued tasks.
///
/// The pool runs both the parallel batches of a pass and the per-root sync
/// passes themselves, so watcher threads never do I/O-heavy work.
pub trait WorkerPool: Send + Sync + fmt::Debug {
    /// Queue `task`. Returns `false` when the pool refuses it (shut down or
    /// at capacity); the task is dropped without running in that case.
    fn submit(&self, task: Task) -> bool;
}

/// Sizing for [`RayonWorkerPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub threads: usize,
    /// Tasks allowed to be queued or running at once before submissions are
    /// rejected.
    pub max_queued: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            threads: num_cpus::get().max(2),
            max_queued: 4096,
        }
    }
}

/// [`WorkerPool`] backed by a dedicated rayon thread pool.
pub struct RayonWorkerPool {
    pool: rayon::ThreadPool,
    queued: Arc<AtomicUsize>,
    accepting: AtomicBool,
    config: PoolConfig,
}

impl fmt::Debug for RayonWorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RayonWorkerPool")
            .field("threads", &self.pool.current_num_threads())
            .field("max_queued", &self.config.max_queued)
            .field("queued", &self.queued.load(Ordering::Relaxed))
            .field("accepting", &self.accepting.load(Ordering::Relaxed))
            .finish()
    }
}

impl RayonWorkerPool {
    pub fn new(config: PoolConfig) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads.max(1))
            .thread_name(|idx| format!("lumen-worker-{idx}"))
            .panic_handler(|panic| {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(
                    target: "runtime::pool",
                    %message,
                    "worker task panicked"
                );
            })
            .build()
            .map_err(|err| {
                IndexError::Submission(format!(
                    "failed to build worker pool: {err}"
                ))
            })?;

        Ok(Self {
            pool,
            queued: Arc::new(AtomicUsize::new(0)),
            accepting: AtomicBool::new(true),
            config,
        })
    }

    /// Stop accepting new tasks. Work already queued still runs.
    pub fn shutdown(&self) {
        self.accepting.store(false, Ordering::Release);
    }

    /// Tasks currently queued or running.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }
}

struct QueuedSlot(Arc<AtomicUsize>);

impl Drop for QueuedSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl WorkerPool for RayonWorkerPool {
    fn submit(&self, task: Task) -> bool {
        if !self.accepting.load(Ordering::Acquire) {
            return false;
        }

        let previous = self.queued.fetch_add(1, Ordering::AcqRel);
        if previous >= self.config.max_queued {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            return false;
        }

        let slot = QueuedSlot(Arc::clone(&self.queued));
        self.pool.spawn(move || {
            let _slot = slot;
            task();
        });
        true
    }
}
