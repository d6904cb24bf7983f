//! Per-root watcher: one thread that reads native change batches, folds
//! them into the pending set and triggers the sync scheduler once the
//! debounce window has passed without new changes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::{IndexError, Result};
use crate::types::{ScanOptions, WatchConfig};
use crate::watch::pending::PendingChanges;
use crate::watch::scheduler::SyncScheduler;
use crate::watch::source::{ChangeSource, Interrupter, SourceEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WatcherPhase {
    Stopped = 0,
    Starting = 1,
    Watching = 2,
    /// Changes are queued and the debounce window is running.
    SyncScheduled = 3,
    Syncing = 4,
    Stopping = 5,
}

impl WatcherPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => WatcherPhase::Starting,
            2 => WatcherPhase::Watching,
            3 => WatcherPhase::SyncScheduled,
            4 => WatcherPhase::Syncing,
            5 => WatcherPhase::Stopping,
            _ => WatcherPhase::Stopped,
        }
    }
}

/// State shared by a watcher thread, its handle and the sync tasks it
/// schedules.
pub(crate) struct WatcherShared {
    pub(crate) root: PathBuf,
    pub(crate) options: RwLock<ScanOptions>,
    pub(crate) pending: Mutex<PendingChanges>,
    pub(crate) scan_in_progress: AtomicBool,
    pub(crate) pending_rescan: AtomicBool,
    pub(crate) passes: AtomicUsize,
    phase: AtomicU8,
    stop: AtomicBool,
}

impl fmt::Debug for WatcherShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherShared")
            .field("root", &self.root)
            .field("phase", &self.phase())
            .field(
                "scan_in_progress",
                &self.scan_in_progress.load(Ordering::Relaxed),
            )
            .field(
                "pending_rescan",
                &self.pending_rescan.load(Ordering::Relaxed),
            )
            .field("passes", &self.passes.load(Ordering::Relaxed))
            .finish()
    }
}

impl WatcherShared {
    fn new(root: PathBuf, options: ScanOptions) -> Self {
        Self {
            root,
            options: RwLock::new(options),
            pending: Mutex::new(PendingChanges::new()),
            scan_in_progress: AtomicBool::new(false),
            pending_rescan: AtomicBool::new(false),
            passes: AtomicUsize::new(0),
            phase: AtomicU8::new(WatcherPhase::Stopped as u8),
            stop: AtomicBool::new(false),
        }
    }

    pub(crate) fn phase(&self) -> WatcherPhase {
        WatcherPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn set_phase(&self, phase: WatcherPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Move from `from` to `to` only if nothing else changed the phase.
    pub(crate) fn transition(&self, from: WatcherPhase, to: WatcherPhase) {
        let _ = self.phase.compare_exchange(
            from as u8,
            to as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub(crate) fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub(crate) fn has_pending_work(&self) -> bool {
        self.pending_rescan.load(Ordering::Acquire)
            || !self.pending.lock().is_empty()
    }
}

/// Handle to a running watcher.
pub struct FolderWatcher {
    shared: Arc<WatcherShared>,
    scheduler: Arc<SyncScheduler>,
    interrupter: Interrupter,
    thread: Mutex<Option<JoinHandle<Box<dyn ChangeSource>>>>,
}

impl fmt::Debug for FolderWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FolderWatcher")
            .field("root", &self.shared.root)
            .field("phase", &self.shared.phase())
            .field("pending", &self.shared.pending.lock().len())
            .finish()
    }
}

impl FolderWatcher {
    /// Spawn the watcher thread for an already opened `source`.
    ///
    /// The thread owns the source and hands it back when it exits, so the
    /// native subscription is released after [`FolderWatcher::stop`] joins.
    pub(crate) fn start(
        root: PathBuf,
        options: ScanOptions,
        source: Box<dyn ChangeSource>,
        scheduler: Arc<SyncScheduler>,
        config: WatchConfig,
    ) -> Result<Self> {
        let shared = Arc::new(WatcherShared::new(root, options));
        shared.set_phase(WatcherPhase::Starting);
        let interrupter = source.interrupter();

        let thread_shared = Arc::clone(&shared);
        let thread_scheduler = Arc::clone(&scheduler);
        let handle = thread::Builder::new()
            .name("lumen-watch".to_string())
            .spawn(move || {
                watch_loop(source, thread_shared, thread_scheduler, config)
            })
            .map_err(|err| IndexError::WatcherStart {
                path: shared.root.clone(),
                message: err.to_string(),
            })?;

        Ok(Self {
            shared,
            scheduler,
            interrupter,
            thread: Mutex::new(Some(handle)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    pub fn phase(&self) -> WatcherPhase {
        self.shared.phase()
    }

    pub fn options(&self) -> ScanOptions {
        self.shared.options.read().clone()
    }

    /// Replace the options used by subsequent sync passes.
    pub fn set_options(&self, options: ScanOptions) {
        *self.shared.options.write() = options;
    }

    /// Queue a full rescan and ask the scheduler to run it.
    pub fn request_full_rescan(&self) {
        self.shared.pending.lock().require_full_rescan();
        self.scheduler.trigger(&self.shared);
    }

    /// Sync passes completed so far.
    pub fn completed_passes(&self) -> usize {
        self.shared.passes.load(Ordering::Acquire)
    }

    pub fn is_syncing(&self) -> bool {
        self.shared.scan_in_progress.load(Ordering::Acquire)
    }

    /// Whether changes are queued that no pass has picked up yet.
    pub fn has_pending_changes(&self) -> bool {
        self.shared.has_pending_work()
    }

    /// Whether the next pass will rescan the whole root.
    pub fn full_rescan_pending(&self) -> bool {
        self.shared.pending.lock().is_full_rescan()
    }

    /// Stop the thread and release the native source. Idempotent.
    ///
    /// A sync pass already running on the pool is not cancelled.
    pub fn stop(&self) {
        let Some(handle) = self.thread.lock().take() else {
            return;
        };
        self.shared.stop.store(true, Ordering::Release);
        self.shared.set_phase(WatcherPhase::Stopping);
        self.interrupter.interrupt();

        match handle.join() {
            Ok(source) => drop(source),
            Err(_) => error!(
                target: "watch::watcher",
                root = %self.shared.root.display(),
                "watcher thread panicked"
            ),
        }
        self.shared.set_phase(WatcherPhase::Stopped);
        info!(
            target: "watch::watcher",
            root = %self.shared.root.display(),
            "watcher stopped"
        );
    }
}

impl Drop for FolderWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watch_loop(
    mut source: Box<dyn ChangeSource>,
    shared: Arc<WatcherShared>,
    scheduler: Arc<SyncScheduler>,
    config: WatchConfig,
) -> Box<dyn ChangeSource> {
    let root = shared.root.clone();
    shared.transition(WatcherPhase::Starting, WatcherPhase::Watching);
    debug!(
        target: "watch::watcher",
        root = %root.display(),
        "watch loop running"
    );

    let mut deadline: Option<Instant> = None;
    while !shared.is_stopping() {
        let wait =
            deadline.map(|at| at.saturating_duration_since(Instant::now()));
        match source.next_batch(wait) {
            SourceEvent::Changes(changes) => {
                let changes: Vec<_> = changes
                    .into_iter()
                    .filter(|change| {
                        change.path.starts_with(&root) && change.path != root
                    })
                    .collect();
                if changes.is_empty() {
                    continue;
                }
                debug!(
                    target: "watch::watcher",
                    root = %root.display(),
                    changes = changes.len(),
                    "change batch received"
                );
                shared.pending.lock().absorb(changes);
                deadline = Some(Instant::now() + config.debounce_window);
                shared.transition(
                    WatcherPhase::Watching,
                    WatcherPhase::SyncScheduled,
                );
            }
            SourceEvent::Overflow => {
                warn!(
                    target: "watch::watcher",
                    root = %root.display(),
                    "notification overflow, scheduling full rescan"
                );
                shared.pending.lock().require_full_rescan();
                deadline = Some(Instant::now() + config.debounce_window);
                shared.transition(
                    WatcherPhase::Watching,
                    WatcherPhase::SyncScheduled,
                );
            }
            SourceEvent::Failed(message) => {
                warn!(
                    target: "watch::watcher",
                    root = %root.display(),
                    error = %message,
                    "change source failed, scheduling full rescan"
                );
                shared.pending.lock().require_full_rescan();
                deadline = Some(Instant::now() + config.debounce_window);
                shared.transition(
                    WatcherPhase::Watching,
                    WatcherPhase::SyncScheduled,
                );
            }
            SourceEvent::TimedOut => {
                deadline = None;
                scheduler.trigger(&shared);
            }
            SourceEvent::Interrupted => {}
            SourceEvent::Closed => {
                if deadline.is_some() && !shared.is_stopping() {
                    scheduler.trigger(&shared);
                }
                info!(
                    target: "watch::watcher",
                    root = %root.display(),
                    "change source closed"
                );
                break;
            }
        }
    }

    if !shared.is_stopping() {
        shared.set_phase(WatcherPhase::Stopped);
    }
    source
}
