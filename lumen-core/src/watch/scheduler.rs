//! Serializes sync passes per root and runs them on the worker pool.
//!
//! `scan_in_progress` gates entry: the first trigger claims it and submits
//! a pass, later triggers only raise `pending_rescan`. The running task
//! keeps draining until nothing is left, settles the watcher phase, clears
//! the flag, then checks once more for a trigger that landed between its
//! last drain and the clear.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::ports::ChangeNotifier;
use crate::scan::IndexPipeline;
use crate::types::ScanResult;
use crate::watch::watcher::{WatcherPhase, WatcherShared};

#[derive(Debug)]
pub struct SyncScheduler {
    pipeline: IndexPipeline,
    notifier: ChangeNotifier,
}

impl SyncScheduler {
    pub fn new(pipeline: IndexPipeline, notifier: ChangeNotifier) -> Self {
        Self { pipeline, notifier }
    }

    /// Run (or queue) a sync pass for `shared`.
    pub(crate) fn trigger(self: &Arc<Self>, shared: &Arc<WatcherShared>) {
        if shared
            .scan_in_progress
            .compare_exchange(
                false,
                true,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            shared.pending_rescan.store(true, Ordering::Release);
            debug!(
                target: "watch::scheduler",
                root = %shared.root.display(),
                "sync in flight, queued another pass"
            );
            return;
        }

        let scheduler = Arc::clone(self);
        let task_shared = Arc::clone(shared);
        let accepted = self
            .pipeline
            .pool()
            .submit(Box::new(move || scheduler.run(&task_shared)));

        if !accepted {
            shared.pending.lock().require_full_rescan();
            shared.scan_in_progress.store(false, Ordering::Release);
            error!(
                target: "watch::scheduler",
                root = %shared.root.display(),
                "worker pool rejected sync pass, full rescan queued"
            );
        }
    }

    fn run(&self, shared: &WatcherShared) {
        loop {
            let failed = self.drain(shared);
            // The phase settles before the flag clears.
            if !shared.is_stopping() {
                let next = if shared.has_pending_work() {
                    WatcherPhase::SyncScheduled
                } else {
                    WatcherPhase::Watching
                };
                shared.transition(WatcherPhase::Syncing, next);
            }
            shared.scan_in_progress.store(false, Ordering::Release);

            if failed || shared.is_stopping() || !shared.has_pending_work() {
                break;
            }
            // A trigger raced the clear; claim the flag again unless that
            // trigger already did.
            if shared
                .scan_in_progress
                .compare_exchange(
                    false,
                    true,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_err()
            {
                break;
            }
        }
    }

    /// Run passes until the pending state is empty. Returns `true` when a
    /// pass failed.
    fn drain(&self, shared: &WatcherShared) -> bool {
        loop {
            shared.pending_rescan.store(false, Ordering::Release);
            let batch = shared.pending.lock().take();
            if batch.is_empty() {
                return false;
            }

            if !shared.is_stopping() {
                shared.set_phase(WatcherPhase::Syncing);
            }
            let options = shared.options.read().clone();
            let outcome: Result<ScanResult> = if batch.full_rescan {
                self.pipeline.full_scan(&shared.root, &options)
            } else {
                self.pipeline.sync_paths(
                    &shared.root,
                    batch.removes,
                    batch.upserts,
                    &options,
                )
            };

            match outcome {
                Ok(result) => {
                    shared.passes.fetch_add(1, Ordering::AcqRel);
                    if result.full_rescan || result.has_changes() {
                        self.notifier.notify();
                    }
                    info!(
                        target: "watch::scheduler",
                        root = %shared.root.display(),
                        full_rescan = result.full_rescan,
                        new = result.new,
                        updated = result.updated,
                        deleted = result.deleted,
                        errors = result.errors.len(),
                        "sync pass completed"
                    );
                }
                Err(err) => {
                    warn!(
                        target: "watch::scheduler",
                        root = %shared.root.display(),
                        error = %err,
                        "sync pass failed, full rescan queued"
                    );
                    shared.pending.lock().require_full_rescan();
                    return true;
                }
            }

            if shared.is_stopping() {
                return false;
            }
        }
    }
}
