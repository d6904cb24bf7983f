use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use tempfile::{TempDir, tempdir};
use tokio::sync::broadcast;

use lumen_core::IndexService;
use lumen_core::error::ErrorKind;
use lumen_core::paths::normalize_path;
use lumen_core::ports::{GalleryChanged, InMemoryRepository};
use lumen_core::runtime::{PoolConfig, RayonWorkerPool, WorkerPool};
use lumen_core::scan::StaticIgnoreRules;
use lumen_core::types::{ScanOptions, WatchConfig};
use lumen_core::watch::{
    BufferFeed, BufferFeedFactory, BufferRecord, ChangeAction, WatcherPhase,
};

mod support;

use support::{
    Harness, RecordingThumbnails, SlowRepository, TEST_DEBOUNCE, harness,
    pipeline_on, pipeline_with, wait_until,
};

const PATIENCE: Duration = Duration::from_secs(5);

struct Fixture {
    dir: TempDir,
    root: PathBuf,
    h: Harness,
    sources: Arc<BufferFeedFactory>,
    service: IndexService,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let root = normalize_path(dir.path());
        let h = harness();
        let sources = Arc::new(BufferFeedFactory::new());
        let service = IndexService::new(
            h.pipeline.clone(),
            sources.clone(),
            WatchConfig {
                debounce_window: TEST_DEBOUNCE,
            },
        );
        Self {
            dir,
            root,
            h,
            sources,
            service,
        }
    }

    fn write(&self, name: &str, content: &[u8]) {
        let path = self.root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    /// Register a watcher without the bootstrap pass and return its feed.
    fn watch_quietly(&self) -> BufferFeed {
        self.service
            .ensure_watcher(&self.root, Some(without_bootstrap()))
            .unwrap();
        self.sources.feed(&self.root).unwrap()
    }

    fn passes(&self) -> usize {
        self.service
            .watcher(&self.root)
            .map(|watcher| watcher.completed_passes())
            .unwrap_or(0)
    }

    fn settled(&self) -> bool {
        self.service.watcher(&self.root).is_some_and(|watcher| {
            !watcher.is_syncing() && !watcher.has_pending_changes()
        })
    }

    fn indexed(&self, name: &str) -> bool {
        self.h
            .repository
            .record_by_path(&self.root.join(name))
            .is_some()
    }
}

fn without_bootstrap() -> ScanOptions {
    ScanOptions {
        bootstrap_scan: false,
        ..ScanOptions::default()
    }
}

fn drain(rx: &mut broadcast::Receiver<GalleryChanged>) -> usize {
    let mut count = 0;
    while rx.try_recv().is_ok() {
        count += 1;
    }
    count
}

#[test]
fn burst_on_one_file_collapses_into_one_pass() {
    let fx = Fixture::new();
    let feed = fx.watch_quietly();
    let mut changes = fx.service.subscribe();
    fx.write("b.jpg", b"fresh");

    feed.push_records(&[BufferRecord::file("b.jpg", ChangeAction::Added)]);
    thread::sleep(TEST_DEBOUNCE / 4);
    feed.push_records(&[BufferRecord::file("b.jpg", ChangeAction::Modified)]);

    assert!(wait_until(PATIENCE, || fx.passes() == 1 && fx.settled()));
    thread::sleep(TEST_DEBOUNCE * 3);

    assert_eq!(fx.passes(), 1);
    assert!(fx.indexed("b.jpg"));
    assert_eq!(fx.h.thumbnails.generated_for(&fx.root.join("b.jpg")), 1);
    assert_eq!(drain(&mut changes), 1);
}

#[test]
fn passes_for_one_root_never_overlap() {
    let dir = tempdir().unwrap();
    let root = normalize_path(dir.path());
    let repository = Arc::new(SlowRepository::new(Duration::from_millis(15)));
    let pipeline = pipeline_with(
        repository.clone(),
        Arc::new(StaticIgnoreRules::new()),
        Arc::new(RecordingThumbnails::default()),
    );
    let sources = Arc::new(BufferFeedFactory::new());
    let service = IndexService::new(
        pipeline,
        sources.clone(),
        WatchConfig {
            debounce_window: Duration::from_millis(20),
        },
    );
    service
        .ensure_watcher(&root, Some(without_bootstrap()))
        .unwrap();
    let feed = sources.feed(&root).unwrap();

    for round in 0..6 {
        for i in 0..5 {
            let name = format!("r{round}-{i}.jpg");
            fs::write(root.join(&name), name.as_bytes()).unwrap();
            feed.push_records(&[BufferRecord::file(name, ChangeAction::Added)]);
        }
        // Long enough for the debounce to fire while earlier passes run.
        thread::sleep(Duration::from_millis(35));
    }

    let watcher = service.watcher(&root).unwrap();
    assert!(wait_until(PATIENCE, || {
        !watcher.is_syncing()
            && !watcher.has_pending_changes()
            && repository.inner.live_count() == 30
    }));
    assert_eq!(repository.max_active.load(Ordering::SeqCst), 1);
    assert!(watcher.completed_passes() >= 1);
    assert_eq!(watcher.phase(), WatcherPhase::Watching);
}

#[test]
fn removing_a_dotted_directory_drops_everything_below_it() {
    let fx = Fixture::new();
    fx.write("2024.06 Trip/a.jpg", b"a");
    fx.write("2024.06 Trip/day2/b.jpg", b"b");
    fx.write("keep.jpg", b"k");
    fx.h.pipeline
        .full_scan(&fx.root, &ScanOptions::default())
        .unwrap();
    let feed = fx.watch_quietly();

    fs::remove_dir_all(fx.root.join("2024.06 Trip")).unwrap();
    // The backend reports the vanished directory as a plain removal.
    feed.push_records(&[BufferRecord::file(
        "2024.06 Trip",
        ChangeAction::Removed,
    )]);

    assert!(wait_until(PATIENCE, || fx.passes() == 1 && fx.settled()));
    assert!(!fx.indexed("2024.06 Trip/a.jpg"));
    assert!(!fx.indexed("2024.06 Trip/day2/b.jpg"));
    assert!(fx.indexed("keep.jpg"));
    assert_eq!(fx.h.repository.live_count(), 1);
}

#[test]
fn failed_pass_releases_the_root_and_queues_a_full_rescan() {
    let fx = Fixture::new();
    let feed = fx.watch_quietly();
    let watcher = fx.service.watcher(&fx.root).unwrap();

    fs::remove_dir_all(&fx.root).unwrap();
    feed.push_records(&[BufferRecord::file("a.jpg", ChangeAction::Added)]);

    assert!(wait_until(PATIENCE, || {
        watcher.full_rescan_pending() && !watcher.is_syncing()
    }));
    assert_eq!(fx.passes(), 0);
    assert!(watcher.has_pending_changes());
    assert_eq!(watcher.phase(), WatcherPhase::SyncScheduled);

    fx.write("a.jpg", b"a");
    fx.write("unannounced.jpg", b"u");
    feed.push_records(&[BufferRecord::file("b.jpg", ChangeAction::Added)]);

    assert!(wait_until(PATIENCE, || fx.passes() == 1 && fx.settled()));
    assert!(!watcher.full_rescan_pending());
    assert!(fx.indexed("a.jpg"));
    assert!(fx.indexed("unannounced.jpg"));
    assert_eq!(watcher.phase(), WatcherPhase::Watching);
}

#[test]
fn rejected_pass_releases_the_root_and_queues_a_full_rescan() {
    let dir = tempdir().unwrap();
    let root = normalize_path(dir.path());
    let pool = Arc::new(
        RayonWorkerPool::new(PoolConfig {
            threads: 2,
            max_queued: 4,
        })
        .unwrap(),
    );
    let repository = Arc::new(InMemoryRepository::new());
    let pipeline = pipeline_on(repository.clone(), pool.clone());
    let sources = Arc::new(BufferFeedFactory::new());
    let service = IndexService::new(
        pipeline,
        sources.clone(),
        WatchConfig {
            debounce_window: TEST_DEBOUNCE,
        },
    );
    let watcher = service
        .ensure_watcher(&root, Some(without_bootstrap()))
        .unwrap();
    let feed = sources.feed(&root).unwrap();

    let (release, blocked) = crossbeam_channel::unbounded::<()>();
    for _ in 0..4 {
        let blocked = blocked.clone();
        assert!(pool.submit(Box::new(move || {
            let _ = blocked.recv_timeout(PATIENCE);
        })));
    }
    fs::write(root.join("a.jpg"), b"a").unwrap();
    feed.push_records(&[BufferRecord::file("a.jpg", ChangeAction::Added)]);

    assert!(wait_until(PATIENCE, || watcher.full_rescan_pending()));
    assert!(!watcher.is_syncing());
    assert_eq!(watcher.completed_passes(), 0);
    assert_eq!(watcher.phase(), WatcherPhase::SyncScheduled);

    drop(release);
    assert!(wait_until(PATIENCE, || pool.queued() == 0));
    fs::write(root.join("b.jpg"), b"b").unwrap();
    feed.push_records(&[BufferRecord::file("b.jpg", ChangeAction::Added)]);

    assert!(wait_until(PATIENCE, || {
        watcher.completed_passes() == 1
            && !watcher.is_syncing()
            && !watcher.has_pending_changes()
    }));
    assert_eq!(repository.live_count(), 2);
    assert_eq!(watcher.phase(), WatcherPhase::Watching);
}

#[test]
fn directory_change_triggers_a_full_rescan() {
    let fx = Fixture::new();
    let feed = fx.watch_quietly();
    fx.write("a.jpg", b"a");
    fx.write("trip/unannounced.jpg", b"u");

    feed.push_records(&[
        BufferRecord::file("a.jpg", ChangeAction::Added),
        BufferRecord::directory("trip", ChangeAction::Added),
    ]);

    assert!(wait_until(PATIENCE, || fx.passes() == 1 && fx.settled()));
    assert!(fx.indexed("a.jpg"));
    assert!(fx.indexed("trip/unannounced.jpg"));
}

#[test]
fn remove_then_add_within_the_window_keeps_the_asset() {
    let fx = Fixture::new();
    fx.write("a.jpg", b"a");
    fx.h.pipeline
        .full_scan(&fx.root, &ScanOptions::default())
        .unwrap();
    let feed = fx.watch_quietly();

    feed.push_records(&[BufferRecord::file("a.jpg", ChangeAction::Removed)]);
    feed.push_records(&[BufferRecord::file("a.jpg", ChangeAction::Added)]);

    assert!(wait_until(PATIENCE, || fx.passes() == 1 && fx.settled()));
    assert!(fx.indexed("a.jpg"));
    assert_eq!(fx.h.repository.soft_deleted_count(), 0);
}

#[test]
fn overflow_triggers_a_full_rescan() {
    let fx = Fixture::new();
    let feed = fx.watch_quietly();
    fx.write("lost.jpg", b"lost");
    let mut changes = fx.service.subscribe();

    feed.overflow();

    assert!(wait_until(PATIENCE, || fx.passes() == 1 && fx.settled()));
    assert!(fx.indexed("lost.jpg"));
    assert_eq!(drain(&mut changes), 1);
}

#[test]
fn undecodable_buffer_triggers_a_full_rescan() {
    let fx = Fixture::new();
    let feed = fx.watch_quietly();
    fx.write("x.jpg", b"x");

    feed.push(vec![0xff; 7]);

    assert!(wait_until(PATIENCE, || fx.passes() == 1 && fx.settled()));
    assert!(fx.indexed("x.jpg"));
}

#[test]
fn full_rescan_is_signalled_even_without_changes() {
    let fx = Fixture::new();
    let feed = fx.watch_quietly();
    let mut changes = fx.service.subscribe();

    feed.fail("backend hiccup");

    assert!(wait_until(PATIENCE, || fx.passes() == 1 && fx.settled()));
    assert_eq!(drain(&mut changes), 1);
}

#[test]
fn unchanged_incremental_pass_is_not_signalled() {
    let fx = Fixture::new();
    fx.write("a.jpg", b"a");
    fx.h.pipeline
        .full_scan(&fx.root, &ScanOptions::default())
        .unwrap();
    let feed = fx.watch_quietly();
    let mut changes = fx.service.subscribe();

    feed.push_records(&[BufferRecord::file("notes.txt", ChangeAction::Added)]);

    assert!(wait_until(PATIENCE, || fx.passes() == 1 && fx.settled()));
    assert_eq!(drain(&mut changes), 0);
}

#[test]
fn bootstrap_scan_indexes_existing_files() {
    let fx = Fixture::new();
    fx.write("existing.jpg", b"e");

    let watcher = fx.service.ensure_watcher(&fx.root, None).unwrap();

    assert!(wait_until(PATIENCE, || {
        watcher.completed_passes() == 1 && fx.settled()
    }));
    assert!(fx.indexed("existing.jpg"));
    assert_eq!(watcher.phase(), WatcherPhase::Watching);
}

#[test]
fn ensure_is_idempotent_and_replaces_options() {
    let fx = Fixture::new();
    let first = fx
        .service
        .ensure_watcher(&fx.root, Some(without_bootstrap()))
        .unwrap();
    let second = fx
        .service
        .ensure_watcher(
            &fx.root.join("."),
            Some(ScanOptions {
                bootstrap_scan: false,
                recursive: false,
                ..ScanOptions::default()
            }),
        )
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(!first.options().recursive);
    assert_eq!(fx.service.watched_roots(), vec![fx.root.clone()]);
}

#[test]
fn failed_source_open_registers_nothing() {
    let fx = Fixture::new();
    fx.sources.refuse(&fx.root, "handle limit reached");

    let err = fx.service.ensure_watcher(&fx.root, None).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::WatcherStart);
    assert!(fx.service.watched_roots().is_empty());
}

#[test]
fn missing_root_cannot_be_watched() {
    let fx = Fixture::new();
    let err = fx
        .service
        .ensure_watcher(&fx.root.join("missing"), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn stop_all_stops_and_forgets_every_watcher() {
    let fx = Fixture::new();
    let other = tempdir().unwrap();
    let a = fx.watch_quietly();
    let b_watcher = fx
        .service
        .ensure_watcher(other.path(), Some(without_bootstrap()))
        .unwrap();
    let a_watcher = fx.service.watcher(&fx.root).unwrap();
    assert_eq!(fx.service.watched_roots().len(), 2);

    fx.service.stop_all_watchers();

    assert!(fx.service.watched_roots().is_empty());
    assert_eq!(a_watcher.phase(), WatcherPhase::Stopped);
    assert_eq!(b_watcher.phase(), WatcherPhase::Stopped);
    // The source was dropped with the thread, so the feed is disconnected.
    assert!(
        !a.push_records(&[BufferRecord::file("late.jpg", ChangeAction::Added)])
    );
}

#[test]
fn stop_watcher_releases_one_root() {
    let fx = Fixture::new();
    fx.watch_quietly();
    assert!(fx.service.stop_watcher(&fx.root));
    assert!(!fx.service.stop_watcher(&fx.root));
    assert!(fx.service.watcher(Path::new(&fx.root)).is_none());
    drop(fx.dir);
}
