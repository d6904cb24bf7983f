//! Native change sources.
//!
//! A [`ChangeSource`] is owned by exactly one watcher thread, which blocks on
//! [`ChangeSource::next_batch`]. The [`Interrupter`] obtained before the
//! thread starts is the only way to wake that call from outside.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};
use notify::event::{CreateKind, EventKind, ModifyKind, RemoveKind, RenameMode};
use notify::{
    Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{IndexError, Result};
use crate::paths::{join_within_root, normalize_path};
use crate::watch::native_buffer::{self, BufferRecord, DecodedBuffer};

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Added,
    Removed,
    Modified,
    RenamedOldName,
    RenamedNewName,
}

impl ChangeAction {
    /// Wire code used by the native buffer layout.
    pub fn code(self) -> u32 {
        match self {
            ChangeAction::Added => 1,
            ChangeAction::Removed => 2,
            ChangeAction::Modified => 3,
            ChangeAction::RenamedOldName => 4,
            ChangeAction::RenamedNewName => 5,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(ChangeAction::Added),
            2 => Some(ChangeAction::Removed),
            3 => Some(ChangeAction::Modified),
            4 => Some(ChangeAction::RenamedOldName),
            5 => Some(ChangeAction::RenamedNewName),
            _ => None,
        }
    }

    /// Whether the path should be (re)indexed rather than removed.
    pub fn is_upsert(self) -> bool {
        matches!(
            self,
            ChangeAction::Added
                | ChangeAction::Modified
                | ChangeAction::RenamedNewName
        )
    }
}

/// One change reported by a source, with an absolute path inside the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    pub path: PathBuf,
    pub action: ChangeAction,
    pub is_directory: bool,
}

/// Outcome of one blocking read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    Changes(Vec<RawChange>),
    /// Events were lost; the caller must rescan.
    Overflow,
    TimedOut,
    /// Woken by the [`Interrupter`].
    Interrupted,
    /// The source will never produce again.
    Closed,
    /// Backend or decoding failure. State is uncertain.
    Failed(String),
}

/// Wakes a blocked [`ChangeSource::next_batch`].
#[derive(Debug, Clone)]
pub struct Interrupter {
    signal: Sender<()>,
}

impl Interrupter {
    fn pair() -> (Self, Receiver<()>) {
        let (signal, wake) = bounded(1);
        (Self { signal }, wake)
    }

    pub fn interrupt(&self) {
        // A full slot already wakes the reader.
        let _ = self.signal.try_send(());
    }
}

/// Blocking, cancellable stream of change batches for one root.
pub trait ChangeSource: Send {
    /// Wait up to `timeout` (forever when `None`) for the next batch.
    fn next_batch(&mut self, timeout: Option<Duration>) -> SourceEvent;

    fn interrupter(&self) -> Interrupter;
}

/// Opens a [`ChangeSource`] for a root.
pub trait ChangeSourceFactory: Send + Sync + fmt::Debug {
    /// Subscribe to recursive changes under `root`. Failures are
    /// [`IndexError::WatcherStart`].
    fn open(&self, root: &Path) -> Result<Box<dyn ChangeSource>>;
}

/// Block on `events` until a message, a wake-up or the timeout.
fn wait_for<T>(
    events: &Receiver<T>,
    wake: &Receiver<()>,
    timeout: Option<Duration>,
) -> std::result::Result<T, SourceEvent> {
    match timeout {
        Some(timeout) => select! {
            recv(events) -> msg => msg.map_err(|_| SourceEvent::Closed),
            recv(wake) -> _ => Err(SourceEvent::Interrupted),
            default(timeout) => Err(SourceEvent::TimedOut),
        },
        None => select! {
            recv(events) -> msg => msg.map_err(|_| SourceEvent::Closed),
            recv(wake) -> _ => Err(SourceEvent::Interrupted),
        },
    }
}

/// Live notifications from the operating system through `notify`.
pub struct NotifyChangeSource {
    root: PathBuf,
    // Dropping the watcher ends the OS subscription.
    _watcher: RecommendedWatcher,
    events: Receiver<notify::Result<Event>>,
    wake: Receiver<()>,
    interrupter: Interrupter,
}

impl fmt::Debug for NotifyChangeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyChangeSource")
            .field("root", &self.root)
            .field("queued", &self.events.len())
            .finish()
    }
}

impl NotifyChangeSource {
    pub fn open(root: &Path) -> Result<Self> {
        let root = normalize_path(root);
        let start_err = |err: notify::Error| IndexError::WatcherStart {
            path: root.clone(),
            message: err.to_string(),
        };

        let (tx, events) = unbounded();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            NotifyConfig::default(),
        )
        .map_err(start_err)?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(start_err)?;

        let (interrupter, wake) = Interrupter::pair();
        debug!(
            target: "watch::source",
            root = %root.display(),
            "notify subscription opened"
        );
        Ok(Self {
            root,
            _watcher: watcher,
            events,
            wake,
            interrupter,
        })
    }

    fn collect(&self, first: notify::Result<Event>) -> SourceEvent {
        let mut changes = Vec::new();
        let mut next = Some(first);
        while let Some(message) = next {
            match message {
                Ok(event) => match map_event(&self.root, event) {
                    Mapped::Changes(mut mapped) => changes.append(&mut mapped),
                    Mapped::Overflow => return SourceEvent::Overflow,
                },
                Err(err) => return SourceEvent::Failed(err.to_string()),
            }
            next = self.events.try_recv().ok();
        }
        SourceEvent::Changes(changes)
    }
}

impl ChangeSource for NotifyChangeSource {
    fn next_batch(&mut self, timeout: Option<Duration>) -> SourceEvent {
        match wait_for(&self.events, &self.wake, timeout) {
            Ok(first) => self.collect(first),
            Err(event) => event,
        }
    }

    fn interrupter(&self) -> Interrupter {
        self.interrupter.clone()
    }
}

/// [`ChangeSourceFactory`] for [`NotifyChangeSource`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifySourceFactory;

impl ChangeSourceFactory for NotifySourceFactory {
    fn open(&self, root: &Path) -> Result<Box<dyn ChangeSource>> {
        Ok(Box::new(NotifyChangeSource::open(root)?))
    }
}

enum Mapped {
    Changes(Vec<RawChange>),
    Overflow,
}

/// A removed path can no longer be inspected. Extension-less names are
/// treated as directories; a dotted directory name comes through as a file
/// removal and the pipeline sweeps whatever was indexed below it.
fn looks_like_directory(path: &Path) -> bool {
    path.is_dir() || (!path.exists() && path.extension().is_none())
}

fn map_event(root: &Path, event: Event) -> Mapped {
    if event.need_rescan() || matches!(event.kind, EventKind::Other) {
        return Mapped::Overflow;
    }

    let change = |path: &PathBuf, action: ChangeAction, is_directory: bool| {
        let path = normalize_path(path);
        (path.starts_with(root) && path != root).then_some(RawChange {
            path,
            action,
            is_directory,
        })
    };

    let paths = &event.paths;
    let changes: Vec<RawChange> = match event.kind {
        EventKind::Access(_) => Vec::new(),
        EventKind::Create(kind) => paths
            .iter()
            .filter_map(|path| {
                let is_dir = match kind {
                    CreateKind::Folder => true,
                    CreateKind::File => false,
                    _ => path.is_dir(),
                };
                change(path, ChangeAction::Added, is_dir)
            })
            .collect(),
        EventKind::Remove(kind) => paths
            .iter()
            .filter_map(|path| {
                let is_dir = match kind {
                    RemoveKind::Folder => true,
                    RemoveKind::File => false,
                    _ => looks_like_directory(path),
                };
                change(path, ChangeAction::Removed, is_dir)
            })
            .collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => paths
                .iter()
                .filter_map(|p| {
                    let is_dir = looks_like_directory(p);
                    change(p, ChangeAction::RenamedOldName, is_dir)
                })
                .collect(),
            RenameMode::To => paths
                .iter()
                .filter_map(|p| {
                    change(p, ChangeAction::RenamedNewName, p.is_dir())
                })
                .collect(),
            RenameMode::Both => {
                let is_dir = paths.last().is_some_and(|p| p.is_dir());
                let mut mapped = Vec::new();
                if let Some(old) = paths.first() {
                    mapped.extend(change(
                        old,
                        ChangeAction::RenamedOldName,
                        is_dir,
                    ));
                }
                if let Some(new) = paths.get(1) {
                    mapped.extend(change(
                        new,
                        ChangeAction::RenamedNewName,
                        is_dir,
                    ));
                }
                mapped
            }
            _ => paths
                .iter()
                .filter_map(|p| {
                    if p.exists() {
                        change(p, ChangeAction::RenamedNewName, p.is_dir())
                    } else {
                        let is_dir = looks_like_directory(p);
                        change(p, ChangeAction::RenamedOldName, is_dir)
                    }
                })
                .collect(),
        },
        EventKind::Modify(_) | EventKind::Any => paths
            .iter()
            .filter_map(|p| change(p, ChangeAction::Modified, p.is_dir()))
            .collect(),
        EventKind::Other => return Mapped::Overflow,
    };
    Mapped::Changes(changes)
}

#[derive(Debug)]
enum FeedMessage {
    Buffer(Vec<u8>),
    Error(String),
}

/// Producer side of a [`BufferChangeSource`].
#[derive(Debug, Clone)]
pub struct BufferFeed {
    tx: Sender<FeedMessage>,
}

impl BufferFeed {
    /// Deliver a raw notification buffer. Returns `false` once the source
    /// is gone.
    pub fn push(&self, buffer: Vec<u8>) -> bool {
        self.tx.send(FeedMessage::Buffer(buffer)).is_ok()
    }

    pub fn push_records(&self, records: &[BufferRecord]) -> bool {
        if records.is_empty() {
            return true;
        }
        self.push(native_buffer::encode(records))
    }

    /// Report lost events.
    pub fn overflow(&self) -> bool {
        self.push(Vec::new())
    }

    /// Report a backend failure.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.tx.send(FeedMessage::Error(message.into())).is_ok()
    }
}

/// Change source decoding native notification buffers handed over by a
/// [`BufferFeed`].
#[derive(Debug)]
pub struct BufferChangeSource {
    root: PathBuf,
    rx: Receiver<FeedMessage>,
    wake: Receiver<()>,
    interrupter: Interrupter,
}

impl BufferChangeSource {
    pub fn new(root: &Path) -> (Self, BufferFeed) {
        let (tx, rx) = unbounded();
        let (interrupter, wake) = Interrupter::pair();
        (
            Self {
                root: normalize_path(root),
                rx,
                wake,
                interrupter,
            },
            BufferFeed { tx },
        )
    }

    fn decode(&self, buffer: &[u8]) -> SourceEvent {
        match native_buffer::decode(buffer) {
            Ok(DecodedBuffer::Overflow) => SourceEvent::Overflow,
            Ok(DecodedBuffer::Records(records)) => SourceEvent::Changes(
                records
                    .into_iter()
                    .filter_map(|record| {
                        let path = join_within_root(
                            &self.root,
                            &record.relative_path(),
                        )?;
                        (path != self.root).then_some(RawChange {
                            path,
                            action: record.action,
                            is_directory: record.is_directory,
                        })
                    })
                    .collect(),
            ),
            Err(err) => {
                warn!(
                    target: "watch::source",
                    root = %self.root.display(),
                    error = %err,
                    "undecodable notification buffer"
                );
                SourceEvent::Failed(err.to_string())
            }
        }
    }
}

impl ChangeSource for BufferChangeSource {
    fn next_batch(&mut self, timeout: Option<Duration>) -> SourceEvent {
        match wait_for(&self.rx, &self.wake, timeout) {
            Ok(FeedMessage::Buffer(buffer)) => self.decode(&buffer),
            Ok(FeedMessage::Error(message)) => SourceEvent::Failed(message),
            Err(event) => event,
        }
    }

    fn interrupter(&self) -> Interrupter {
        self.interrupter.clone()
    }
}

/// [`ChangeSourceFactory`] producing [`BufferChangeSource`]s whose feeds can
/// be looked up by root.
#[derive(Debug, Default)]
pub struct BufferFeedFactory {
    feeds: Mutex<HashMap<PathBuf, BufferFeed>>,
    refused: Mutex<HashMap<PathBuf, String>>,
}

impl BufferFeedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed of the most recently opened source for `root`.
    pub fn feed(&self, root: &Path) -> Option<BufferFeed> {
        self.feeds.lock().get(&normalize_path(root)).cloned()
    }

    /// Make future opens of `root` fail with `message`.
    pub fn refuse(&self, root: &Path, message: impl Into<String>) {
        self.refused
            .lock()
            .insert(normalize_path(root), message.into());
    }
}

impl ChangeSourceFactory for BufferFeedFactory {
    fn open(&self, root: &Path) -> Result<Box<dyn ChangeSource>> {
        let root = normalize_path(root);
        if let Some(message) = self.refused.lock().get(&root) {
            return Err(IndexError::WatcherStart {
                path: root,
                message: message.clone(),
            });
        }
        let (source, feed) = BufferChangeSource::new(&root);
        self.feeds.lock().insert(root, feed);
        Ok(Box::new(source))
    }
}
