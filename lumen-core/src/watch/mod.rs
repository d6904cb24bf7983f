//! Filesystem watching: native change sources, per-root watcher threads,
//! debounced pending change sets and the serialized sync scheduler.

pub mod native_buffer;
pub mod pending;
pub mod registry;
pub mod scheduler;
pub mod source;
pub mod watcher;

pub use native_buffer::{BufferError, BufferRecord, DecodedBuffer};
pub use pending::{PendingAction, PendingBatch, PendingChanges};
pub use registry::WatcherRegistry;
pub use scheduler::SyncScheduler;
pub use source::{
    BufferChangeSource, BufferFeed, BufferFeedFactory, ChangeAction,
    ChangeSource, ChangeSourceFactory, Interrupter, NotifyChangeSource,
    NotifySourceFactory, RawChange, SourceEvent,
};
pub use watcher::{FolderWatcher, WatcherPhase};
