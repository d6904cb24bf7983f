use tokio::sync::broadcast;
use tracing::trace;

const DEFAULT_CAPACITY: usize = 64;

/// Signal that the indexed gallery changed. Consumers re-query the
/// repository for the new state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GalleryChanged;

/// Fan-out of [`GalleryChanged`] signals over a broadcast channel.
///
/// Publishing never blocks and never fails: with no subscribers the signal
/// is dropped, and slow subscribers observe `Lagged` instead of stalling
/// the watcher.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    sender: broadcast::Sender<GalleryChanged>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GalleryChanged> {
        self.sender.subscribe()
    }

    pub fn notify(&self) {
        let receivers = self.sender.send(GalleryChanged).unwrap_or(0);
        trace!(target: "watch::events", receivers, "gallery change published");
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}
