//! Boundaries the engine consumes: persistence, thumbnails and the
//! change-notification channel.

pub mod events;
pub mod repository;
pub mod thumbnails;

pub use events::{ChangeNotifier, GalleryChanged};
pub use repository::{AssetRepository, InMemoryRepository};
pub use thumbnails::{NoopThumbnails, ThumbnailService};
