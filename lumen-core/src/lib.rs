//! # Lumen Core
//!
//! Scan, change detection and watch engine for the Lumen media gallery.
//!
//! ## Overview
//!
//! `lumen-core` keeps an asset index in sync with one or more media roots on
//! disk:
//!
//! - **Scanning**: walks a root, filters by extension and ignore rules, and
//!   classifies every file against the index snapshot
//! - **Change detection**: size and modification time first, content hash
//!   (xxHash3-128) only when the cheap check disagrees
//! - **Processing**: builds asset records with dimensions, MIME and folder,
//!   in parallel batches on a shared worker pool
//! - **Watching**: one thread per root consumes native change notifications,
//!   debounces bursts and runs serialized incremental sync passes
//! - **Notification**: a single "gallery changed" signal per pass that
//!   changed the index
//!
//! ## Architecture
//!
//! - [`scan`]: walk, analyze, hash, process and the [`scan::IndexPipeline`]
//! - [`watch`]: change sources, watchers, the scheduler and the registry
//! - [`runtime`]: the bounded worker pool and chunked batch execution
//! - [`ports`]: repository, thumbnail and notification boundaries
//! - [`service`]: the [`IndexService`] facade
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use lumen_core::ports::{InMemoryRepository, NoopThumbnails};
//! use lumen_core::runtime::{PoolConfig, RayonWorkerPool};
//! use lumen_core::scan::{
//!     ImageCrateCodecs, IndexPipeline, PipelineParts, StaticIgnoreRules,
//! };
//! use lumen_core::types::{PipelineConfig, ScanOptions, WatchConfig};
//! use lumen_core::watch::NotifySourceFactory;
//! use lumen_core::IndexService;
//!
//! fn index(root: &Path) -> lumen_core::Result<()> {
//!     let pipeline = IndexPipeline::new(
//!         PipelineParts {
//!             repository: Arc::new(InMemoryRepository::new()),
//!             ignore_rules: Arc::new(StaticIgnoreRules::new()),
//!             thumbnails: Arc::new(NoopThumbnails),
//!             codecs: Arc::new(ImageCrateCodecs),
//!             pool: Arc::new(RayonWorkerPool::new(PoolConfig::default())?),
//!         },
//!         PipelineConfig::default(),
//!     );
//!     let service = IndexService::new(
//!         pipeline,
//!         Arc::new(NotifySourceFactory),
//!         WatchConfig::default(),
//!     );
//!
//!     let result = service.scan_once(root, &ScanOptions::default())?;
//!     println!("{} new, {} updated", result.new, result.updated);
//!
//!     service.ensure_watcher(root, None)?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod paths;
pub mod ports;
pub mod runtime;
pub mod scan;
pub mod service;
pub mod types;
pub mod watch;

pub use error::{ErrorKind, IndexError, Result};
pub use service::IndexService;
