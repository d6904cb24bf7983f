use thiserror::Error;

use super::models::ScannerConfig;

/// Debounce windows below this collapse too little to be worth watching.
const SHORT_DEBOUNCE_MS: u64 = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigGuardRailError {
    #[error("{field} must be greater than zero")]
    ZeroBatchSize { field: &'static str },
    #[error("debounce_ms must be greater than zero")]
    ZeroDebounce,
    #[error("extension allow-list is empty; nothing would ever be indexed")]
    EmptyExtensions,
    #[error("max_queued must be greater than zero")]
    ZeroQueue,
    #[error(
        "thumbnail_size must be greater than zero when thumbnails are enabled"
    )]
    ZeroThumbnailSize,
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Reject settings the scanner cannot run with and collect the ones that
/// merely look suspicious.
pub fn apply_guard_rails(
    config: &ScannerConfig,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    for (field, value) in [
        ("hash_batch_size", config.hash_batch_size),
        ("process_batch_size", config.process_batch_size),
        ("persist_batch_size", config.persist_batch_size),
    ] {
        if value == 0 {
            return Err(ConfigGuardRailError::ZeroBatchSize { field });
        }
    }

    if config.debounce_ms == 0 {
        return Err(ConfigGuardRailError::ZeroDebounce);
    }

    if config
        .extensions
        .iter()
        .all(|ext| ext.trim_start_matches('.').trim().is_empty())
    {
        return Err(ConfigGuardRailError::EmptyExtensions);
    }

    if config.max_queued == 0 {
        return Err(ConfigGuardRailError::ZeroQueue);
    }

    if config.generate_thumbnails && config.thumbnail_size == 0 {
        return Err(ConfigGuardRailError::ZeroThumbnailSize);
    }

    if config.debounce_ms < SHORT_DEBOUNCE_MS {
        warnings.push_with_hint(
            format!(
                "debounce_ms = {} is very short; bursts may split into \
                 several passes",
                config.debounce_ms
            ),
            "Use at least 50 ms unless the filesystem reports changes in a \
             single batch",
        );
    }

    let threads = config.pool_config().threads;
    if config.max_queued < threads {
        warnings.push_with_hint(
            format!(
                "max_queued = {} is below the worker count ({threads}); \
                 workers will idle",
                config.max_queued
            ),
            "Raise max_queued to at least worker_threads",
        );
    }

    if !config.bootstrap_scan {
        warnings.push(
            "bootstrap_scan is disabled; files present before a watcher \
             starts are only indexed by an explicit scan",
        );
    }

    Ok(warnings)
}
