use anyhow::{Context, anyhow};
use lumen_core::runtime::PoolConfig;
use lumen_core::types::{
    DeleteMode, PipelineConfig, ScanOptions, WatchConfig,
    default_media_extensions,
};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

/// Environment variable naming a TOML or JSON scanner config file.
pub const CONFIG_PATH_ENV: &str = "LUMEN_SCANNER_CONFIG_PATH";
/// Environment variable carrying an inline JSON scanner config.
pub const CONFIG_JSON_ENV: &str = "LUMEN_SCANNER_CONFIG_JSON";

/// Source that produced the scanner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScannerConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

/// Scanner and watcher tuning. Every field is optional in a config file;
/// missing ones fall back to the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Quiet period (ms) a watcher waits after the last change before it
    /// syncs. Shorter windows react faster; longer ones collapse big copy
    /// operations into fewer passes.
    pub debounce_ms: u64,
    /// Files hashed per worker-pool task.
    pub hash_batch_size: usize,
    /// Assets built per worker-pool task.
    pub process_batch_size: usize,
    /// Rows written per repository call.
    pub persist_batch_size: usize,
    /// Worker threads shared by every root. `0` picks one per CPU.
    pub worker_threads: usize,
    /// Tasks allowed in flight before the pool rejects submissions.
    pub max_queued: usize,
    /// Longest thumbnail edge in pixels.
    pub thumbnail_size: u32,
    pub generate_thumbnails: bool,
    pub delete_mode: DeleteMode,
    pub recursive: bool,
    /// Run a full rescan as soon as a watcher is registered.
    pub bootstrap_scan: bool,
    /// Extension allow-list, without the leading dot.
    pub extensions: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        let scan = ScanOptions::default();
        let pipeline = PipelineConfig::default();
        let pool = PoolConfig::default();
        Self {
            debounce_ms: WatchConfig::default().debounce_window.as_millis()
                as u64,
            hash_batch_size: pipeline.hash_batch_size,
            process_batch_size: pipeline.process_batch_size,
            persist_batch_size: pipeline.persist_batch_size,
            worker_threads: 0,
            max_queued: pool.max_queued,
            thumbnail_size: scan.thumbnail_size,
            generate_thumbnails: scan.generate_thumbnails,
            delete_mode: scan.delete_mode,
            recursive: scan.recursive,
            bootstrap_scan: scan.bootstrap_scan,
            extensions: default_media_extensions(),
        }
    }
}

impl ScannerConfig {
    /// Load scanner configuration overrides using environment variables.
    /// Evaluation order:
    /// 1) `$LUMEN_SCANNER_CONFIG_PATH` (TOML or JSON file),
    /// 2) `$LUMEN_SCANNER_CONFIG_JSON` (inline JSON),
    /// 3) the first default file found in the working directory,
    /// 4) defaults.
    pub fn load_from_env() -> anyhow::Result<(Self, ScannerConfigSource)> {
        if let Ok(path_str) = env::var(CONFIG_PATH_ENV)
            && !path_str.trim().is_empty()
        {
            let path = PathBuf::from(path_str);
            let config = Self::load_from_file(&path)?;
            return Ok((config, ScannerConfigSource::EnvPath(path)));
        }

        if let Ok(raw) = env::var(CONFIG_JSON_ENV)
            && !raw.trim().is_empty()
        {
            let parsed = Self::parse_json(&raw)
                .with_context(|| format!("failed to parse {CONFIG_JSON_ENV}"))?;
            return Ok((parsed, ScannerConfigSource::EnvInline));
        }

        if let Some(path) = Self::find_default_file(Path::new(".")) {
            let config = Self::load_from_file(&path)?;
            return Ok((config, ScannerConfigSource::File(path)));
        }

        Ok((Self::default(), ScannerConfigSource::Default))
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| {
            format!("failed to read scanner config from {}", path.display())
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents).with_context(|| {
                format!("invalid scanner config {}", path.display())
            }),
            Some("toml") | Some("tml") => {
                toml::from_str(&contents).map_err(|err| {
                    anyhow!(
                        "invalid scanner config {}: {}",
                        path.display(),
                        err
                    )
                })
            }
            _ => Self::parse_from_str(&contents, &path.display().to_string()),
        }
    }

    pub fn parse_from_str(
        contents: &str,
        origin: &str,
    ) -> anyhow::Result<Self> {
        toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                anyhow!(
                    "failed to parse scanner config {origin}: \
                     toml error: {toml_err}; json error: {json_err}"
                )
            })
        })
    }

    pub fn parse_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw)
            .map_err(|err| anyhow!("invalid scanner config json: {err}"))
    }

    /// First existing default config file under `base`.
    pub fn find_default_file(base: &Path) -> Option<PathBuf> {
        const CANDIDATES: &[&str] = &[
            "scanner.toml",
            "scanner.json",
            "config/scanner.toml",
            "config/scanner.json",
        ];

        CANDIDATES
            .iter()
            .map(|candidate| base.join(candidate))
            .find(|path| path.is_file())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            recursive: self.recursive,
            extensions: self.extensions.clone(),
            delete_mode: self.delete_mode,
            generate_thumbnails: self.generate_thumbnails,
            thumbnail_size: self.thumbnail_size,
            bootstrap_scan: self.bootstrap_scan,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            hash_batch_size: self.hash_batch_size,
            process_batch_size: self.process_batch_size,
            persist_batch_size: self.persist_batch_size,
        }
    }

    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            debounce_window: self.debounce(),
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        let defaults = PoolConfig::default();
        PoolConfig {
            threads: if self.worker_threads == 0 {
                defaults.threads
            } else {
                self.worker_threads
            },
            max_queued: self.max_queued,
        }
    }
}
