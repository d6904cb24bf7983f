use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lumen_config::{
    ScannerConfig, ScannerConfigSource, apply_guard_rails,
};
use lumen_core::{
    IndexService,
    ports::{InMemoryRepository, NoopThumbnails},
    runtime::RayonWorkerPool,
    scan::{
        ImageCrateCodecs, IgnoreRule, IndexPipeline, PipelineParts,
        StaticIgnoreRules,
    },
    types::ScanResult,
    watch::NotifySourceFactory,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "lumen-scan", about = "Index and watch Lumen media roots")]
struct Cli {
    /// Scanner config file (TOML or JSON); skips the environment lookup
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Watcher debounce window, e.g. "250ms" or "2s"
    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    debounce: Option<Duration>,
    /// Glob of files and folders to leave out, may be repeated
    #[arg(long = "ignore", global = true)]
    ignore: Vec<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a root once and print the result
    Scan {
        root: PathBuf,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        /// Only index files directly inside the root
        #[arg(long)]
        no_recursive: bool,
    },
    /// Watch roots until Ctrl-C, logging every gallery change
    Watch {
        #[arg(required = true)]
        roots: Vec<PathBuf>,
    },
}

fn load_config(cli: &Cli) -> Result<ScannerConfig> {
    let (mut config, source) = match &cli.config {
        Some(path) => (
            ScannerConfig::load_from_file(path)?,
            ScannerConfigSource::File(path.clone()),
        ),
        None => ScannerConfig::load_from_env()?,
    };
    info!(target: "lumen_scan", ?source, "scanner configuration loaded");

    if let Some(debounce) = cli.debounce {
        config.debounce_ms =
            u64::try_from(debounce.as_millis()).unwrap_or(u64::MAX);
    }

    let warnings = apply_guard_rails(&config)
        .context("scanner configuration rejected")?;
    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(target: "lumen_scan", hint = %hint, "{}", warning.message)
            }
            None => warn!(target: "lumen_scan", "{}", warning.message),
        }
    }

    Ok(config)
}

fn build_service(
    config: &ScannerConfig,
    ignore: &[String],
    repository: Arc<InMemoryRepository>,
) -> Result<IndexService> {
    let rules = StaticIgnoreRules::with_global(
        ignore.iter().map(IgnoreRule::glob).collect(),
    );
    let pool = RayonWorkerPool::new(config.pool_config())
        .context("failed to start the worker pool")?;
    let pipeline = IndexPipeline::new(
        PipelineParts {
            repository,
            ignore_rules: Arc::new(rules),
            thumbnails: Arc::new(NoopThumbnails),
            codecs: Arc::new(ImageCrateCodecs),
            pool: Arc::new(pool),
        },
        config.pipeline_config(),
    );
    Ok(IndexService::new(
        pipeline,
        Arc::new(NotifySourceFactory),
        config.watch_config(),
    ))
}

fn print_summary(result: &ScanResult) {
    println!("root:      {}", result.root.display());
    println!("files:     {}", result.total);
    println!("new:       {}", result.new);
    println!("updated:   {}", result.updated);
    println!("unchanged: {}", result.unchanged);
    println!("deleted:   {}", result.deleted);
    println!("hashed:    {}", result.hashed);
    println!("took:      {}", humantime::format_duration(result.duration));
    for issue in &result.errors {
        println!("error:     {}", issue.message);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let repository = Arc::new(InMemoryRepository::new());
    let service = build_service(&config, &cli.ignore, repository.clone())?;

    match cli.command {
        Command::Scan {
            root,
            json,
            no_recursive,
        } => {
            let mut options = config.scan_options();
            options.recursive = !no_recursive;
            let result = service
                .scan_once(&root, &options)
                .with_context(|| format!("scan of {} failed", root.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_summary(&result);
            }
        }
        Command::Watch { roots } => {
            let mut changes = service.subscribe();
            let options = config.scan_options();
            for root in &roots {
                service
                    .ensure_watcher(root, Some(options.clone()))
                    .with_context(|| {
                        format!("failed to watch {}", root.display())
                    })?;
                info!(target: "lumen_scan", root = %root.display(), "watching");
            }

            loop {
                tokio::select! {
                    signal = tokio::signal::ctrl_c() => {
                        signal.context("failed to listen for Ctrl-C")?;
                        info!(target: "lumen_scan", "shutting down");
                        break;
                    }
                    change = changes.recv() => match change {
                        Ok(_) => info!(
                            target: "lumen_scan",
                            assets = repository.live_count(),
                            "gallery changed"
                        ),
                        Err(RecvError::Lagged(missed)) => warn!(
                            target: "lumen_scan",
                            missed,
                            "change listener fell behind"
                        ),
                        Err(RecvError::Closed) => break,
                    },
                }
            }

            tokio::task::block_in_place(|| service.stop_all_watchers());
        }
    }

    Ok(())
}
