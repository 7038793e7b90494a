//! Probe for the REMC offline worker.
//!
//! Registers the worker against a running REMC server, replays a few page
//! requests through it and prints what was served and cached.
//!
//! ## Usage
//!
//! ```bash
//! # Install against a local server and fetch two pages
//! remc-sw-probe check --origin http://localhost:5000/ /projects /api/stats
//!
//! # Same, with a config file and JSON logs
//! REMC_LOG=debug remc-sw-probe --log-format json check --config remc-sw.json /help
//!
//! # Debug logs with source locations
//! remc-sw-probe --verbose check /projects
//!
//! # Print the effective configuration
//! remc-sw-probe config --origin https://remc.example.com/
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use remc_common::{init_logging, LogConfig, LogFormat, RemcError};
use remc_net::{HttpFetcher, LoaderConfig, Request};
use remc_sw::{CacheStorage, MemoryCacheStorage, ServedFrom, WorkerConfig, WorkerHost};
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

#[derive(Parser)]
#[command(name = "remc-sw-probe")]
#[command(about = "Exercise the REMC offline worker against a live server")]
struct Cli {
    /// Log output format (pretty, compact, json)
    #[arg(long, default_value = "compact")]
    log_format: LogFormat,

    /// Debug-level logs with source locations
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the worker, fetch the given paths and report
    Check {
        /// Worker configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Origin to run against, overriding the config file
        #[arg(long)]
        origin: Option<Url>,
        /// Write the JSON report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Paths to request once the worker is active
        paths: Vec<String>,
    },

    /// Print the effective worker configuration
    Config {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        origin: Option<Url>,
    },
}

#[derive(Debug, Serialize)]
struct Report {
    origin: String,
    version: String,
    state: Option<String>,
    install_error: Option<String>,
    caches: Vec<CacheReport>,
    fetches: Vec<FetchReport>,
}

#[derive(Debug, Serialize)]
struct CacheReport {
    name: String,
    entries: usize,
}

#[derive(Debug, Serialize)]
struct FetchReport {
    path: String,
    status: Option<u16>,
    served_from: Option<&'static str>,
}

fn load_config(path: Option<&Path>, origin: Option<Url>) -> Result<WorkerConfig, RemcError> {
    let mut config = match path {
        Some(path) => WorkerConfig::load(path)?,
        None => WorkerConfig::default(),
    };
    if let Some(origin) = origin {
        config.origin = origin;
    }
    config.validate()?;
    Ok(config)
}

fn served_from_label(from: ServedFrom) -> &'static str {
    match from {
        ServedFrom::Network => "network",
        ServedFrom::Cache => "cache",
        ServedFrom::OfflineFallback => "offline-fallback",
    }
}

async fn check(config: WorkerConfig, paths: &[String]) -> Result<Report, RemcError> {
    let fetcher = HttpFetcher::new(config.origin.clone(), LoaderConfig::default())?;
    let caches = Arc::new(MemoryCacheStorage::new());
    let (host, mut events) = WorkerHost::new(caches.clone(), Arc::new(fetcher));

    let mut report = Report {
        origin: config.origin.to_string(),
        version: config.version.clone(),
        state: None,
        install_error: None,
        caches: Vec::new(),
        fetches: Vec::new(),
    };

    let origin = config.origin.clone();
    if let Err(err) = host.register(config).await {
        warn!(error = %err, "Worker did not install");
        report.install_error = Some(err.to_string());
    }
    while let Ok(event) = events.try_recv() {
        info!(?event, "Host event");
    }
    report.state = host.active().await.map(|worker| worker.state.to_string());

    for path in paths {
        let url = origin
            .join(path)
            .map_err(|e| RemcError::InvalidArgument(format!("{path}: {e}")))?;
        let request = if path.starts_with("/api/") {
            Request::get(url)
        } else {
            Request::navigate(url)
        };
        let served = host.fetch(request).await;
        report.fetches.push(FetchReport {
            path: path.clone(),
            status: served.as_ref().map(|s| s.response.status.as_u16()),
            served_from: served.as_ref().map(|s| served_from_label(s.from)),
        });
    }
    host.idle().await?;

    for name in caches.keys().await? {
        let entries = caches.len(&name).await.unwrap_or(0);
        report.caches.push(CacheReport { name, entries });
    }
    Ok(report)
}

fn log_config(cli: &Cli) -> LogConfig {
    let base = if cli.verbose {
        LogConfig::debug()
    } else {
        LogConfig::default()
    };
    base.with_format(cli.log_format)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(log_config(&cli))?;

    match cli.command {
        Commands::Check {
            config,
            origin,
            output,
            paths,
        } => {
            let config = load_config(config.as_deref(), origin)?;
            let report = check(config, &paths).await?;
            let json = serde_json::to_string_pretty(&report)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    println!("Report written to: {}", path.display());
                }
                None => println!("{json}"),
            }
            if report.install_error.is_some() {
                std::process::exit(1);
            }
        }

        Commands::Config { config, origin } => {
            let config = load_config(config.as_deref(), origin)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
