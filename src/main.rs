//! CLI entry point for the background download tool.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use bgdl_core::{
    CONNECT_TIMEOUT_SECS, DownloadConfig, DownloadRegistry, DownloadStatus, READ_TIMEOUT_SECS,
    RegistrySettings,
};
use clap::Parser;
use tracing::{debug, info, warn};

mod app_config;
mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let file_config = app_config::load_file_config(args.config.as_deref())?;
    let settings = RegistrySettings::new(
        args.root
            .clone()
            .or_else(|| file_config.storage_root.clone())
            .unwrap_or_else(|| PathBuf::from(".")),
    )
    .with_timeouts(
        args.connect_timeout
            .or(file_config.connect_timeout_secs)
            .unwrap_or(CONNECT_TIMEOUT_SECS),
        args.read_timeout
            .or(file_config.read_timeout_secs)
            .unwrap_or(READ_TIMEOUT_SECS),
    );

    let mut config = DownloadConfig::parse(&args.url, args.destination.clone())
        .with_context(|| format!("Cannot download '{}'", args.url))?
        .with_policy(args.policy.or(file_config.policy).unwrap_or_default());
    for (name, value) in &args.headers {
        config = config.with_header(name, value);
    }

    // A plain process has no platform download service.
    let mut registry = DownloadRegistry::from_settings(&settings, None).await?;
    let download = registry.start(config).await?;
    info!(
        url = %args.url,
        destination = %download.final_path().display(),
        backend = %registry.backend_kind(),
        "download started"
    );

    let status = tokio::select! {
        status = download.wait() => status,
        interrupted = tokio::signal::ctrl_c() => {
            if let Err(error) = interrupted {
                warn!(error = %error, "failed to listen for interrupt");
            }
            registry.dispose(download.destination_path()).await?;
            bail!("Download interrupted");
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&download.summary())?);
    } else if status == DownloadStatus::Done {
        println!("{}", download.final_path().display());
    }

    let error = download.error();
    registry.dispose(download.destination_path()).await?;

    match status {
        DownloadStatus::Done => Ok(()),
        _ => bail!(
            "Download failed: {}",
            error.unwrap_or_else(|| "unknown error".to_string())
        ),
    }
}
