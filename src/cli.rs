//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use bgdl_core::DownloadPolicy;

/// Download a file into application storage and wait for it to finish.
///
/// The transfer is tracked by the background download registry. Without a
/// platform download service it runs in-process over HTTP.
#[derive(Parser, Debug)]
#[command(name = "bgdl")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Storage root all destinations are relative to (default: current directory)
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Config file (default: $XDG_CONFIG_HOME/bgdl/config.toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Connectivity policy: wifi-only, allow-metered or always-allow
    #[arg(short, long)]
    pub policy: Option<DownloadPolicy>,

    /// Extra request header as `Name: value`; repeat for multiple values
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// HTTP connect timeout in seconds (1-3600)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub connect_timeout: Option<u64>,

    /// HTTP read timeout in seconds (1-3600)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub read_timeout: Option<u64>,

    /// Print the final download summary as JSON
    #[arg(long)]
    pub json: bool,

    /// URL to download
    pub url: String,

    /// Destination path relative to the storage root
    pub destination: PathBuf,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let Some((name, value)) = raw.split_once(':') else {
        return Err(format!("expected NAME:VALUE, got '{raw}'"));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err("header name must not be empty".to_string());
    }
    Ok((name.to_string(), value.trim().to_string()))
}
