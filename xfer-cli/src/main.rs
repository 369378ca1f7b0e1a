//! # xfer
//!
//! Command-line client for client-side encrypted, chunked file transfer.
//!
//! ## Commands
//!
//! - `upload`: Seal a file chunk by chunk and submit it to the endpoint
//! - `seal`: Seal a file locally and print its key
//! - `open`: Open a sealed file with its key or share link
//!
//! ## Example
//!
//! ```bash
//! # Upload and print the share link (key in the fragment)
//! xfer upload report.pdf --endpoint https://password.exchange/upload \
//!     --meta firstname=Ada --meta other_email=bob@example.com
//!
//! # Seal locally, then open again
//! KEY=$(xfer seal report.pdf)
//! xfer open report.pdf.sealed --key "$KEY"
//! ```

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{open, seal, upload};
use config::Config;

/// Client-side encrypted, chunked file transfer.
#[derive(Parser, Debug)]
#[command(name = "xfer")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (default: xfer.toml in the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Seal a file chunk by chunk and upload it
    Upload {
        /// File to upload
        file: PathBuf,

        /// Submit-chunk endpoint URL
        #[arg(long, short)]
        endpoint: Option<String>,

        /// Plaintext chunk size in bytes
        #[arg(long)]
        chunk_size: Option<u64>,

        /// Interior chunks in flight at once (1-64)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Per-request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Resubmissions per chunk after a network error
        #[arg(long)]
        retries: Option<u32>,

        /// File name sent with each chunk (default: the file's own name)
        #[arg(long)]
        name: Option<String>,

        /// Form field sent with the first chunk (repeatable)
        #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        metadata: Vec<(String, String)>,

        /// Use mock transport instead of the real endpoint (for testing/demo)
        #[arg(long)]
        mock: bool,
    },

    /// Seal a file locally and print the key
    Seal {
        /// File to seal
        input: PathBuf,

        /// Output path (default: <input>.sealed)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Plaintext chunk size in bytes
        #[arg(long)]
        chunk_size: Option<u64>,
    },

    /// Open a sealed file
    Open {
        /// Sealed file
        input: PathBuf,

        /// Key fragment or full share link
        #[arg(long, short)]
        key: String,

        /// Output path (default: <input> without .sealed)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Plaintext chunk size the file was sealed with
        #[arg(long)]
        chunk_size: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Upload {
            file,
            endpoint,
            chunk_size,
            concurrency,
            timeout,
            retries,
            name,
            metadata,
            mock,
        } => {
            let mut session = config.upload_config()?;
            if let Some(size) = chunk_size {
                session.chunk_size = size;
            }
            if let Some(n) = concurrency {
                session.max_concurrency = n;
            }
            for (key, value) in metadata {
                session
                    .metadata
                    .insert(key, value)
                    .context("Invalid --meta field")?;
            }

            let args = upload::UploadArgs {
                endpoint: endpoint.or_else(|| config.upload.endpoint.clone()),
                session,
                file_name: name,
                timeout: timeout
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| config.upload.timeout()),
                retries: retries.unwrap_or(config.upload.retries),
            };
            upload::run(&file, args, mock).await?;
        }
        Commands::Seal {
            input,
            output,
            chunk_size,
        } => {
            let chunk_size = chunk_size.unwrap_or(config.upload.chunk_size);
            seal::run(&input, output.as_deref(), chunk_size).await?;
        }
        Commands::Open {
            input,
            key,
            output,
            chunk_size,
        } => {
            let chunk_size = chunk_size.unwrap_or(config.upload.chunk_size);
            open::run(&input, &key, output.as_deref(), chunk_size).await?;
        }
    }

    Ok(())
}

/// Install the stderr log subscriber.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Parse a `KEY=VALUE` pair.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))?;
    if key.is_empty() {
        return Err(format!("empty field name in {s:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}
