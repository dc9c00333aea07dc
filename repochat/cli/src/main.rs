//! repochat - Chat with indexed code repositories from the terminal
//!
//! Thin command-line surface over `repochat-core`. All protocol handling
//! (stream decoding, turn reconciliation, polling) lives in the core; this
//! binary only parses arguments and renders [`repochat_core::ClientMessage`]
//! updates.
//!
//! # Usage
//!
//! ```bash
//! # Submit a repository and follow ingestion
//! repochat ingest https://github.com/octo/widgets --watch
//!
//! # List repositories, refreshing every 10s
//! repochat list --watch
//!
//! # One question, streamed
//! repochat ask 3f2a... "Where is the HTTP server started?"
//!
//! # Interactive conversation
//! repochat chat 3f2a...
//!
//! # Another backend, verbose logging
//! RUST_LOG=debug repochat --api-url http://10.0.0.5:8000 list
//! ```
//!
//! # Signals
//!
//! - `SIGINT` (Ctrl-C): stops any watch loop; during a chat turn, cancels the turn

mod commands;
mod render;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use repochat_core::{load_config, load_config_from_path, ClientContext, ConfigOverrides};

/// repochat - Chat with indexed code repositories
#[derive(Parser, Debug)]
#[command(name = "repochat")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Backend base URL (overrides config file and REPOCHAT_API_URL)
    #[arg(short = 'u', long, value_name = "URL")]
    api_url: Option<String>,

    /// Status poll interval in milliseconds
    #[arg(long, value_name = "MS")]
    poll_interval_ms: Option<u64>,

    /// Timeout for non-streaming requests in seconds
    #[arg(long, value_name = "SECS")]
    request_timeout_secs: Option<u64>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "REPOCHAT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "REPOCHAT_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a repository for ingestion
    Ingest {
        /// Repository URL (http or https)
        url: String,

        /// Branch to index
        #[arg(short, long)]
        branch: Option<String>,

        /// Follow ingestion until it finishes
        #[arg(short, long)]
        watch: bool,
    },

    /// Show a repository's ingestion status
    Status {
        /// Repository ID
        repo_id: String,

        /// Keep polling until a terminal status
        #[arg(short, long)]
        watch: bool,
    },

    /// List repositories, newest first
    List {
        /// Keep refreshing
        #[arg(short, long)]
        watch: bool,
    },

    /// Delete a repository
    Delete {
        /// Repository ID
        repo_id: String,
    },

    /// Ask one question about a repository
    Ask {
        /// Repository ID
        repo_id: String,

        /// The question
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,

        /// Wait for the complete answer instead of streaming it
        #[arg(long)]
        no_stream: bool,
    },

    /// Interactive conversation about a repository
    Chat {
        /// Repository ID
        repo_id: String,
    },
}

/// Initialize logging on stderr so stdout carries only command output
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("repochat={level},repochat_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut config = match args.config {
        Some(path) => load_config_from_path(Some(path)),
        None => load_config(),
    }
    .context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(url) = args.api_url {
        overrides = overrides.with_base_url(url);
    }
    if let Some(ms) = args.poll_interval_ms {
        overrides = overrides.with_poll_interval_ms(ms);
    }
    if let Some(secs) = args.request_timeout_secs {
        overrides = overrides.with_request_timeout_secs(secs);
    }
    overrides
        .apply(&mut config)
        .context("Invalid command-line configuration")?;

    info!(
        base_url = %config.base_url,
        source = %config.source(),
        "Configuration loaded"
    );

    let ctx = ClientContext::from_config(config).context("Failed to create HTTP client")?;

    match args.command {
        Command::Ingest { url, branch, watch } => {
            commands::ingest(&ctx, &url, branch.as_deref(), watch).await
        }
        Command::Status { repo_id, watch } => commands::status(&ctx, &repo_id, watch).await,
        Command::List { watch } => commands::list(&ctx, watch).await,
        Command::Delete { repo_id } => commands::delete(&ctx, &repo_id).await,
        Command::Ask {
            repo_id,
            message,
            no_stream,
        } => commands::ask(ctx, &repo_id, &message.join(" "), !no_stream).await,
        Command::Chat { repo_id } => commands::chat(ctx, &repo_id).await,
    }
}
