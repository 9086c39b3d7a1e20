//! Bookshelf RPC Server - line-delimited JSON-RPC over stdin/stdout.
//!
//! Loads a book corpus from a JSON file and answers `tools/*` and
//! `resources/*` requests until stdin closes or SIGTERM arrives.
//! Stdout carries protocol messages only; logs go to stderr.

use anyhow::{Context, Result};
use bookshelf_core::{serve_stdio, CorpusStore, ServerConfig};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "bookshelf-rpc")]
#[command(about = "Stdio JSON-RPC server for a book corpus")]
#[command(version)]
struct Args {
    /// JSON file holding an array of {id, title, content} records
    #[arg(short, long, default_value = ServerConfig::DEFAULT_CORPUS_FILE)]
    corpus: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs must never reach stdout
    let log_level = if args.debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting Bookshelf RPC Server");

    let store = CorpusStore::load(&args.corpus)
        .with_context(|| format!("failed to load corpus {}", args.corpus.display()))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(serve_stdio(Arc::new(store)));

    // The stdin reader sits on a blocking thread that never returns once the
    // peer has stopped writing.
    runtime.shutdown_background();

    result?;
    info!("Server stopped");
    Ok(())
}
