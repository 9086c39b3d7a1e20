//! Bookshelf Ask - command line front end for the book server.
//!
//! Launches `bookshelf-rpc` as a child process, asks each question given on
//! the command line and prints the answers.

use anyhow::{Context, Result};
use bookshelf_core::{Advisor, ClientConfig, ServerConfig};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const SESSION: &str = "cli";

#[derive(Parser, Debug)]
#[command(name = "bookshelf-ask")]
#[command(about = "Ask questions about a book corpus")]
#[command(version)]
struct Args {
    /// Server executable (defaults to bookshelf-rpc next to this binary)
    #[arg(long)]
    server: Option<PathBuf>,

    /// Corpus file passed to the server
    #[arg(short, long, default_value = ServerConfig::DEFAULT_CORPUS_FILE)]
    corpus: PathBuf,

    /// Seconds to wait for each response
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Print the tools the server offers
    #[arg(long)]
    list_tools: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Questions to ask, one answer each
    questions: Vec<String>,
}

fn default_server_path() -> Result<PathBuf> {
    let exe = std::env::current_exe()?;
    let dir = exe
        .parent()
        .context("executable has no parent directory")?;
    Ok(dir.join(format!(
        "{}{}",
        ServerConfig::BINARY_NAME,
        std::env::consts::EXE_SUFFIX
    )))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let server = match args.server {
        Some(path) => path,
        None => default_server_path()?,
    };
    let mut config = ClientConfig::bookshelf_server(&server, &args.corpus);
    if args.debug {
        config = config.with_arg("--debug");
    }
    if let Some(secs) = args.timeout_secs {
        config = config.with_request_timeout(Duration::from_secs(secs));
    }
    debug!("Server command: {}", config.display_command());

    let advisor = Advisor::launch(config)
        .await
        .with_context(|| format!("failed to start {}", server.display()))?;

    if args.list_tools {
        for tool in advisor.list_tools().await? {
            println!("{}: {}", tool.name, tool.description);
        }
    }

    for (i, question) in args.questions.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{}", advisor.ask(SESSION, question).await);
    }

    if let Err(e) = advisor.stop().await {
        warn!("Server did not stop cleanly: {}", e);
    }
    Ok(())
}
