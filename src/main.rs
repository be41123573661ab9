//! # docqa CLI
//!
//! The `docqa` binary ingests documents into a Pinecone index and answers
//! questions about them.
//!
//! ## Usage
//!
//! ```bash
//! docqa [--config ./docqa.toml] [-v] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa ingest [ROOT]` | Load, chunk, embed and upsert every file under ROOT |
//! | `docqa chat` | Interactive question answering session |
//! | `docqa ask "<question>"` | Answer one question and exit |
//! | `docqa index init` | Create the index if it does not exist |
//! | `docqa index status` | Describe the index |
//! | `docqa completions <shell>` | Print shell completions |
//!
//! Credentials come from the environment (`PINECONE_API_KEY`,
//! `OPENAI_API_KEY`); a `.env` file in the working directory is loaded
//! first.

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docqa::chat;
use docqa::config::{self, Config};
use docqa::ingest::{self, IngestOptions};
use docqa::pinecone::PineconeClient;
use docqa::progress::ProgressMode;
use docqa::vector_store::open_index;

/// docqa: ask questions about your documents.
///
/// Every command reads an optional TOML config file and then the
/// environment. See `docqa.example.toml` for all settings.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "Ingest documents into Pinecone and chat with them through OpenAI",
    version
)]
struct Cli {
    /// Path to a configuration file (TOML).
    ///
    /// Defaults to `./docqa.toml` when that file exists.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr (`RUST_LOG` takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest every supported file under a directory.
    ///
    /// Files are loaded by type, split into overlapping chunks, embedded
    /// and upserted. The index is created on first use.
    Ingest {
        /// Directory to ingest (defaults to `ingest.root`, `./data`).
        root: Option<PathBuf>,

        /// Load and chunk only: no network calls, no credentials needed.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of files to process.
        #[arg(long)]
        limit: Option<usize>,

        /// Stop at the first file that fails to load.
        #[arg(long)]
        fail_fast: bool,

        /// Progress output on stderr. Defaults to `human` on a terminal.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Start an interactive chat session.
    Chat {
        /// Print the sources used for each answer.
        #[arg(long)]
        show_sources: bool,
    },

    /// Answer a single question.
    Ask {
        question: String,

        /// Print the sources used for the answer.
        #[arg(long)]
        show_sources: bool,
    },

    /// Manage the Pinecone index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Print shell completions.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Create the index if absent and wait until it is ready.
    Init,
    /// Show name, dimension, metric, host and readiness.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "docqa", &mut std::io::stdout());
        return Ok(());
    }

    // A missing .env is fine; credentials may come from the real environment.
    dotenvy::dotenv().ok();

    let filter = if cli.verbose { "docqa=debug" } else { "docqa=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest {
            root,
            dry_run,
            limit,
            fail_fast,
            progress,
        } => {
            let opts = IngestOptions {
                root,
                dry_run,
                limit,
                fail_fast,
                progress: progress.unwrap_or_else(ProgressMode::default_for_tty),
            };
            ingest::run_ingest(&cfg, &opts).await?;
        }
        Commands::Chat { show_sources } => {
            chat::run_chat(&cfg, show_sources).await?;
        }
        Commands::Ask {
            question,
            show_sources,
        } => {
            chat::run_ask(&cfg, &question, show_sources).await?;
        }
        Commands::Index { action } => match action {
            IndexAction::Init => index_init(&cfg).await?,
            IndexAction::Status => index_status(&cfg).await?,
        },
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}

async fn index_init(cfg: &Config) -> Result<()> {
    let ensured = open_index(cfg, cfg.embedding.dims).await?;
    let verb = if ensured.created { "created" } else { "exists" };
    println!("index {} {}", ensured.description.name, verb);
    println!("  host: {}", ensured.description.host);
    Ok(())
}

async fn index_status(cfg: &Config) -> Result<()> {
    let client = PineconeClient::from_config(&cfg.pinecone)?;
    let desc = client.describe_index(cfg.pinecone.require_index()?).await?;
    println!("index {}", desc.name);
    println!("  dimension: {}", desc.dimension);
    println!("  metric: {}", desc.metric);
    println!("  host: {}", desc.host);
    println!("  ready: {} ({})", desc.status.ready, desc.status.state);
    Ok(())
}
