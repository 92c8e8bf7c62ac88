//! # docassist CLI
//!
//! The `docassist` binary indexes an upload directory, answers questions
//! grounded in it, generates structured documents from templates, and runs
//! the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! docassist --config ./config/docassist.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docassist init` | Create the ingestion directory and an empty store |
//! | `docassist index` | Load, chunk, embed and store every supported upload |
//! | `docassist ask "<question>"` | Answer a question from the indexed documents |
//! | `docassist status` | Show store size, embedding model and per-source counts |
//! | `docassist templates [type]` | List document templates |
//! | `docassist generate <type>` | Generate a document from a template |
//! | `docassist validate <file>` | Score a JSON document against its template |
//! | `docassist serve` | Start the HTTP server |
//! | `docassist completions <shell>` | Print a shell completion script |
//!
//! Log verbosity follows `RUST_LOG` (default `info`); logs go to stderr.

use clap::{CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use docassist::commands;
use docassist::config::{self, Config};
use docassist::progress::ProgressMode;
use docassist::server;
use docassist::status;

/// docassist: an AI document assistant over your own uploads.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. When the default file does not exist, built-in defaults apply.
#[derive(Parser)]
#[command(
    name = "docassist",
    about = "AI document assistant: index uploads, answer grounded questions, generate documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

const DEFAULT_CONFIG: &str = "./config/docassist.toml";

#[derive(Subcommand)]
enum Commands {
    /// Create the ingestion directory and initialize the vector store.
    ///
    /// Idempotent: running it on an existing store changes nothing.
    Init,

    /// Index every supported file in the ingestion directory.
    ///
    /// Files and chunks already in the store are skipped, so re-running
    /// only embeds what is new. Ctrl-C stops after the current batch.
    Index {
        /// Progress output on stderr: `off`, `human` or `json`.
        /// Defaults to `human` on a terminal, `off` otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Ask a question answered from the indexed documents.
    Ask {
        /// The question.
        question: String,
    },

    /// Show what the store holds.
    Status,

    /// List document templates.
    Templates {
        /// Only show this document type (`proposal`, `technical_doc`, `jira_ticket`).
        doc_type: Option<String>,
    },

    /// Generate a document section by section from the indexed documents.
    Generate {
        /// Document type.
        doc_type: String,

        /// Template key within the type; defaults to the first one.
        #[arg(long)]
        template: Option<String>,

        /// Known facts as `key=value` pairs (client name, requirements, ...).
        #[arg(long = "input", value_parser = commands::parse_key_val)]
        inputs: Vec<(String, String)>,

        /// JSON object file with more inputs; `--input` values win.
        #[arg(long)]
        inputs_file: Option<PathBuf>,
    },

    /// Validate a document read from a JSON file.
    ///
    /// The file holds `{ "document_type": ..., "template": ..., "content": {...} }`.
    Validate {
        /// Path to the JSON file.
        file: PathBuf,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Print a shell completion script to stdout.
    Completions {
        shell: clap_complete::Shell,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load(path: &Path) -> anyhow::Result<Config> {
    if path == Path::new(DEFAULT_CONFIG) && !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::default());
    }
    config::load_config(path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(
            *shell,
            &mut Cli::command(),
            "docassist",
            &mut std::io::stdout(),
        );
        return Ok(());
    }

    let cfg = load(&cli.config)?;

    match cli.command {
        Commands::Init => {
            commands::run_init(&cfg).await?;
        }
        Commands::Index { progress } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            commands::run_index_command(&cfg, mode).await?;
        }
        Commands::Ask { question } => {
            commands::run_ask(&cfg, &question).await?;
        }
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
        Commands::Templates { doc_type } => {
            commands::run_templates(&cfg, doc_type.as_deref())?;
        }
        Commands::Generate {
            doc_type,
            template,
            inputs,
            inputs_file,
        } => {
            commands::run_generate(&cfg, &doc_type, template, inputs, inputs_file).await?;
        }
        Commands::Validate { file } => {
            commands::run_validate(&cfg, &file)?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
