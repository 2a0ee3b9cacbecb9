//! # vecstore CLI
//!
//! ```bash
//! vecstore --config ./config/vecstore.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vecstore create <path>` | Create (or re-open) a collection at an absolute path |
//! | `vecstore files <path>` | Load a collection and list its files |
//! | `vecstore add <file>` | Extract, split, embed and store a file |
//! | `vecstore delete <name>` | Delete a file's chunks |
//! | `vecstore ask "<question>"` | Answer from the collection, or the bare model without one |
//! | `vecstore serve` | Start the HTTP API |
//!
//! `add`, `delete` and `ask` take `--collection <path>`, falling back to
//! `[collection].path` in the config.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use vecstore::config::{self, Config};
use vecstore::progress::ProgressMode;
use vecstore::server;
use vecstore::session::{AskRequest, Session};

#[derive(Parser)]
#[command(
    name = "vecstore",
    about = "Chat with a persisted collection of your documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). A missing file means defaults.
    #[arg(long, global = true, default_value = "./config/vecstore.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to `human` on a terminal, else `off`.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create a collection. The path must be absolute.
    Create { path: String },

    /// Load a collection and list the files stored in it.
    Files { path: String },

    /// Add a file (txt, md, pdf, docx, ...) to a collection.
    ///
    /// Fails if a file with the same name is already stored.
    Add {
        file: PathBuf,
        #[arg(long)]
        collection: Option<String>,
    },

    /// Delete every chunk of a file, by file name.
    Delete {
        name: String,
        #[arg(long)]
        collection: Option<String>,
    },

    /// Ask a question.
    ///
    /// Without a collection the configured chat model answers on its own.
    Ask {
        question: String,
        #[arg(long)]
        collection: Option<String>,
        /// Restrict retrieval to this file.
        #[arg(long)]
        file: Option<String>,
        /// Chat model (Azure: deployment name).
        #[arg(long)]
        model: Option<String>,
        /// stuff, map_reduce, refine or map_rerank.
        #[arg(long)]
        chain_type: Option<String>,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn collection_or_default(arg: Option<String>, cfg: &Config) -> Option<String> {
    arg.or_else(|| {
        cfg.collection
            .path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config_or_default(&cli.config)?;
    let progress = cli
        .progress
        .map(ProgressMode::from)
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();

    match cli.command {
        Commands::Create { path } => {
            let mut session = Session::from_config(cfg);
            let notice = session.create_collection(&path).await?;
            println!("{}", notice);
        }
        Commands::Files { path } => {
            let mut session = Session::from_config(cfg);
            let outcome = session.load_collection(Some(&path)).await?;
            for name in &outcome.files {
                println!("{}", name);
            }
            eprintln!("{} ({} files)", outcome.notice, outcome.files.len());
        }
        Commands::Add { file, collection } => {
            let collection = collection_or_default(collection, &cfg);
            let mut session = Session::from_config(cfg);
            let outcome = session
                .ingest_file(collection.as_deref(), Some(file.as_path()), progress.as_ref())
                .await?;
            println!("Added {} ({} chunks)", outcome.file_name, outcome.chunks);
        }
        Commands::Delete { name, collection } => {
            let collection = collection_or_default(collection, &cfg);
            let mut session = Session::from_config(cfg);
            if let Some(path) = collection.as_deref() {
                session.load_collection(Some(path)).await?;
            }
            let outcome = session.delete_file(&name, progress.as_ref()).await?;
            println!("{} ({} chunks)", outcome.notice, outcome.removed);
        }
        Commands::Ask {
            question,
            collection,
            file,
            model,
            chain_type,
        } => {
            let collection_path = collection_or_default(collection, &cfg);
            let mut session = Session::from_config(cfg);
            let answer = session
                .ask(&AskRequest {
                    question,
                    model,
                    chain_type,
                    collection_path,
                    file,
                })
                .await?;
            session.resolve_pending();

            if let Some(notice) = &answer.notice {
                eprintln!("{}", notice);
            }
            println!("{}", answer.result);
            if !answer.source_documents.is_empty() {
                println!();
                println!("Sources:");
                for doc in &answer.source_documents {
                    println!("  {}", doc.source().unwrap_or("(unknown)"));
                }
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
