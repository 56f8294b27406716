//! # Knowledge Harness CLI (`kb`)
//!
//! The `kb` binary records engineering experience entries, builds the vector
//! index over them, and answers semantic queries.
//!
//! ## Usage
//!
//! ```bash
//! kb --config ./config/kb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kb init` | Create the SQLite database and schema |
//! | `kb record --intent ...` | Record a new experience entry |
//! | `kb update <id> ...` | Change fields of an entry |
//! | `kb get <id>` | Show an entry |
//! | `kb list` | List all entries |
//! | `kb delete <id>` | Delete an entry |
//! | `kb import <file>` | Upsert entries from JSONL |
//! | `kb export` | Write all entries as JSONL |
//! | `kb build` | Build or refresh the vector index |
//! | `kb query "<text>"` | Semantic search over the last build |
//! | `kb status` | Entry counts and index state |
//! | `kb reset` | Delete the persisted index |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `warn`,
//! `-v` raises it to `info`).

use clap::{Args, Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use knowledge_harness::builder::{self, BuildMode};
use knowledge_harness::models::{EntryUpdate, NewEntry};
use knowledge_harness::{config, entries, export, migrate, retrieval, status};

/// Knowledge Harness: a local knowledge base of engineering experience with
/// incremental semantic indexing.
#[derive(Parser)]
#[command(
    name = "kb",
    about = "Knowledge Harness: record engineering experience and retrieve it semantically",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kb.toml")]
    config: PathBuf,

    /// Log progress at info level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Record a new experience entry.
    ///
    /// The entry is searchable after the next `kb build`.
    Record(RecordArgs),

    /// Update fields of an existing entry. Unspecified fields are kept.
    Update {
        /// Entry id.
        id: String,
        #[command(flatten)]
        fields: UpdateArgs,
    },

    /// Show an entry by id.
    Get {
        /// Entry id.
        id: String,
    },

    /// List all entries.
    List,

    /// Delete an entry by id.
    Delete {
        /// Entry id.
        id: String,
    },

    /// Import entries from a JSONL file (upsert by id).
    Import {
        /// Path to the `.jsonl` file.
        path: PathBuf,
    },

    /// Export all entries as JSONL.
    Export {
        /// Output file. Writes to stdout if omitted.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Build or refresh the vector index.
    ///
    /// `auto` refreshes incrementally when the persisted index was built with
    /// the configured embedding model, and rebuilds from scratch otherwise.
    Build {
        /// Build mode: `auto`, `full`, or `incremental`.
        #[arg(long, default_value = "auto")]
        mode: String,

        /// Always rebuild from scratch.
        #[arg(long)]
        force: bool,
    },

    /// Query the index.
    Query {
        /// Natural-language query.
        query: String,

        /// Number of results (default: `[retrieval].top_k`).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Show entry counts and index state.
    Status,

    /// Delete the persisted index and manifest. Entries are kept.
    Reset {
        /// Skip the confirmation prompt.
        #[arg(short = 'y', long = "yes")]
        yes: bool,
    },
}

#[derive(Args)]
struct RecordArgs {
    /// Short title describing what the entry helps with.
    #[arg(long)]
    intent: String,
    #[arg(long, default_value = "")]
    problem_context: String,
    #[arg(long, default_value = "")]
    root_cause: String,
    #[arg(long, default_value = "")]
    solution_steps: String,
    #[arg(long, default_value = "")]
    evidence: String,
    /// Comma-separated keywords.
    #[arg(long, default_value = "")]
    tags: String,
    #[arg(long, default_value = "")]
    contributor: String,
}

#[derive(Args)]
struct UpdateArgs {
    #[arg(long)]
    intent: Option<String>,
    #[arg(long)]
    problem_context: Option<String>,
    #[arg(long)]
    root_cause: Option<String>,
    #[arg(long)]
    solution_steps: Option<String>,
    #[arg(long)]
    evidence: Option<String>,
    #[arg(long)]
    tags: Option<String>,
    #[arg(long)]
    contributor: Option<String>,
}

impl From<RecordArgs> for NewEntry {
    fn from(a: RecordArgs) -> Self {
        NewEntry {
            intent: a.intent,
            problem_context: a.problem_context,
            root_cause: a.root_cause,
            solution_steps: a.solution_steps,
            evidence: a.evidence,
            tags: a.tags,
            contributor: a.contributor,
        }
    }
}

impl From<UpdateArgs> for EntryUpdate {
    fn from(a: UpdateArgs) -> Self {
        EntryUpdate {
            intent: a.intent,
            problem_context: a.problem_context,
            root_cause: a.root_cause,
            solution_steps: a.solution_steps,
            evidence: a.evidence,
            tags: a.tags,
            contributor: a.contributor,
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    eprint!("{} (y/n): ", prompt);
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Record(args) => {
            entries::run_record(&cfg, &args.into()).await?;
        }
        Commands::Update { id, fields } => {
            entries::run_update(&cfg, &id, &fields.into()).await?;
        }
        Commands::Get { id } => {
            entries::run_get(&cfg, &id).await?;
        }
        Commands::List => {
            entries::run_list(&cfg).await?;
        }
        Commands::Delete { id } => {
            entries::run_delete(&cfg, &id).await?;
        }
        Commands::Import { path } => {
            export::run_import(&cfg, &path).await?;
        }
        Commands::Export { output } => {
            export::run_export(&cfg, output.as_deref()).await?;
        }
        Commands::Build { mode, force } => {
            let mode: BuildMode = mode.parse()?;
            builder::run_build(&cfg, mode, force).await?;
        }
        Commands::Query { query, top_k } => {
            retrieval::run_query(&cfg, &query, top_k).await?;
        }
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
        Commands::Reset { yes } => {
            println!("=== Index Reset ===");
            println!("Target: {}", cfg.index.storage_dir.display());
            if !yes && !confirm("This will DELETE the persisted index. Are you sure?")? {
                println!("Aborted.");
                return Ok(());
            }
            status::run_reset(&cfg)?;
        }
    }

    Ok(())
}
