//! # Suggestion Gate CLI (`sgate`)
//!
//! The `sgate` binary is the primary interface for the suggestion engine.
//! It provides commands for database initialization, project indexing,
//! retrieval debugging, suggestion submission, approval responses, session
//! maintenance, and starting the HTTP front-end server.
//!
//! ## Usage
//!
//! ```bash
//! sgate --config ./config/sgate.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sgate init` | Create the SQLite database and run schema migrations |
//! | `sgate index [path]` | Index a project's files into the context store |
//! | `sgate embed` | Backfill missing or stale embeddings |
//! | `sgate retrieve "<query>"` | Show what the retriever would rank for a query |
//! | `sgate suggest "<query>"` | Run the full pipeline and print the gated suggestion |
//! | `sgate respond <id> <approve\|decline>` | Resolve an awaiting suggestion |
//! | `sgate sessions` | List sessions and their suggestion counts |
//! | `sgate history <session_id>` | Print a session's suggestion history |
//! | `sgate prune` | Apply the session retention policy |
//! | `sgate stats` | Engine statistics |
//! | `sgate serve` | Start the HTTP front-end API |

mod config;
mod db;
mod embedding;
mod engine;
mod indexer;
mod migrate;
mod provider;
mod server;
mod sqlite_store;
mod stats;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use suggestion_gate_core::gate::ApprovalDecision;
use suggestion_gate_core::models::Suggestion;
use suggestion_gate_core::store::{ChunkStore, SessionStore};

use crate::config::Config;
use crate::engine::{CursorLocation, Engine, EngineSettings, QueryRequest};
use crate::sqlite_store::SqliteStore;

/// Suggestion Gate CLI — a confidence-gated suggestion engine for local AI
/// coding assistants.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/sgate.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "sgate",
    about = "Suggestion Gate — a confidence-gated suggestion engine for local AI coding assistants",
    version,
    long_about = "Suggestion Gate pairs a locally-run model with a decision layer: it retrieves \
    relevant code context, scores each model suggestion with a bounded confidence value, and \
    either applies it automatically, routes it to a human approval gate, or rejects it."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/sgate.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent — running it multiple times is safe.
    Init,

    /// Index a project's files into the context store.
    ///
    /// Walks the given path (or `[indexing] root` from config), chunks
    /// every matching file, and embeds what changed. Unchanged files are
    /// no-ops, so re-running after an edit only touches the edited files.
    Index {
        /// Directory to index. Defaults to `[indexing] root` from config.
        path: Option<PathBuf>,

        /// Project namespace for the indexed chunks.
        #[arg(long, default_value = "default")]
        project: String,
    },

    /// Backfill missing or stale embeddings.
    Embed {
        /// Project namespace to backfill. All projects if omitted.
        #[arg(long)]
        project: Option<String>,

        /// Maximum number of chunks to process.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show what the retriever would rank for a query.
    Retrieve {
        /// The query text.
        query: String,

        /// Project namespace to search.
        #[arg(long, default_value = "default")]
        project: String,
    },

    /// Run the full pipeline: retrieve, complete, score, gate.
    Suggest {
        /// The query text.
        query: String,

        /// Project namespace.
        #[arg(long, default_value = "default")]
        project: String,

        /// Continue a specific session instead of the project's active one.
        #[arg(long)]
        session: Option<String>,

        /// File the suggestion targets.
        #[arg(long)]
        file: Option<String>,

        /// First line of the target region.
        #[arg(long, default_value_t = 1)]
        start_line: i64,

        /// Last line of the target region.
        #[arg(long, default_value_t = 1)]
        end_line: i64,
    },

    /// Resolve an awaiting suggestion with a human decision.
    Respond {
        /// The suggestion id.
        suggestion_id: String,

        /// `approve` or `decline`.
        decision: String,
    },

    /// List sessions.
    Sessions {
        /// Restrict to one project.
        #[arg(long)]
        project: Option<String>,
    },

    /// Print a session's suggestion history.
    History {
        /// The session id.
        session_id: String,
    },

    /// Apply the session retention policy.
    Prune,

    /// Engine statistics.
    Stats,

    /// Start the HTTP front-end API.
    Serve,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match config::load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli.command, &config).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn build_engine(config: &Config) -> Result<Arc<Engine>> {
    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteStore::new(pool));

    let provider: Arc<dyn provider::CompletionProvider> =
        Arc::from(provider::create_provider(&config.provider)?);
    let embedder: Arc<dyn embedding::Embedder> =
        Arc::from(embedding::create_embedder(&config.embedding)?);

    Ok(Arc::new(Engine::new(
        store.clone() as Arc<dyn ChunkStore>,
        store as Arc<dyn SessionStore>,
        provider,
        embedder,
        EngineSettings::from_config(config),
    )))
}

async fn run(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Init => {
            migrate::run_migrations(config).await?;
            println!("initialized {}", config.db.path.display());
            Ok(())
        }

        Commands::Index { path, project } => {
            let engine = build_engine(config).await?;
            let summary =
                indexer::index_project(&engine, config, &project, path.as_deref()).await?;
            println!("index {}", project);
            println!("  files seen: {}", summary.files_seen);
            println!("  files changed: {}", summary.files_changed);
            println!("  chunks created: {}", summary.chunks_created);
            println!("  chunks invalidated: {}", summary.chunks_invalidated);
            if summary.embed_failures > 0 {
                println!("  embeddings pending: {}", summary.embed_failures);
            }
            println!("ok");
            Ok(())
        }

        Commands::Embed { project, limit } => {
            if !config.embedding.is_enabled() {
                anyhow::bail!(
                    "Embedding provider is disabled. Set [embedding] provider in config."
                );
            }
            let engine = build_engine(config).await?;
            let (embedded, failed) = engine.embed_pending(project.as_deref(), limit).await?;
            println!("embed");
            println!("  embedded: {}", embedded);
            println!("  failed: {}", failed);
            println!("ok");
            Ok(())
        }

        Commands::Retrieve { query, project } => {
            let engine = build_engine(config).await?;
            let results = engine.retrieve_context(&project, &query).await?;
            if results.is_empty() {
                println!("No results.");
                return Ok(());
            }
            println!("results:");
            for (i, chunk) in results.iter().enumerate() {
                println!(
                    "  {}. {} (relevance {:.3})",
                    i + 1,
                    chunk.file_path,
                    chunk.relevance
                );
                let snippet: String = chunk.text.chars().take(160).collect();
                for line in snippet.lines() {
                    println!("     {}", line);
                }
            }
            Ok(())
        }

        Commands::Suggest {
            query,
            project,
            session,
            file,
            start_line,
            end_line,
        } => {
            let engine = build_engine(config).await?;
            let cursor = file.map(|file_path| CursorLocation {
                file_path,
                start_line,
                end_line,
                surrounding: None,
            });
            let suggestion = engine
                .submit_query(QueryRequest {
                    project_id: project,
                    session_id: session,
                    query_text: query,
                    cursor,
                })
                .await?;
            print_suggestion(&suggestion);
            Ok(())
        }

        Commands::Respond {
            suggestion_id,
            decision,
        } => {
            let decision = match decision.as_str() {
                "approve" => ApprovalDecision::Approve,
                "decline" => ApprovalDecision::Decline,
                other => anyhow::bail!("Unknown decision: '{}'. Use approve or decline.", other),
            };
            let engine = build_engine(config).await?;
            let suggestion = engine.respond_to_approval(&suggestion_id, decision).await?;
            print_suggestion(&suggestion);
            Ok(())
        }

        Commands::Sessions { project } => {
            let engine = build_engine(config).await?;
            let sessions = engine.list_sessions(project.as_deref()).await?;
            if sessions.is_empty() {
                println!("No sessions.");
                return Ok(());
            }
            println!("sessions:");
            for session in &sessions {
                let history = engine.session_history(&session.id).await?;
                println!(
                    "  {}  project: {}  suggestions: {}",
                    session.id,
                    session.project_id,
                    history.len()
                );
            }
            Ok(())
        }

        Commands::History { session_id } => {
            let engine = build_engine(config).await?;
            let history = engine.session_history(&session_id).await?;
            if history.is_empty() {
                println!("No suggestions.");
                return Ok(());
            }
            for suggestion in &history {
                println!(
                    "  {}  {}  confidence {:.3}{}",
                    suggestion.id,
                    suggestion.status.as_str(),
                    suggestion.confidence,
                    suggestion
                        .reason
                        .map(|r| format!("  ({})", r.as_str()))
                        .unwrap_or_default()
                );
            }
            Ok(())
        }

        Commands::Prune => {
            let engine = build_engine(config).await?;
            let outcome = engine.prune_sessions().await?;
            println!("prune");
            println!("  sessions removed: {}", outcome.sessions_removed);
            println!("  suggestions removed: {}", outcome.suggestions_removed);
            println!("ok");
            Ok(())
        }

        Commands::Stats => stats::run_stats(config).await,

        Commands::Serve => {
            let engine = build_engine(config).await?;
            server::run_server(engine, &config.server.bind).await
        }
    }
}

fn print_suggestion(suggestion: &Suggestion) {
    println!("suggestion");
    println!("  id:         {}", suggestion.id);
    println!("  status:     {}", suggestion.status.as_str());
    println!("  confidence: {:.3}", suggestion.confidence);
    if let Some(reason) = suggestion.reason {
        println!("  reason:     {}", reason.as_str());
    }
    if let Some(target) = &suggestion.target {
        println!(
            "  target:     {}:{}-{}",
            target.file_path, target.start_line, target.end_line
        );
    }
    if !suggestion.raw_text.is_empty() {
        println!("  text:");
        for line in suggestion.raw_text.lines() {
            println!("    {}", line);
        }
    }
    println!("ok");
}
