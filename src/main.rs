//! # code-context CLI (`cctx`)
//!
//! Indexes source projects and serves token-budgeted code context, either
//! one command at a time or as a long-running HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! cctx --config ./config/cctx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cctx init` | Create the SQLite database and run schema migrations |
//! | `cctx index <path>` | Index (or incrementally reindex) a project |
//! | `cctx query "<text>"` | Print assembled context for a query |
//! | `cctx projects` | List indexed projects |
//! | `cctx stats` | Show statistics for a project |
//! | `cctx clear` | Remove one project's index, or all of them |
//! | `cctx serve` | Start the HTTP server with file watching |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use code_context::app::Services;
use code_context::project::ProjectRegistry;
use code_context::{config, db, migrate, server};

/// code-context: local retrieval layer serving token-budgeted code context.
#[derive(Parser)]
#[command(
    name = "cctx",
    about = "Index source projects and serve token-budgeted code context",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/cctx.toml`. A missing file is an error; an
    /// empty file uses every default.
    #[arg(long, global = true, default_value = "./config/cctx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Index a project directory.
    ///
    /// Only files whose content changed since the last run are re-chunked
    /// unless `--force` is given.
    Index {
        /// Project root. Windows paths are mapped to their WSL mount.
        path: String,

        /// File extensions to index (repeatable). Defaults to
        /// `[indexing].extensions`.
        #[arg(long = "ext")]
        extensions: Vec<String>,

        /// Reprocess every file regardless of fingerprints.
        #[arg(long)]
        force: bool,
    },

    /// Print the assembled context for a query.
    Query {
        /// Natural-language or code query.
        text: String,

        /// Project to query. Defaults to the first indexed project.
        #[arg(long)]
        project: Option<String>,

        /// Number of chunks to retrieve (1-20).
        #[arg(long, default_value_t = 5)]
        max_results: usize,
    },

    /// List indexed projects.
    Projects,

    /// Show statistics for a project.
    Stats {
        #[arg(long)]
        project: Option<String>,
    },

    /// Remove a project's chunks, cache entries, and state. Without
    /// `--project`, removes every project.
    Clear {
        #[arg(long)]
        project: Option<String>,
    },

    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind`, restores indexed projects, and watches
    /// them for changes.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn open_registry(cfg: &config::Config) -> anyhow::Result<ProjectRegistry> {
    let registry = ProjectRegistry::new(Services::from_config(cfg).await?);
    registry.load_existing().await?;
    Ok(registry)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Index {
            path,
            extensions,
            force,
        } => {
            let registry = ProjectRegistry::new(Services::from_config(&cfg).await?);
            let project = registry.open_project(&path).await?;
            let extensions = if extensions.is_empty() {
                cfg.indexing.extensions.clone()
            } else {
                extensions
            };
            let summary = project.index(&extensions, force).await?;
            println!("project: {}", project.root().display());
            println!("indexed files: {}", summary.indexed_count);
            println!("chunks: {}", summary.chunk_count);
            println!("skipped files: {}", summary.skipped_count);
            println!("failed files: {}", summary.failed_count);
            println!("total chunks: {}", project.indexer().total_chunk_count());
            println!("ok");
        }
        Commands::Query {
            text,
            project,
            max_results,
        } => {
            if !(1..=20).contains(&max_results) {
                anyhow::bail!("--max-results must be between 1 and 20");
            }
            let registry = open_registry(&cfg).await?;
            let project = registry.resolve(project.as_deref())?;
            let outcome = project.query(&text, max_results).await;
            println!("{}", outcome.context);
        }
        Commands::Projects => {
            let registry = open_registry(&cfg).await?;
            let projects = registry.projects();
            if projects.is_empty() {
                println!("No projects indexed.");
            }
            for p in projects {
                println!(
                    "{}  files={} chunks={}",
                    p.root().display(),
                    p.indexer().indexed_file_count(),
                    p.indexer().total_chunk_count()
                );
            }
        }
        Commands::Stats { project } => {
            let registry = open_registry(&cfg).await?;
            let stats = registry.stats(project.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Clear { project } => {
            let registry = open_registry(&cfg).await?;
            match project {
                Some(raw) => {
                    let root = registry.remove(&raw).await?;
                    println!("Project cleared: {}", root.display());
                }
                None => {
                    let n = registry.clear_all().await?;
                    println!("Cleared {n} projects.");
                }
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
