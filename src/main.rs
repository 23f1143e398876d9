//! # Interlink CLI (`interlink`)
//!
//! ## Usage
//!
//! ```bash
//! interlink --config ./config/interlink.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `interlink init` | Create the SQLite database and run schema migrations |
//! | `interlink import <file>` | Load documents from a JSON export |
//! | `interlink index start` | Register published documents as pending |
//! | `interlink index batch` | Vectorize the next batch of pending documents |
//! | `interlink index idf` | Recalculate IDF and rescore all vectors |
//! | `interlink index similarities` | Recompute all similarity edges |
//! | `interlink index run` | Run every stage in order |
//! | `interlink index clear` | Delete all index data |
//! | `interlink similar <id>` | Suggest related documents |
//! | `interlink stats` | Show index statistics |
//! | `interlink terms <id>` | Show a document's top terms |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use interlink::{config, import, index_cmd, logging, migrate, similar, stats};

/// Interlink: internal-link recommendations from TF-IDF similarity.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/interlink.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "interlink",
    about = "Interlink: internal-link recommendations from TF-IDF cosine similarity",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/interlink.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Import documents from a JSON array.
    ///
    /// Documents with an existing id are replaced.
    Import {
        /// Path to the JSON file.
        file: PathBuf,
    },

    /// Run indexing pipeline stages.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// List documents similar to the given one, best first.
    Similar {
        /// Document id.
        document_id: String,

        /// Maximum number of suggestions (default from `[similarity]`).
        #[arg(long)]
        limit: Option<usize>,

        /// Minimum cosine score, 0.0 to 1.0 (default from `[similarity]`).
        #[arg(long)]
        min_similarity: Option<f64>,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show index statistics.
    Stats {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show the highest-frequency terms of a document.
    Terms {
        /// Document id.
        document_id: String,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Register every published document; new or changed ones become pending.
    Start,

    /// Vectorize one batch of pending documents.
    Batch {
        /// Override `[indexing].batch_size`.
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Recalculate IDF over all indexed documents and rescore vectors.
    Idf,

    /// Recompute similarity edges between all indexed documents.
    Similarities,

    /// Run start, batches, IDF, and similarities in order. Ctrl-C stops cleanly.
    Run,

    /// Delete every index record and reset the pipeline.
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { file } => {
            import::run_import(&cfg, &file).await?;
        }
        Commands::Index { action } => match action {
            IndexAction::Start => index_cmd::run_start(&cfg).await?,
            IndexAction::Batch { batch_size } => index_cmd::run_batch(&cfg, batch_size).await?,
            IndexAction::Idf => index_cmd::run_idf(&cfg).await?,
            IndexAction::Similarities => index_cmd::run_similarities(&cfg).await?,
            IndexAction::Run => index_cmd::run_pipeline(&cfg).await?,
            IndexAction::Clear => index_cmd::run_clear(&cfg).await?,
        },
        Commands::Similar {
            document_id,
            limit,
            min_similarity,
            json,
        } => {
            similar::run_similar(&cfg, &document_id, limit, min_similarity, json).await?;
        }
        Commands::Stats { json } => {
            stats::run_stats(&cfg, json).await?;
        }
        Commands::Terms { document_id, limit } => {
            stats::run_terms(&cfg, &document_id, limit).await?;
        }
    }

    Ok(())
}
