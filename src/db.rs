use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use interlink_core::engine::SimilarityEngine;
use interlink_core::processor::ContentProcessor;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

    Ok(pool)
}

/// Open the database and wrap it in a similarity engine configured from
/// `config`.
pub async fn open_engine(config: &Config) -> Result<SimilarityEngine<SqliteStore>> {
    let pool = connect(config).await?;
    let processor = ContentProcessor::new(&config.processor.url_prefix);
    Ok(SimilarityEngine::new(
        SqliteStore::new(pool),
        processor,
        config.engine_config(),
    ))
}
