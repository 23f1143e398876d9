use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index on an open pool. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Source documents, as imported from the content store
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            slug TEXT NOT NULL,
            title TEXT NOT NULL,
            meta_title TEXT,
            meta_description TEXT,
            content_format TEXT NOT NULL DEFAULT 'empty'
                CHECK (content_format IN ('html', 'json', 'empty')),
            content TEXT,
            published INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS indexed_content (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id TEXT NOT NULL,
            url TEXT NOT NULL,
            url_hash TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            word_count INTEGER NOT NULL DEFAULT 0,
            vector_norm REAL NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'indexed', 'error')),
            processed_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS terms (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            term TEXT NOT NULL UNIQUE,
            document_frequency INTEGER NOT NULL DEFAULT 0,
            idf_score REAL NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tfidf_entries (
            content_id INTEGER NOT NULL,
            term_id INTEGER NOT NULL,
            tf REAL NOT NULL,
            score REAL NOT NULL,
            PRIMARY KEY (content_id, term_id),
            FOREIGN KEY (content_id) REFERENCES indexed_content(id),
            FOREIGN KEY (term_id) REFERENCES terms(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS similarity_edges (
            content_id_a INTEGER NOT NULL,
            content_id_b INTEGER NOT NULL,
            score REAL NOT NULL,
            PRIMARY KEY (content_id_a, content_id_b),
            FOREIGN KEY (content_id_a) REFERENCES indexed_content(id),
            FOREIGN KEY (content_id_b) REFERENCES indexed_content(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Pipeline bookkeeping (currently just the phase)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_indexed_content_status ON indexed_content(status, id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_indexed_content_document ON indexed_content(document_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tfidf_term ON tfidf_entries(term_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_edges_score ON similarity_edges(content_id_a, score DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
