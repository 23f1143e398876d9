//! Document import from a JSON export of the content store.
//!
//! The file is a JSON array of documents:
//!
//! ```json
//! [
//!   {
//!     "id": "post-1",
//!     "slug": "getting-started",
//!     "title": "Getting started",
//!     "meta_title": null,
//!     "meta_description": "A short intro",
//!     "content": "<p>Rendered HTML</p>",
//!     "published": true
//!   }
//! ]
//! ```
//!
//! `content` may be an HTML string, a nested block structure, or `null`.
//! `published` defaults to `true`. Existing documents with the same id are
//! replaced.

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use interlink_core::models::Document;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ImportSummary {
    pub imported: usize,
    pub published: usize,
}

/// Parse and validate an export file's contents.
pub fn parse_documents(json: &str) -> Result<Vec<Document>> {
    let documents: Vec<Document> =
        serde_json::from_str(json).context("Failed to parse documents JSON")?;

    let mut seen = HashSet::new();
    for (i, doc) in documents.iter().enumerate() {
        if doc.id.trim().is_empty() {
            bail!("document #{} has an empty id", i);
        }
        if doc.slug.trim().is_empty() {
            bail!("document '{}' has an empty slug", doc.id);
        }
        if !seen.insert(doc.id.as_str()) {
            bail!("duplicate document id '{}'", doc.id);
        }
    }
    Ok(documents)
}

pub async fn import_documents(store: &SqliteStore, documents: &[Document]) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    for doc in documents {
        store
            .upsert_document(doc)
            .await
            .with_context(|| format!("Failed to import document '{}'", doc.id))?;
        summary.imported += 1;
        if doc.published {
            summary.published += 1;
        }
    }
    Ok(summary)
}

pub async fn run_import(config: &Config, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read documents file: {}", path.display()))?;
    let documents = parse_documents(&content)?;

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let summary = import_documents(&store, &documents).await?;
    info!(file = %path.display(), imported = summary.imported, "import finished");

    println!(
        "Imported {} documents ({} published).",
        summary.imported, summary.published
    );
    store.pool().close().await;
    Ok(())
}
