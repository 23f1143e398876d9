//! Core data models used throughout Interlink.
//!
//! [`Document`]s belong to the external content store and are read-only to
//! the engine. Everything else is derived by the indexing pipeline and
//! persisted through the [`Store`](crate::store::Store) trait.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Body of a published document.
///
/// The content store keeps either rendered markup or a nested block
/// structure (rich-text editors). Anything else is treated as empty.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Content {
    Html(String),
    Structured(serde_json::Value),
    #[default]
    Empty,
}

impl Content {
    /// Storage tag for the `documents.content_format` column.
    pub fn format(&self) -> &'static str {
        match self {
            Content::Html(_) => "html",
            Content::Structured(_) => "json",
            Content::Empty => "empty",
        }
    }

    /// Rebuild content from its storage tag and raw column value.
    ///
    /// A `json` payload that fails to parse degrades to [`Content::Empty`].
    pub fn from_stored(format: &str, raw: Option<String>) -> Self {
        match (format, raw) {
            ("html", Some(html)) => Content::Html(html),
            ("json", Some(json)) => serde_json::from_str(&json)
                .map(Content::Structured)
                .unwrap_or(Content::Empty),
            _ => Content::Empty,
        }
    }

    /// Raw column value matching [`format`](Content::format).
    pub fn to_stored(&self) -> Option<String> {
        match self {
            Content::Html(html) => Some(html.clone()),
            Content::Structured(value) => Some(value.to_string()),
            Content::Empty => None,
        }
    }
}

impl From<serde_json::Value> for Content {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(html) => Content::Html(html),
            serde_json::Value::Null => Content::Empty,
            other => Content::Structured(other),
        }
    }
}

impl From<Content> for serde_json::Value {
    fn from(content: Content) -> Self {
        match content {
            Content::Html(html) => serde_json::Value::String(html),
            Content::Structured(value) => value,
            Content::Empty => serde_json::Value::Null,
        }
    }
}

/// A document owned by the external content store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub meta_title: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub content: Content,
    #[serde(default = "default_published")]
    pub published: bool,
}

fn default_published() -> bool {
    true
}

/// Output of the content processor for one document.
///
/// Never persisted; recomputed from the stored document on every pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedContent {
    pub url: String,
    pub document_id: String,
    pub title: String,
    pub tokens: Vec<String>,
    pub word_count: usize,
    pub content_hash: String,
}

/// Lifecycle of an [`IndexedContent`] row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    Pending,
    Indexed,
    Error,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::Pending => "pending",
            IndexStatus::Indexed => "indexed",
            IndexStatus::Error => "error",
        }
    }
}

impl fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(IndexStatus::Pending),
            "indexed" => Ok(IndexStatus::Indexed),
            "error" => Ok(IndexStatus::Error),
            other => anyhow::bail!("unknown index status: '{}'", other),
        }
    }
}

/// Persistent index record for one registered document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexedContent {
    pub id: i64,
    pub document_id: String,
    pub url: String,
    pub url_hash: String,
    pub title: String,
    pub content_hash: String,
    pub word_count: i64,
    pub vector_norm: f64,
    pub status: IndexStatus,
    /// Unix timestamp of the last status flip out of `pending`.
    pub processed_at: Option<i64>,
}

/// Registration payload for [`Store::upsert_indexed_content`](crate::store::Store::upsert_indexed_content).
#[derive(Debug, Clone)]
pub struct NewIndexedContent {
    pub document_id: String,
    pub url: String,
    pub url_hash: String,
    pub title: String,
    pub content_hash: String,
    pub word_count: i64,
}

/// What an indexed-content upsert did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No row existed for the url hash.
    Inserted,
    /// Content hash changed; row updated and reset to `pending`.
    Changed,
    /// Content hash matched; row left as it was.
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct UpsertResult {
    pub content: IndexedContent,
    pub outcome: UpsertOutcome,
}

/// A vocabulary entry shared by all documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Term {
    pub id: i64,
    pub term: String,
    pub document_frequency: i64,
    pub idf_score: f64,
}

/// One component of a document's sparse TF-IDF vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TfIdfEntry {
    pub content_id: i64,
    pub term_id: i64,
    /// Normalized term frequency, kept so vectors can be rescored.
    pub tf: f64,
    pub score: f64,
}

/// Directed similarity score; stored in both directions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityEdge {
    pub content_id_a: i64,
    pub content_id_b: i64,
    pub score: f64,
}

/// Pipeline stage the index is currently in.
///
/// Each variant names the next stage that must run. Stages advance strictly
/// in declaration order, except that a new registration can send a `Ready`
/// or later index back to `Vectorizing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingPhase {
    Registering,
    Vectorizing,
    RecalculatingIdf,
    ComputingSimilarity,
    Ready,
}

impl IndexingPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexingPhase::Registering => "registering",
            IndexingPhase::Vectorizing => "vectorizing",
            IndexingPhase::RecalculatingIdf => "recalculating_idf",
            IndexingPhase::ComputingSimilarity => "computing_similarity",
            IndexingPhase::Ready => "ready",
        }
    }
}

impl fmt::Display for IndexingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexingPhase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registering" => Ok(IndexingPhase::Registering),
            "vectorizing" => Ok(IndexingPhase::Vectorizing),
            "recalculating_idf" => Ok(IndexingPhase::RecalculatingIdf),
            "computing_similarity" => Ok(IndexingPhase::ComputingSimilarity),
            "ready" => Ok(IndexingPhase::Ready),
            other => anyhow::bail!("unknown indexing phase: '{}'", other),
        }
    }
}

/// Corpus totals reported by [`SimilarityEngine::get_index_stats`](crate::engine::SimilarityEngine::get_index_stats).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub total_documents: i64,
    pub total_terms: i64,
    pub processed_documents: i64,
    pub pending_documents: i64,
    pub error_documents: i64,
    pub average_word_count: f64,
    pub phase: IndexingPhase,
}

/// A related document returned from a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarContent {
    pub content_id: i64,
    pub document_id: String,
    pub url: String,
    pub title: String,
    pub score: f64,
}
