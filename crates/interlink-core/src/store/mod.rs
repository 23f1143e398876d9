//! Storage abstraction for Interlink.
//!
//! The [`Store`] trait is everything the similarity engine needs from the
//! persistent datastore: read access to published documents plus the index
//! tables (indexed content, terms, TF-IDF entries, similarity edges) and a
//! small key/value slot for the pipeline phase.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    Document, IndexStatus, IndexedContent, IndexingPhase, NewIndexedContent, SimilarityEdge,
    Term, TfIdfEntry, UpsertResult,
};

/// Abstract storage backend for the indexing pipeline.
///
/// Every call is a blocking round trip from the engine's point of view: the
/// engine awaits each one before issuing the next, so implementations do not
/// need to guard against concurrent writers from a single engine.
///
/// # Operations
///
/// | Group | Methods |
/// |-------|---------|
/// | Documents | [`list_published_documents`](Store::list_published_documents), [`get_document`](Store::get_document) |
/// | Indexed content | [`upsert_indexed_content`](Store::upsert_indexed_content), [`update_indexed_content_status`](Store::update_indexed_content_status), [`set_vector_norm`](Store::set_vector_norm), lookups and counts |
/// | Terms | [`find_or_create_term`](Store::find_or_create_term), [`update_term`](Store::update_term), [`count_document_frequency_for_term`](Store::count_document_frequency_for_term) |
/// | Vectors | [`upsert_tfidf_entries`](Store::upsert_tfidf_entries), [`get_tfidf_vector`](Store::get_tfidf_vector), [`delete_tfidf_vector`](Store::delete_tfidf_vector) |
/// | Edges | [`upsert_similarity_edges`](Store::upsert_similarity_edges), [`get_top_similar_edges`](Store::get_top_similar_edges), [`delete_similarity_edges`](Store::delete_similarity_edges) |
/// | Pipeline | [`get_phase`](Store::get_phase), [`set_phase`](Store::set_phase), [`delete_all_index_data`](Store::delete_all_index_data) |
#[async_trait]
pub trait Store: Send + Sync {
    /// All documents eligible for indexing.
    async fn list_published_documents(&self) -> Result<Vec<Document>>;

    /// A single document by id, published or not.
    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// Insert or update an indexed-content row keyed by `url_hash`.
    ///
    /// New rows start `pending`. An existing row is only touched when its
    /// content hash differs, in which case it is reset to `pending`.
    async fn upsert_indexed_content(&self, content: &NewIndexedContent) -> Result<UpsertResult>;

    async fn update_indexed_content_status(
        &self,
        id: i64,
        status: IndexStatus,
        processed_at: i64,
    ) -> Result<()>;

    async fn set_vector_norm(&self, id: i64, norm: f64) -> Result<()>;

    async fn get_indexed_content(&self, id: i64) -> Result<Option<IndexedContent>>;

    /// Newest row registered for `document_id`.
    async fn get_indexed_content_by_document_id(
        &self,
        document_id: &str,
    ) -> Result<Option<IndexedContent>>;

    /// Delete every row of `document_id` except the one at `keep_url_hash`,
    /// along with their vectors and edges. Returns the number of rows removed.
    async fn delete_superseded_content(
        &self,
        document_id: &str,
        keep_url_hash: &str,
    ) -> Result<u64>;

    /// Rows in `status`, oldest id first. `None` returns all of them.
    async fn list_indexed_content_by_status(
        &self,
        status: IndexStatus,
        limit: Option<usize>,
    ) -> Result<Vec<IndexedContent>>;

    async fn count_indexed_content_by_status(&self, status: IndexStatus) -> Result<i64>;

    async fn count_indexed_content(&self) -> Result<i64>;

    /// Mean `word_count` over rows in `status`; `0.0` when there are none.
    async fn average_word_count(&self, status: IndexStatus) -> Result<f64>;

    /// Fetch a vocabulary entry, creating it with zero frequency if absent.
    async fn find_or_create_term(&self, term: &str) -> Result<Term>;

    async fn update_term(&self, id: i64, document_frequency: i64, idf_score: f64) -> Result<()>;

    async fn list_terms(&self) -> Result<Vec<Term>>;

    async fn count_terms(&self) -> Result<i64>;

    /// Number of `indexed` documents whose vector contains the term.
    async fn count_document_frequency_for_term(&self, term_id: i64) -> Result<i64>;

    /// Insert or replace vector components, keyed by `(content_id, term_id)`.
    async fn upsert_tfidf_entries(&self, entries: &[TfIdfEntry]) -> Result<()>;

    async fn get_tfidf_vector(&self, content_id: i64) -> Result<Vec<TfIdfEntry>>;

    async fn delete_tfidf_vector(&self, content_id: i64) -> Result<()>;

    /// Insert or replace edges, keyed by `(content_id_a, content_id_b)`.
    ///
    /// Callers pass both directions of a symmetric pair.
    async fn upsert_similarity_edges(&self, edges: &[SimilarityEdge]) -> Result<()>;

    /// Outgoing edges of `content_id` with `score >= min_score`, best first.
    async fn get_top_similar_edges(
        &self,
        content_id: i64,
        limit: usize,
        min_score: f64,
    ) -> Result<Vec<SimilarityEdge>>;

    async fn delete_similarity_edges(&self) -> Result<()>;

    async fn get_phase(&self) -> Result<IndexingPhase>;

    async fn set_phase(&self, phase: IndexingPhase) -> Result<()>;

    /// Delete edges, vectors, indexed content, and terms (in that order) and
    /// reset the phase to [`IndexingPhase::Registering`].
    async fn delete_all_index_data(&self) -> Result<()>;
}
