//! Similarity engine: the TF-IDF indexing pipeline and similarity queries.
//!
//! The engine operates entirely through the [`Store`] trait and holds no
//! state of its own beyond a [`ContentProcessor`], its [`EngineConfig`],
//! and a [`CancellationToken`].
//!
//! # Pipeline
//!
//! ```text
//! Registering ──start_indexing──▶ Vectorizing ──process_batch (until empty)──▶
//! RecalculatingIdf ──recalculate_idf──▶ ComputingSimilarity
//!                  ──calculate_all_similarities──▶ Ready
//! ```
//!
//! The phase is persisted in the store, so the stages can be driven by
//! separate processes (e.g. one cron invocation per batch). Calling a stage
//! out of order returns a [`PhaseError`].
//!
//! Documents are indexed one at a time: each document's term updates depend
//! on the document frequencies left by the previous one. IDF values written
//! while vectorizing are provisional (`ln((indexed + 1) / df)` at the time
//! the document was processed); [`recalculate_idf`](SimilarityEngine::recalculate_idf)
//! replaces them with corpus-wide values and rescores every stored vector.
//!
//! # Similarity
//!
//! Instead of comparing all `n²` pairs, the similarity pass loads every
//! vector once, builds an [`InvertedIndex`], and only scores documents that
//! share at least one term.

use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::models::{
    Document, IndexStats, IndexStatus, IndexedContent, IndexingPhase, NewIndexedContent,
    SimilarContent, SimilarityEdge, TfIdfEntry, UpsertOutcome,
};
use crate::processor::{get_top_terms, ordered_term_frequencies, url_hash, ContentProcessor};
use crate::store::Store;
use crate::vector::{cosine_from_dot, Component, InvertedIndex};

/// Engine tuning, decoupled from application config.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Pending documents vectorized per [`process_batch`](SimilarityEngine::process_batch) call.
    pub batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { batch_size: 50 }
    }
}

/// A pipeline stage was invoked before its prerequisites ran.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PhaseError {
    #[error("cannot {operation} while the index is {phase}: {hint}")]
    OutOfOrder {
        operation: &'static str,
        phase: IndexingPhase,
        hint: &'static str,
    },
    #[error("cannot recalculate IDF while {pending} documents are still pending")]
    PendingDocuments { pending: i64 },
}

/// Outcome of [`start_indexing`](SimilarityEngine::start_indexing).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegistrationSummary {
    /// Published documents seen.
    pub total: usize,
    /// New or changed documents queued as `pending`.
    pub registered: usize,
    /// Documents whose content hash was unchanged.
    pub unchanged: usize,
    /// Rows dropped because their document moved to a new url.
    pub superseded: usize,
    pub errors: usize,
    pub cancelled: bool,
}

/// Outcome of [`process_batch`](SimilarityEngine::process_batch).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResult {
    /// Rows taken off the pending queue (indexed or errored).
    pub processed_count: usize,
    pub error_count: usize,
    pub remaining_pending_count: i64,
    pub cancelled: bool,
}

/// Outcome of [`recalculate_idf`](SimilarityEngine::recalculate_idf).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IdfSummary {
    pub total_documents: i64,
    pub terms_updated: usize,
    pub documents_rescored: usize,
    pub cancelled: bool,
}

/// Outcome of [`calculate_all_similarities`](SimilarityEngine::calculate_all_similarities).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimilaritySummary {
    pub documents: usize,
    /// Documents left out because their vector norm is zero.
    pub zero_norm_documents: usize,
    /// Pairs sharing at least one term.
    pub candidate_pairs: usize,
    /// Stored edge rows, both directions counted.
    pub edges_written: usize,
    pub cancelled: bool,
}

/// Outcome of [`run_pipeline`](SimilarityEngine::run_pipeline).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineSummary {
    pub registration: RegistrationSummary,
    pub batches: usize,
    pub processed: usize,
    pub errors: usize,
    pub idf: Option<IdfSummary>,
    pub similarity: Option<SimilaritySummary>,
    pub cancelled: bool,
}

/// `ln(total / df)`, floored at zero. Degenerate inputs yield `0.0`.
///
/// The floor only matters for provisional values, where repeated
/// re-registration can push a term's running document frequency past the
/// indexed-document count.
pub fn inverse_document_frequency(total_documents: i64, document_frequency: i64) -> f64 {
    if total_documents <= 0 || document_frequency <= 0 {
        return 0.0;
    }
    (total_documents as f64 / document_frequency as f64)
        .ln()
        .max(0.0)
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// TF-IDF indexer and similarity service over a [`Store`].
pub struct SimilarityEngine<S> {
    store: S,
    processor: ContentProcessor,
    config: EngineConfig,
    cancel: CancellationToken,
}

impl<S: Store> SimilarityEngine<S> {
    pub fn new(store: S, processor: ContentProcessor, config: EngineConfig) -> Self {
        Self {
            store,
            processor,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn processor(&self) -> &ContentProcessor {
        &self.processor
    }

    /// A handle that cancels this engine's running and future jobs.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn phase(&self) -> Result<IndexingPhase> {
        self.store.get_phase().await
    }

    /// Register every published document as `pending` (or leave it alone
    /// when its content hash is unchanged).
    ///
    /// Per-document failures are logged and counted; only failing to list
    /// the documents aborts the call.
    pub async fn start_indexing(&self) -> Result<RegistrationSummary> {
        let previous = self.store.get_phase().await?;
        let documents = self
            .store
            .list_published_documents()
            .await
            .context("failed to list published documents")?;

        let mut summary = RegistrationSummary {
            total: documents.len(),
            ..Default::default()
        };

        for document in &documents {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            match self.register_document(document).await {
                Ok((outcome, superseded)) => {
                    match outcome {
                        UpsertOutcome::Inserted | UpsertOutcome::Changed => {
                            summary.registered += 1
                        }
                        UpsertOutcome::Unchanged => summary.unchanged += 1,
                    }
                    summary.superseded += superseded as usize;
                }
                Err(e) => {
                    warn!(document_id = %document.id, error = %e, "failed to register document");
                    summary.errors += 1;
                }
            }
        }

        let pending = self
            .store
            .count_indexed_content_by_status(IndexStatus::Pending)
            .await?;
        let next = if pending > 0 {
            IndexingPhase::Vectorizing
        } else if previous == IndexingPhase::Registering {
            IndexingPhase::RecalculatingIdf
        } else {
            previous
        };
        self.store.set_phase(next).await?;

        info!(
            total = summary.total,
            registered = summary.registered,
            unchanged = summary.unchanged,
            superseded = summary.superseded,
            errors = summary.errors,
            phase = %next,
            "registration finished"
        );
        Ok(summary)
    }

    /// Upsert the document's row at its current url and drop rows left at
    /// earlier urls.
    async fn register_document(&self, document: &Document) -> Result<(UpsertOutcome, u64)> {
        let processed = self.processor.process_page_content(document);
        let new = NewIndexedContent {
            document_id: processed.document_id,
            url_hash: url_hash(&processed.url),
            url: processed.url,
            title: processed.title,
            content_hash: processed.content_hash,
            word_count: processed.word_count as i64,
        };
        let result = self.store.upsert_indexed_content(&new).await?;
        let superseded = self
            .store
            .delete_superseded_content(&new.document_id, &new.url_hash)
            .await?;
        if superseded > 0 {
            debug!(document_id = %new.document_id, url = %new.url, superseded, "document moved");
        }
        Ok((result.outcome, superseded))
    }

    /// Vectorize up to `batch_size` pending documents (the configured size
    /// when `None`), one at a time.
    ///
    /// A failing document is marked `error` and the batch moves on. Call
    /// repeatedly until `remaining_pending_count` is zero.
    pub async fn process_batch(&self, batch_size: Option<usize>) -> Result<BatchResult> {
        let phase = self.store.get_phase().await?;
        if phase == IndexingPhase::Registering {
            return Err(PhaseError::OutOfOrder {
                operation: "process a batch",
                phase,
                hint: "register documents with start_indexing first",
            }
            .into());
        }

        let limit = batch_size.unwrap_or(self.config.batch_size).max(1);
        let batch = self
            .store
            .list_indexed_content_by_status(IndexStatus::Pending, Some(limit))
            .await?;

        let mut result = BatchResult::default();
        for row in &batch {
            if self.cancel.is_cancelled() {
                result.cancelled = true;
                break;
            }
            if let Err(e) = self.index_document(row).await {
                warn!(
                    document_id = %row.document_id,
                    content_id = row.id,
                    error = %e,
                    "failed to index document"
                );
                if let Err(cleanup) = self.store.delete_tfidf_vector(row.id).await {
                    warn!(content_id = row.id, error = %cleanup, "failed to remove partial vector");
                }
                self.store
                    .update_indexed_content_status(row.id, IndexStatus::Error, now_ts())
                    .await?;
                result.error_count += 1;
            }
            result.processed_count += 1;
        }

        result.remaining_pending_count = self
            .store
            .count_indexed_content_by_status(IndexStatus::Pending)
            .await?;

        if result.remaining_pending_count > 0 {
            self.store.set_phase(IndexingPhase::Vectorizing).await?;
        } else if !batch.is_empty() || phase == IndexingPhase::Vectorizing {
            self.store.set_phase(IndexingPhase::RecalculatingIdf).await?;
        }

        info!(
            processed = result.processed_count,
            errors = result.error_count,
            remaining = result.remaining_pending_count,
            "batch finished"
        );
        Ok(result)
    }

    async fn index_document(&self, row: &IndexedContent) -> Result<()> {
        let document = self
            .store
            .get_document(&row.document_id)
            .await?
            .ok_or_else(|| anyhow!("source document {} no longer exists", row.document_id))?;
        let processed = self.processor.process_page_content(&document);

        self.compute_tfidf(row.id, &processed.tokens).await?;
        self.store
            .update_indexed_content_status(row.id, IndexStatus::Indexed, now_ts())
            .await?;
        debug!(content_id = row.id, words = processed.word_count, "indexed document");
        Ok(())
    }

    /// Build and persist one document's vector with provisional IDF values,
    /// updating each term's running document frequency on the way.
    async fn compute_tfidf(&self, content_id: i64, tokens: &[String]) -> Result<()> {
        self.store.delete_tfidf_vector(content_id).await?;

        let frequencies = ordered_term_frequencies(tokens);
        let total_documents = self
            .store
            .count_indexed_content_by_status(IndexStatus::Indexed)
            .await?
            + 1;

        let mut entries = Vec::with_capacity(frequencies.len());
        let mut sum_of_squares = 0.0;
        for (term, tf) in frequencies {
            let record = self.store.find_or_create_term(&term).await?;
            let document_frequency = record.document_frequency + 1;
            let idf = inverse_document_frequency(total_documents, document_frequency);
            let score = tf * idf;
            sum_of_squares += score * score;
            entries.push(TfIdfEntry {
                content_id,
                term_id: record.id,
                tf,
                score,
            });
            self.store
                .update_term(record.id, document_frequency, idf)
                .await?;
        }

        self.store.upsert_tfidf_entries(&entries).await?;
        self.store
            .set_vector_norm(content_id, sum_of_squares.sqrt())
            .await?;
        Ok(())
    }

    /// Recompute every term's document frequency and IDF from the indexed
    /// set, then rescore all stored vectors and their norms.
    ///
    /// Refuses to run while documents are pending.
    pub async fn recalculate_idf(&self) -> Result<IdfSummary> {
        let phase = self.store.get_phase().await?;
        if phase == IndexingPhase::Registering {
            return Err(PhaseError::OutOfOrder {
                operation: "recalculate IDF",
                phase,
                hint: "register and vectorize documents first",
            }
            .into());
        }
        let pending = self
            .store
            .count_indexed_content_by_status(IndexStatus::Pending)
            .await?;
        if pending > 0 {
            return Err(PhaseError::PendingDocuments { pending }.into());
        }

        self.store.set_phase(IndexingPhase::RecalculatingIdf).await?;

        let total_documents = self
            .store
            .count_indexed_content_by_status(IndexStatus::Indexed)
            .await?;
        let mut summary = IdfSummary {
            total_documents,
            ..Default::default()
        };

        let mut idf_by_term: HashMap<i64, f64> = HashMap::new();
        for term in self.store.list_terms().await? {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                return Ok(summary);
            }
            let document_frequency = self.store.count_document_frequency_for_term(term.id).await?;
            let idf = inverse_document_frequency(total_documents, document_frequency);
            self.store
                .update_term(term.id, document_frequency, idf)
                .await?;
            idf_by_term.insert(term.id, idf);
            summary.terms_updated += 1;
        }

        let contents = self
            .store
            .list_indexed_content_by_status(IndexStatus::Indexed, None)
            .await?;
        for content in &contents {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                return Ok(summary);
            }
            let rescored: Vec<TfIdfEntry> = self
                .store
                .get_tfidf_vector(content.id)
                .await?
                .into_iter()
                .map(|entry| TfIdfEntry {
                    score: entry.tf * idf_by_term.get(&entry.term_id).copied().unwrap_or(0.0),
                    ..entry
                })
                .collect();
            let norm = rescored
                .iter()
                .map(|e| e.score * e.score)
                .sum::<f64>()
                .sqrt();
            self.store.upsert_tfidf_entries(&rescored).await?;
            self.store.set_vector_norm(content.id, norm).await?;
            summary.documents_rescored += 1;
        }

        self.store
            .set_phase(IndexingPhase::ComputingSimilarity)
            .await?;
        info!(
            documents = summary.total_documents,
            terms = summary.terms_updated,
            "IDF recalculated"
        );
        Ok(summary)
    }

    /// Replace all similarity edges with freshly computed cosine scores
    /// between indexed documents.
    ///
    /// Zero-norm documents and pairs with no shared term are skipped; only
    /// scores `> 0` are stored, in both directions.
    pub async fn calculate_all_similarities(&self) -> Result<SimilaritySummary> {
        let phase = self.store.get_phase().await?;
        match phase {
            IndexingPhase::ComputingSimilarity | IndexingPhase::Ready => {}
            IndexingPhase::RecalculatingIdf => {
                return Err(PhaseError::OutOfOrder {
                    operation: "compute similarities",
                    phase,
                    hint: "run recalculate_idf first",
                }
                .into())
            }
            IndexingPhase::Registering | IndexingPhase::Vectorizing => {
                return Err(PhaseError::OutOfOrder {
                    operation: "compute similarities",
                    phase,
                    hint: "finish vectorizing pending documents and recalculate IDF first",
                }
                .into())
            }
        }
        self.store
            .set_phase(IndexingPhase::ComputingSimilarity)
            .await?;

        let contents = self
            .store
            .list_indexed_content_by_status(IndexStatus::Indexed, None)
            .await?;
        let mut summary = SimilaritySummary {
            documents: contents.len(),
            ..Default::default()
        };

        let mut active: Vec<&IndexedContent> = Vec::with_capacity(contents.len());
        let mut vectors: Vec<Vec<Component>> = Vec::with_capacity(contents.len());
        for content in &contents {
            if content.vector_norm <= 0.0 {
                summary.zero_norm_documents += 1;
                continue;
            }
            let vector = self
                .store
                .get_tfidf_vector(content.id)
                .await?
                .into_iter()
                .map(|e| (e.term_id, e.score))
                .collect();
            active.push(content);
            vectors.push(vector);
        }
        let index = InvertedIndex::build(&vectors);
        debug!(
            documents = active.len(),
            terms = index.term_count(),
            "built inverted index"
        );

        self.store.delete_similarity_edges().await?;

        for (i, a) in active.iter().enumerate() {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let mut edges = Vec::new();
            for (j, dot) in index.dot_products_after(i, &vectors[i]) {
                summary.candidate_pairs += 1;
                let b = active[j];
                let score = cosine_from_dot(dot, a.vector_norm, b.vector_norm);
                if score > 0.0 {
                    edges.push(SimilarityEdge {
                        content_id_a: a.id,
                        content_id_b: b.id,
                        score,
                    });
                    edges.push(SimilarityEdge {
                        content_id_a: b.id,
                        content_id_b: a.id,
                        score,
                    });
                }
            }
            if !edges.is_empty() {
                self.store.upsert_similarity_edges(&edges).await?;
                summary.edges_written += edges.len();
            }
        }

        if !summary.cancelled {
            self.store.set_phase(IndexingPhase::Ready).await?;
        }
        info!(
            documents = summary.documents,
            candidate_pairs = summary.candidate_pairs,
            edges = summary.edges_written,
            cancelled = summary.cancelled,
            "similarities computed"
        );
        Ok(summary)
    }

    /// Most similar documents to `document_id`, best first.
    ///
    /// Returns an empty list when the document is unknown or not `indexed`.
    /// The document itself is never suggested, and each other document
    /// appears at most once.
    pub async fn get_similar_content(
        &self,
        document_id: &str,
        limit: usize,
        min_similarity: f64,
    ) -> Result<Vec<SimilarContent>> {
        let content = match self
            .store
            .get_indexed_content_by_document_id(document_id)
            .await?
        {
            Some(c) if c.status == IndexStatus::Indexed => c,
            _ => return Ok(Vec::new()),
        };
        if limit == 0 {
            return Ok(Vec::new());
        }

        let edges = self
            .store
            .get_top_similar_edges(content.id, usize::MAX, min_similarity)
            .await?;

        let mut seen = HashSet::new();
        let mut results = Vec::with_capacity(limit.min(edges.len()));
        for edge in edges {
            if results.len() == limit {
                break;
            }
            let Some(target) = self.store.get_indexed_content(edge.content_id_b).await? else {
                continue;
            };
            if target.document_id == content.document_id
                || !seen.insert(target.document_id.clone())
            {
                continue;
            }
            results.push(SimilarContent {
                content_id: target.id,
                document_id: target.document_id,
                url: target.url,
                title: target.title,
                score: edge.score,
            });
        }
        Ok(results)
    }

    pub async fn get_index_stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            total_documents: self.store.count_indexed_content().await?,
            total_terms: self.store.count_terms().await?,
            processed_documents: self
                .store
                .count_indexed_content_by_status(IndexStatus::Indexed)
                .await?,
            pending_documents: self
                .store
                .count_indexed_content_by_status(IndexStatus::Pending)
                .await?,
            error_documents: self
                .store
                .count_indexed_content_by_status(IndexStatus::Error)
                .await?,
            average_word_count: self.store.average_word_count(IndexStatus::Indexed).await?,
            phase: self.store.get_phase().await?,
        })
    }

    /// Top terms of a stored document, recomputed from its current content.
    pub async fn get_top_terms_for_document(
        &self,
        document_id: &str,
        limit: usize,
    ) -> Result<Option<Vec<(String, f64)>>> {
        Ok(self
            .store
            .get_document(document_id)
            .await?
            .map(|doc| get_top_terms(&self.processor.process_page_content(&doc).tokens, limit)))
    }

    /// Drop every index record so the next run starts from scratch.
    pub async fn clear_index(&self) -> Result<()> {
        self.store.delete_all_index_data().await?;
        info!("index cleared");
        Ok(())
    }

    /// Run every stage in order: register, vectorize until the queue is
    /// empty, recalculate IDF, compute similarities.
    ///
    /// Stops early (with `cancelled = true`) when the token fires.
    pub async fn run_pipeline(&self) -> Result<PipelineSummary> {
        let mut summary = PipelineSummary {
            registration: self.start_indexing().await?,
            ..Default::default()
        };
        if summary.registration.cancelled {
            summary.cancelled = true;
            return Ok(summary);
        }

        loop {
            let batch = self.process_batch(None).await?;
            summary.batches += 1;
            summary.processed += batch.processed_count;
            summary.errors += batch.error_count;
            if batch.cancelled {
                summary.cancelled = true;
                return Ok(summary);
            }
            if batch.remaining_pending_count == 0 || batch.processed_count == 0 {
                break;
            }
        }

        let idf = self.recalculate_idf().await?;
        let idf_cancelled = idf.cancelled;
        summary.idf = Some(idf);
        if idf_cancelled {
            summary.cancelled = true;
            return Ok(summary);
        }

        let similarity = self.calculate_all_similarities().await?;
        summary.cancelled = similarity.cancelled;
        summary.similarity = Some(similarity);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idf_matches_log_ratio() {
        assert!((inverse_document_frequency(4, 1) - 4f64.ln()).abs() < 1e-12);
        assert!((inverse_document_frequency(10, 5) - 2f64.ln()).abs() < 1e-12);
        assert_eq!(inverse_document_frequency(3, 3), 0.0);
    }

    #[test]
    fn idf_degenerate_inputs_are_zero() {
        assert_eq!(inverse_document_frequency(0, 0), 0.0);
        assert_eq!(inverse_document_frequency(5, 0), 0.0);
        assert_eq!(inverse_document_frequency(2, 5), 0.0);
    }

    #[test]
    fn phase_error_messages_name_the_fix() {
        let err = PhaseError::OutOfOrder {
            operation: "compute similarities",
            phase: IndexingPhase::RecalculatingIdf,
            hint: "run recalculate_idf first",
        };
        let msg = err.to_string();
        assert!(msg.contains("recalculating_idf"));
        assert!(msg.contains("run recalculate_idf first"));
        assert_eq!(
            PhaseError::PendingDocuments { pending: 3 }.to_string(),
            "cannot recalculate IDF while 3 documents are still pending"
        );
    }
}
