//! Pipeline tests for the similarity engine.
//!
//! Every scenario runs twice: once against `InMemoryStore` and once against
//! `SqliteStore` on a fresh temporary database.

use std::collections::HashMap;

use async_trait::async_trait;
use interlink::config::Config;
use interlink::sqlite_store::SqliteStore;
use interlink::{db, migrate};
use interlink_core::engine::{EngineConfig, PhaseError, SimilarityEngine};
use interlink_core::models::{Content, Document, IndexStatus, IndexingPhase};
use interlink_core::processor::ContentProcessor;
use interlink_core::store::memory::InMemoryStore;
use interlink_core::store::Store;
use tempfile::TempDir;

const EPS: f64 = 1e-9;

// ─── Backends ───────────────────────────────────────────────────────

/// Write access to the source documents, which the `Store` trait only reads.
#[async_trait]
trait Documents: Store {
    async fn put(&self, doc: Document);
    async fn remove(&self, id: &str);
}

#[async_trait]
impl Documents for InMemoryStore {
    async fn put(&self, doc: Document) {
        self.put_document(doc).unwrap();
    }

    async fn remove(&self, id: &str) {
        self.remove_document(id).unwrap();
    }
}

#[async_trait]
impl Documents for SqliteStore {
    async fn put(&self, doc: Document) {
        self.upsert_document(&doc).await.unwrap();
    }

    async fn remove(&self, id: &str) {
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .unwrap();
    }
}

fn memory_engine() -> SimilarityEngine<InMemoryStore> {
    SimilarityEngine::new(
        InMemoryStore::new(),
        ContentProcessor::default(),
        EngineConfig::default(),
    )
}

async fn sqlite_engine(tmp: &TempDir) -> SimilarityEngine<SqliteStore> {
    let cfg = Config::with_db_path(tmp.path().join("data").join("interlink.sqlite"));
    migrate::run_migrations(&cfg).await.unwrap();
    db::open_engine(&cfg).await.unwrap()
}

/// Run an `async fn(SimilarityEngine<S>)` scenario against both stores.
macro_rules! both_stores {
    ($($scenario:ident),* $(,)?) => {
        $(
            mod $scenario {
                use super::*;

                #[tokio::test]
                async fn in_memory() {
                    super::$scenario(memory_engine()).await;
                }

                #[tokio::test]
                async fn sqlite() {
                    let tmp = TempDir::new().unwrap();
                    super::$scenario(sqlite_engine(&tmp).await).await;
                }
            }
        )*
    };
}

// ─── Fixtures ───────────────────────────────────────────────────────

fn doc(id: &str, title: &str, html: &str) -> Document {
    Document {
        id: id.to_string(),
        slug: id.to_string(),
        title: title.to_string(),
        meta_title: None,
        meta_description: None,
        content: if html.is_empty() {
            Content::Empty
        } else {
            Content::Html(html.to_string())
        },
        published: true,
    }
}

fn rust_corpus() -> Vec<Document> {
    vec![
        doc(
            "garden",
            "Gardening tomatoes",
            "<p>Compost and soil make tomatoes grow.</p>",
        ),
        doc(
            "rust-1",
            "Rust ownership",
            "<p>Rust ownership and borrowing rules give memory safety.</p>",
        ),
        doc(
            "rust-2",
            "Rust borrowing",
            "<p>Borrowing in Rust builds on ownership and memory safety.</p>",
        ),
    ]
}

fn async_rust() -> Document {
    doc(
        "rust-3",
        "Async Rust",
        "<p>Tokio runtime drives async tasks in Rust.</p>",
    )
}

async fn seed<S: Documents>(engine: &SimilarityEngine<S>, docs: Vec<Document>) {
    for d in docs {
        engine.store().put(d).await;
    }
}

async fn drain<S: Store>(engine: &SimilarityEngine<S>) {
    loop {
        let batch = engine.process_batch(None).await.unwrap();
        if batch.remaining_pending_count == 0 {
            break;
        }
    }
}

fn phase_error(err: &anyhow::Error) -> &PhaseError {
    err.downcast_ref::<PhaseError>()
        .unwrap_or_else(|| panic!("expected PhaseError, got: {:#}", err))
}

// ─── Scenarios ──────────────────────────────────────────────────────

async fn identical_documents_score_one<S: Documents>(engine: SimilarityEngine<S>) {
    let body = "<p>Feed the sourdough starter with flour and water daily.</p>";
    seed(
        &engine,
        vec![
            doc("dup-a", "Sourdough starter", body),
            doc("dup-b", "Sourdough starter", body),
            doc(
                "other",
                "Kubernetes deployment",
                "<p>Containers scheduled on cluster nodes.</p>",
            ),
        ],
    )
    .await;

    let summary = engine.run_pipeline().await.unwrap();
    assert!(!summary.cancelled);
    assert_eq!(summary.processed, 3);

    let similar = engine.get_similar_content("dup-a", 5, 0.0).await.unwrap();
    assert_eq!(similar.len(), 1);
    assert_eq!(similar[0].document_id, "dup-b");
    assert!((similar[0].score - 1.0).abs() < EPS, "score = {}", similar[0].score);

    assert!(engine
        .get_similar_content("other", 5, 0.0)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(engine.phase().await.unwrap(), IndexingPhase::Ready);
}

async fn related_documents_are_symmetric<S: Documents>(engine: SimilarityEngine<S>) {
    seed(&engine, rust_corpus()).await;
    engine.run_pipeline().await.unwrap();

    let from_1 = engine.get_similar_content("rust-1", 5, 0.0).await.unwrap();
    let from_2 = engine.get_similar_content("rust-2", 5, 0.0).await.unwrap();
    assert_eq!(from_1.len(), 1);
    assert_eq!(from_2.len(), 1);
    assert_eq!(from_1[0].document_id, "rust-2");
    assert_eq!(from_1[0].url, "/rust-2");
    assert_eq!(from_1[0].title, "Rust borrowing");
    assert_eq!(from_2[0].document_id, "rust-1");
    assert!(from_1[0].score > 0.0 && from_1[0].score < 1.0);
    assert!((from_1[0].score - from_2[0].score).abs() < EPS);

    assert!(engine
        .get_similar_content("garden", 5, 0.0)
        .await
        .unwrap()
        .is_empty());
    assert!(engine
        .get_similar_content("rust-1", 5, 1.0)
        .await
        .unwrap()
        .is_empty());
    assert!(engine
        .get_similar_content("rust-1", 0, 0.0)
        .await
        .unwrap()
        .is_empty());
    assert!(engine
        .get_similar_content("missing", 5, 0.0)
        .await
        .unwrap()
        .is_empty());
}

async fn empty_content_is_indexed_without_edges<S: Documents>(engine: SimilarityEngine<S>) {
    let mut docs = rust_corpus();
    docs.push(doc("blank", "The", ""));
    seed(&engine, docs).await;

    let summary = engine.run_pipeline().await.unwrap();
    assert_eq!(summary.errors, 0);
    let similarity = summary.similarity.unwrap();
    assert_eq!(similarity.zero_norm_documents, 1);

    let blank = engine
        .store()
        .get_indexed_content_by_document_id("blank")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(blank.status, IndexStatus::Indexed);
    assert_eq!(blank.word_count, 0);
    assert_eq!(blank.vector_norm, 0.0);
    assert!(engine
        .get_similar_content("blank", 5, 0.0)
        .await
        .unwrap()
        .is_empty());
}

async fn two_identical_documents_have_zero_weight<S: Documents>(engine: SimilarityEngine<S>) {
    let body = "<p>Feed the sourdough starter with flour and water daily.</p>";
    seed(
        &engine,
        vec![
            doc("dup-a", "Sourdough starter", body),
            doc("dup-b", "Sourdough starter", body),
        ],
    )
    .await;

    // Every term appears in every document, so every IDF is ln(1) = 0.
    let summary = engine.run_pipeline().await.unwrap();
    let similarity = summary.similarity.unwrap();
    assert_eq!(similarity.zero_norm_documents, 2);
    assert_eq!(similarity.edges_written, 0);
    assert!(engine
        .get_similar_content("dup-a", 5, 0.0)
        .await
        .unwrap()
        .is_empty());
}

async fn changed_content_is_reregistered<S: Documents>(engine: SimilarityEngine<S>) {
    seed(&engine, rust_corpus()).await;
    engine.run_pipeline().await.unwrap();
    let before = engine
        .store()
        .get_indexed_content_by_document_id("rust-2")
        .await
        .unwrap()
        .unwrap();

    engine
        .store()
        .put(doc(
            "rust-2",
            "Rust borrowing",
            "<p>Lifetimes tell the compiler how long borrowing lasts.</p>",
        ))
        .await;

    let registration = engine.start_indexing().await.unwrap();
    assert_eq!(registration.total, 3);
    assert_eq!(registration.registered, 1);
    assert_eq!(registration.unchanged, 2);
    assert_eq!(engine.phase().await.unwrap(), IndexingPhase::Vectorizing);

    let changed = engine
        .store()
        .get_indexed_content_by_document_id("rust-2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(changed.id, before.id);
    assert_eq!(changed.status, IndexStatus::Pending);
    assert_ne!(changed.content_hash, before.content_hash);

    let summary = engine.run_pipeline().await.unwrap();
    assert_eq!(summary.processed, 1);
    let stats = engine.get_index_stats().await.unwrap();
    assert_eq!(stats.total_documents, 3);
    assert_eq!(stats.processed_documents, 3);
    assert_eq!(stats.pending_documents, 0);
    assert_eq!(stats.phase, IndexingPhase::Ready);
}

async fn slug_change_does_not_self_recommend<S: Documents>(engine: SimilarityEngine<S>) {
    seed(&engine, rust_corpus()).await;
    engine.run_pipeline().await.unwrap();

    let mut moved = rust_corpus().remove(1);
    moved.slug = "rust-one".to_string();
    engine.store().put(moved).await;

    let summary = engine.run_pipeline().await.unwrap();
    assert_eq!(summary.registration.registered, 1);
    assert_eq!(summary.registration.superseded, 1);
    assert_eq!(summary.processed, 1);

    let stats = engine.get_index_stats().await.unwrap();
    assert_eq!(stats.total_documents, 3);
    assert_eq!(stats.processed_documents, 3);

    let current = engine
        .store()
        .get_indexed_content_by_document_id("rust-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.url, "/rust-one");

    let similar = engine.get_similar_content("rust-1", 5, 0.0).await.unwrap();
    assert!(!similar.is_empty());
    assert!(similar.iter().all(|s| s.document_id != "rust-1"));
    assert_eq!(similar[0].document_id, "rust-2");

    let peers = engine.get_similar_content("rust-2", 5, 0.0).await.unwrap();
    let moved: Vec<&str> = peers
        .iter()
        .filter(|s| s.document_id == "rust-1")
        .map(|s| s.url.as_str())
        .collect();
    assert_eq!(moved, vec!["/rust-one"]);
}

async fn rerunning_unchanged_corpus_is_idempotent<S: Documents>(engine: SimilarityEngine<S>) {
    seed(&engine, rust_corpus()).await;
    engine.run_pipeline().await.unwrap();
    let first = engine.get_similar_content("rust-1", 5, 0.0).await.unwrap();
    let first_stats = engine.get_index_stats().await.unwrap();

    let summary = engine.run_pipeline().await.unwrap();
    assert_eq!(summary.registration.registered, 0);
    assert_eq!(summary.registration.unchanged, 3);
    assert_eq!(summary.processed, 0);

    let second = engine.get_similar_content("rust-1", 5, 0.0).await.unwrap();
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.document_id, b.document_id);
        assert!((a.score - b.score).abs() < EPS);
    }
    assert_eq!(engine.get_index_stats().await.unwrap(), first_stats);
}

async fn recalculated_idf_matches_corpus<S: Documents>(engine: SimilarityEngine<S>) {
    let mut docs = rust_corpus();
    docs.push(async_rust());
    seed(&engine, docs).await;
    engine.run_pipeline().await.unwrap();

    let store = engine.store();
    let indexed = store
        .list_indexed_content_by_status(IndexStatus::Indexed, None)
        .await
        .unwrap();
    let n = indexed.len() as f64;
    assert_eq!(indexed.len(), 4);

    let mut df: HashMap<i64, i64> = HashMap::new();
    let mut vectors = Vec::new();
    for content in &indexed {
        let vector = store.get_tfidf_vector(content.id).await.unwrap();
        let norm = vector.iter().map(|e| e.score * e.score).sum::<f64>().sqrt();
        assert!((content.vector_norm - norm).abs() < EPS);
        for entry in &vector {
            *df.entry(entry.term_id).or_insert(0) += 1;
        }
        vectors.push(vector);
    }

    let terms = store.list_terms().await.unwrap();
    let mut idf = HashMap::new();
    for term in &terms {
        let expected_df = df.get(&term.id).copied().unwrap_or(0);
        assert_eq!(term.document_frequency, expected_df, "df of '{}'", term.term);
        let expected_idf = (n / expected_df as f64).ln();
        assert!(
            (term.idf_score - expected_idf).abs() < EPS,
            "idf of '{}': {} != {}",
            term.term,
            term.idf_score,
            expected_idf
        );
        idf.insert(term.id, term.idf_score);
    }

    let rust = terms.iter().find(|t| t.term == "rust").unwrap();
    assert_eq!(rust.document_frequency, 3);
    assert!((rust.idf_score - (4.0f64 / 3.0).ln()).abs() < EPS);

    for entry in vectors.iter().flatten() {
        assert!((entry.score - entry.tf * idf[&entry.term_id]).abs() < EPS);
    }
}

async fn provisional_idf_grows_with_corpus<S: Documents>(engine: SimilarityEngine<S>) {
    seed(
        &engine,
        vec![
            doc("a-first", "Alpha lattice", ""),
            doc("b-second", "Alpha prism", ""),
        ],
    )
    .await;
    engine.start_indexing().await.unwrap();

    let first = engine.process_batch(Some(1)).await.unwrap();
    assert_eq!(first.processed_count, 1);
    assert_eq!(first.remaining_pending_count, 1);
    assert_eq!(engine.phase().await.unwrap(), IndexingPhase::Vectorizing);

    let store = engine.store();
    let a = store
        .get_indexed_content_by_document_id("a-first")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(a.status, IndexStatus::Indexed);
    assert_eq!(a.vector_norm, 0.0);
    assert!(store
        .list_terms()
        .await
        .unwrap()
        .iter()
        .all(|t| t.idf_score == 0.0 && t.document_frequency == 1));

    let second = engine.process_batch(Some(1)).await.unwrap();
    assert_eq!(second.remaining_pending_count, 0);
    assert_eq!(engine.phase().await.unwrap(), IndexingPhase::RecalculatingIdf);

    let terms = store.list_terms().await.unwrap();
    let by_name = |name: &str| terms.iter().find(|t| t.term == name).unwrap().clone();
    assert_eq!(by_name("alpha").document_frequency, 2);
    assert_eq!(by_name("alpha").idf_score, 0.0);
    assert!((by_name("prism").idf_score - 2f64.ln()).abs() < EPS);

    let b = store
        .get_indexed_content_by_document_id("b-second")
        .await
        .unwrap()
        .unwrap();
    assert!((b.vector_norm - 0.5 * 2f64.ln()).abs() < EPS);

    let idf = engine.recalculate_idf().await.unwrap();
    assert_eq!(idf.total_documents, 2);
    assert_eq!(idf.documents_rescored, 2);
    let a = store.get_indexed_content(a.id).await.unwrap().unwrap();
    assert!((a.vector_norm - 0.5 * 2f64.ln()).abs() < EPS);

    // The only shared term has zero weight.
    let similarity = engine.calculate_all_similarities().await.unwrap();
    assert_eq!(similarity.candidate_pairs, 0);
    assert_eq!(similarity.edges_written, 0);
}

async fn batches_respect_batch_size<S: Documents>(engine: SimilarityEngine<S>) {
    seed(&engine, rust_corpus()).await;
    let registration = engine.start_indexing().await.unwrap();
    assert_eq!(registration.registered, 3);

    let first = engine.process_batch(Some(2)).await.unwrap();
    assert_eq!(first.processed_count, 2);
    assert_eq!(first.remaining_pending_count, 1);

    let second = engine.process_batch(Some(2)).await.unwrap();
    assert_eq!(second.processed_count, 1);
    assert_eq!(second.remaining_pending_count, 0);

    let third = engine.process_batch(Some(2)).await.unwrap();
    assert_eq!(third.processed_count, 0);
    assert_eq!(engine.phase().await.unwrap(), IndexingPhase::RecalculatingIdf);
}

async fn stages_enforce_order<S: Documents>(engine: SimilarityEngine<S>) {
    let err = engine.process_batch(None).await.unwrap_err();
    assert!(matches!(
        phase_error(&err),
        PhaseError::OutOfOrder {
            phase: IndexingPhase::Registering,
            ..
        }
    ));
    let err = engine.recalculate_idf().await.unwrap_err();
    assert!(matches!(phase_error(&err), PhaseError::OutOfOrder { .. }));
    let err = engine.calculate_all_similarities().await.unwrap_err();
    assert!(matches!(phase_error(&err), PhaseError::OutOfOrder { .. }));

    seed(&engine, rust_corpus()).await;
    engine.start_indexing().await.unwrap();

    let err = engine.recalculate_idf().await.unwrap_err();
    assert_eq!(phase_error(&err), &PhaseError::PendingDocuments { pending: 3 });
    let err = engine.calculate_all_similarities().await.unwrap_err();
    assert!(matches!(
        phase_error(&err),
        PhaseError::OutOfOrder {
            phase: IndexingPhase::Vectorizing,
            ..
        }
    ));

    drain(&engine).await;
    let err = engine.calculate_all_similarities().await.unwrap_err();
    assert!(matches!(
        phase_error(&err),
        PhaseError::OutOfOrder {
            phase: IndexingPhase::RecalculatingIdf,
            ..
        }
    ));

    engine.recalculate_idf().await.unwrap();
    assert_eq!(
        engine.phase().await.unwrap(),
        IndexingPhase::ComputingSimilarity
    );
    engine.calculate_all_similarities().await.unwrap();
    assert_eq!(engine.phase().await.unwrap(), IndexingPhase::Ready);

    // Recomputing from Ready is allowed.
    engine.calculate_all_similarities().await.unwrap();
    assert_eq!(engine.phase().await.unwrap(), IndexingPhase::Ready);
}

async fn failed_documents_are_marked_error<S: Documents>(engine: SimilarityEngine<S>) {
    let mut docs = rust_corpus();
    docs.push(async_rust());
    seed(&engine, docs).await;
    engine.start_indexing().await.unwrap();
    engine.store().remove("garden").await;

    let batch = engine.process_batch(None).await.unwrap();
    assert_eq!(batch.processed_count, 4);
    assert_eq!(batch.error_count, 1);
    assert_eq!(batch.remaining_pending_count, 0);

    let garden = engine
        .store()
        .get_indexed_content_by_document_id("garden")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(garden.status, IndexStatus::Error);
    assert!(garden.processed_at.is_some());
    assert!(engine
        .store()
        .get_tfidf_vector(garden.id)
        .await
        .unwrap()
        .is_empty());

    engine.recalculate_idf().await.unwrap();
    engine.calculate_all_similarities().await.unwrap();

    let stats = engine.get_index_stats().await.unwrap();
    assert_eq!(stats.error_documents, 1);
    assert_eq!(stats.processed_documents, 3);
    assert!(engine
        .get_similar_content("garden", 5, 0.0)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        engine.get_similar_content("rust-1", 5, 0.0).await.unwrap()[0].document_id,
        "rust-2"
    );
}

async fn cancellation_stops_between_documents<S: Documents>(engine: SimilarityEngine<S>) {
    seed(&engine, rust_corpus()).await;
    engine.start_indexing().await.unwrap();

    engine.cancellation_token().cancel();
    let batch = engine.process_batch(None).await.unwrap();
    assert!(batch.cancelled);
    assert_eq!(batch.processed_count, 0);
    assert_eq!(batch.remaining_pending_count, 3);
    assert_eq!(engine.phase().await.unwrap(), IndexingPhase::Vectorizing);

    let summary = engine.run_pipeline().await.unwrap();
    assert!(summary.cancelled);
    assert!(summary.idf.is_none());
    assert!(summary.similarity.is_none());
    assert_eq!(engine.phase().await.unwrap(), IndexingPhase::Vectorizing);
}

async fn unpublished_documents_are_ignored<S: Documents>(engine: SimilarityEngine<S>) {
    let mut draft = doc("draft", "Rust ownership draft", "<p>Rust ownership.</p>");
    draft.published = false;
    let mut docs = rust_corpus();
    docs.push(draft);
    seed(&engine, docs).await;

    let summary = engine.run_pipeline().await.unwrap();
    assert_eq!(summary.registration.total, 3);
    assert!(engine
        .store()
        .get_indexed_content_by_document_id("draft")
        .await
        .unwrap()
        .is_none());
    assert!(engine
        .get_similar_content("rust-1", 5, 0.0)
        .await
        .unwrap()
        .iter()
        .all(|s| s.document_id != "draft"));
}

async fn stats_and_clear<S: Documents>(engine: SimilarityEngine<S>) {
    let docs = rust_corpus();
    let expected_avg = docs
        .iter()
        .map(|d| engine.processor().process_page_content(d).word_count as f64)
        .sum::<f64>()
        / docs.len() as f64;
    seed(&engine, docs).await;

    let empty = engine.get_index_stats().await.unwrap();
    assert_eq!(empty.total_documents, 0);
    assert_eq!(empty.average_word_count, 0.0);
    assert_eq!(empty.phase, IndexingPhase::Registering);

    engine.run_pipeline().await.unwrap();
    let stats = engine.get_index_stats().await.unwrap();
    assert_eq!(stats.total_documents, 3);
    assert_eq!(stats.processed_documents, 3);
    assert_eq!(stats.pending_documents, 0);
    assert_eq!(stats.error_documents, 0);
    assert!(stats.total_terms > 0);
    assert!((stats.average_word_count - expected_avg).abs() < EPS);

    engine.clear_index().await.unwrap();
    let cleared = engine.get_index_stats().await.unwrap();
    assert_eq!(cleared.total_documents, 0);
    assert_eq!(cleared.total_terms, 0);
    assert_eq!(cleared.phase, IndexingPhase::Registering);
    assert!(engine
        .get_similar_content("rust-1", 5, 0.0)
        .await
        .unwrap()
        .is_empty());

    // Source documents survive a clear; a rebuild reaches the same state.
    engine.run_pipeline().await.unwrap();
    assert_eq!(engine.get_index_stats().await.unwrap().processed_documents, 3);
}

async fn empty_corpus_reaches_ready<S: Documents>(engine: SimilarityEngine<S>) {
    let summary = engine.run_pipeline().await.unwrap();
    assert_eq!(summary.registration.total, 0);
    assert_eq!(summary.similarity.unwrap().edges_written, 0);
    assert_eq!(engine.phase().await.unwrap(), IndexingPhase::Ready);
}

async fn top_terms_for_document<S: Documents>(engine: SimilarityEngine<S>) {
    seed(&engine, rust_corpus()).await;

    let terms = engine
        .get_top_terms_for_document("rust-1", 2)
        .await
        .unwrap()
        .unwrap();
    let names: Vec<&str> = terms.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(names, vec!["rust", "ownership"]);
    assert!((terms[0].1 - terms[1].1).abs() < EPS);

    assert!(engine
        .get_top_terms_for_document("missing", 5)
        .await
        .unwrap()
        .is_none());
}

both_stores!(
    identical_documents_score_one,
    related_documents_are_symmetric,
    empty_content_is_indexed_without_edges,
    two_identical_documents_have_zero_weight,
    changed_content_is_reregistered,
    slug_change_does_not_self_recommend,
    rerunning_unchanged_corpus_is_idempotent,
    recalculated_idf_matches_corpus,
    provisional_idf_grows_with_corpus,
    batches_respect_batch_size,
    stages_enforce_order,
    failed_documents_are_marked_error,
    cancellation_stops_between_documents,
    unpublished_documents_are_ignored,
    stats_and_clear,
    empty_corpus_reaches_ready,
    top_terms_for_document,
);
