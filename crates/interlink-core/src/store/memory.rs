//! In-memory [`Store`] implementation for testing and WASM targets.
//!
//! All tables live in ordered maps behind a single `std::sync::RwLock`, so
//! iteration order (and therefore id assignment) is deterministic.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{
    Document, IndexStatus, IndexedContent, IndexingPhase, NewIndexedContent, SimilarityEdge,
    Term, TfIdfEntry, UpsertOutcome, UpsertResult,
};

use super::Store;

struct Tables {
    documents: BTreeMap<String, Document>,
    contents: BTreeMap<i64, IndexedContent>,
    next_content_id: i64,
    terms: BTreeMap<i64, Term>,
    term_ids: HashMap<String, i64>,
    next_term_id: i64,
    tfidf: BTreeMap<(i64, i64), TfIdfEntry>,
    edges: BTreeMap<(i64, i64), f64>,
    phase: IndexingPhase,
}

impl Tables {
    fn new() -> Self {
        Self {
            documents: BTreeMap::new(),
            contents: BTreeMap::new(),
            next_content_id: 1,
            terms: BTreeMap::new(),
            term_ids: HashMap::new(),
            next_term_id: 1,
            tfidf: BTreeMap::new(),
            edges: BTreeMap::new(),
            phase: IndexingPhase::Registering,
        }
    }

    fn content_mut(&mut self, id: i64) -> Result<&mut IndexedContent> {
        self.contents
            .get_mut(&id)
            .ok_or_else(|| anyhow!("indexed content not found: {}", id))
    }
}

/// In-memory store for tests and WASM environments.
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::new()),
        }
    }

    /// Build a store pre-populated with source documents.
    pub fn with_documents(documents: impl IntoIterator<Item = Document>) -> Self {
        let store = Self::new();
        if let Ok(mut tables) = store.tables.write() {
            for doc in documents {
                tables.documents.insert(doc.id.clone(), doc);
            }
        }
        store
    }

    /// Insert or replace a source document (stands in for the CMS).
    pub fn put_document(&self, document: Document) -> Result<()> {
        self.write()?
            .documents
            .insert(document.id.clone(), document);
        Ok(())
    }

    /// Remove a source document. Index rows are left alone.
    pub fn remove_document(&self, id: &str) -> Result<()> {
        self.write()?.documents.remove(id);
        Ok(())
    }

    /// Number of stored edges (both directions counted).
    pub fn edge_count(&self) -> Result<usize> {
        Ok(self.read()?.edges.len())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn list_published_documents(&self) -> Result<Vec<Document>> {
        Ok(self
            .read()?
            .documents
            .values()
            .filter(|d| d.published)
            .cloned()
            .collect())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.read()?.documents.get(id).cloned())
    }

    async fn upsert_indexed_content(&self, content: &NewIndexedContent) -> Result<UpsertResult> {
        let mut tables = self.write()?;

        let existing = tables
            .contents
            .values_mut()
            .find(|c| c.url_hash == content.url_hash);

        if let Some(row) = existing {
            if row.content_hash == content.content_hash {
                return Ok(UpsertResult {
                    content: row.clone(),
                    outcome: UpsertOutcome::Unchanged,
                });
            }
            row.document_id = content.document_id.clone();
            row.url = content.url.clone();
            row.title = content.title.clone();
            row.content_hash = content.content_hash.clone();
            row.word_count = content.word_count;
            row.status = IndexStatus::Pending;
            return Ok(UpsertResult {
                content: row.clone(),
                outcome: UpsertOutcome::Changed,
            });
        }

        let id = tables.next_content_id;
        tables.next_content_id += 1;
        let row = IndexedContent {
            id,
            document_id: content.document_id.clone(),
            url: content.url.clone(),
            url_hash: content.url_hash.clone(),
            title: content.title.clone(),
            content_hash: content.content_hash.clone(),
            word_count: content.word_count,
            vector_norm: 0.0,
            status: IndexStatus::Pending,
            processed_at: None,
        };
        tables.contents.insert(id, row.clone());
        Ok(UpsertResult {
            content: row,
            outcome: UpsertOutcome::Inserted,
        })
    }

    async fn update_indexed_content_status(
        &self,
        id: i64,
        status: IndexStatus,
        processed_at: i64,
    ) -> Result<()> {
        let mut tables = self.write()?;
        let row = tables.content_mut(id)?;
        row.status = status;
        row.processed_at = Some(processed_at);
        Ok(())
    }

    async fn set_vector_norm(&self, id: i64, norm: f64) -> Result<()> {
        self.write()?.content_mut(id)?.vector_norm = norm;
        Ok(())
    }

    async fn get_indexed_content(&self, id: i64) -> Result<Option<IndexedContent>> {
        Ok(self.read()?.contents.get(&id).cloned())
    }

    async fn get_indexed_content_by_document_id(
        &self,
        document_id: &str,
    ) -> Result<Option<IndexedContent>> {
        Ok(self
            .read()?
            .contents
            .values()
            .rev()
            .find(|c| c.document_id == document_id)
            .cloned())
    }

    async fn delete_superseded_content(
        &self,
        document_id: &str,
        keep_url_hash: &str,
    ) -> Result<u64> {
        let mut tables = self.write()?;
        let stale: Vec<i64> = tables
            .contents
            .values()
            .filter(|c| c.document_id == document_id && c.url_hash != keep_url_hash)
            .map(|c| c.id)
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }
        tables
            .edges
            .retain(|(a, b), _| !stale.contains(a) && !stale.contains(b));
        tables.tfidf.retain(|(cid, _), _| !stale.contains(cid));
        for id in &stale {
            tables.contents.remove(id);
        }
        Ok(stale.len() as u64)
    }

    async fn list_indexed_content_by_status(
        &self,
        status: IndexStatus,
        limit: Option<usize>,
    ) -> Result<Vec<IndexedContent>> {
        Ok(self
            .read()?
            .contents
            .values()
            .filter(|c| c.status == status)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn count_indexed_content_by_status(&self, status: IndexStatus) -> Result<i64> {
        Ok(self
            .read()?
            .contents
            .values()
            .filter(|c| c.status == status)
            .count() as i64)
    }

    async fn count_indexed_content(&self) -> Result<i64> {
        Ok(self.read()?.contents.len() as i64)
    }

    async fn average_word_count(&self, status: IndexStatus) -> Result<f64> {
        let tables = self.read()?;
        let counts: Vec<i64> = tables
            .contents
            .values()
            .filter(|c| c.status == status)
            .map(|c| c.word_count)
            .collect();
        if counts.is_empty() {
            return Ok(0.0);
        }
        Ok(counts.iter().sum::<i64>() as f64 / counts.len() as f64)
    }

    async fn find_or_create_term(&self, term: &str) -> Result<Term> {
        let mut tables = self.write()?;
        if let Some(id) = tables.term_ids.get(term).copied() {
            if let Some(existing) = tables.terms.get(&id) {
                return Ok(existing.clone());
            }
        }
        let id = tables.next_term_id;
        tables.next_term_id += 1;
        let created = Term {
            id,
            term: term.to_string(),
            document_frequency: 0,
            idf_score: 0.0,
        };
        tables.term_ids.insert(term.to_string(), id);
        tables.terms.insert(id, created.clone());
        Ok(created)
    }

    async fn update_term(&self, id: i64, document_frequency: i64, idf_score: f64) -> Result<()> {
        let mut tables = self.write()?;
        let term = tables
            .terms
            .get_mut(&id)
            .ok_or_else(|| anyhow!("term not found: {}", id))?;
        term.document_frequency = document_frequency;
        term.idf_score = idf_score;
        Ok(())
    }

    async fn list_terms(&self) -> Result<Vec<Term>> {
        Ok(self.read()?.terms.values().cloned().collect())
    }

    async fn count_terms(&self) -> Result<i64> {
        Ok(self.read()?.terms.len() as i64)
    }

    async fn count_document_frequency_for_term(&self, term_id: i64) -> Result<i64> {
        let tables = self.read()?;
        Ok(tables
            .tfidf
            .values()
            .filter(|e| e.term_id == term_id)
            .filter(|e| {
                tables
                    .contents
                    .get(&e.content_id)
                    .is_some_and(|c| c.status == IndexStatus::Indexed)
            })
            .count() as i64)
    }

    async fn upsert_tfidf_entries(&self, entries: &[TfIdfEntry]) -> Result<()> {
        let mut tables = self.write()?;
        for entry in entries {
            tables
                .tfidf
                .insert((entry.content_id, entry.term_id), *entry);
        }
        Ok(())
    }

    async fn get_tfidf_vector(&self, content_id: i64) -> Result<Vec<TfIdfEntry>> {
        Ok(self
            .read()?
            .tfidf
            .range((content_id, i64::MIN)..=(content_id, i64::MAX))
            .map(|(_, e)| *e)
            .collect())
    }

    async fn delete_tfidf_vector(&self, content_id: i64) -> Result<()> {
        self.write()?
            .tfidf
            .retain(|(cid, _), _| *cid != content_id);
        Ok(())
    }

    async fn upsert_similarity_edges(&self, edges: &[SimilarityEdge]) -> Result<()> {
        let mut tables = self.write()?;
        for edge in edges {
            tables
                .edges
                .insert((edge.content_id_a, edge.content_id_b), edge.score);
        }
        Ok(())
    }

    async fn get_top_similar_edges(
        &self,
        content_id: i64,
        limit: usize,
        min_score: f64,
    ) -> Result<Vec<SimilarityEdge>> {
        let tables = self.read()?;
        let mut edges: Vec<SimilarityEdge> = tables
            .edges
            .range((content_id, i64::MIN)..=(content_id, i64::MAX))
            .filter(|(_, score)| **score >= min_score)
            .map(|(&(a, b), &score)| SimilarityEdge {
                content_id_a: a,
                content_id_b: b,
                score,
            })
            .collect();
        edges.sort_by(|x, y| {
            y.score
                .partial_cmp(&x.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(x.content_id_b.cmp(&y.content_id_b))
        });
        edges.truncate(limit);
        Ok(edges)
    }

    async fn delete_similarity_edges(&self) -> Result<()> {
        self.write()?.edges.clear();
        Ok(())
    }

    async fn get_phase(&self) -> Result<IndexingPhase> {
        Ok(self.read()?.phase)
    }

    async fn set_phase(&self, phase: IndexingPhase) -> Result<()> {
        self.write()?.phase = phase;
        Ok(())
    }

    async fn delete_all_index_data(&self) -> Result<()> {
        let mut tables = self.write()?;
        tables.edges.clear();
        tables.tfidf.clear();
        tables.contents.clear();
        tables.next_content_id = 1;
        tables.terms.clear();
        tables.term_ids.clear();
        tables.next_term_id = 1;
        tables.phase = IndexingPhase::Registering;
        Ok(())
    }
}
