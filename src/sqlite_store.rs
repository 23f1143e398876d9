//! SQLite-backed [`Store`] implementation.
//!
//! Maps each [`Store`] operation onto the schema created by
//! [`migrate`](crate::migrate) (documents, indexed_content, terms,
//! tfidf_entries, similarity_edges, index_state).

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use interlink_core::models::{
    Content, Document, IndexStatus, IndexedContent, IndexingPhase, NewIndexedContent,
    SimilarityEdge, Term, TfIdfEntry, UpsertOutcome, UpsertResult,
};
use interlink_core::store::Store;

const DOCUMENT_COLUMNS: &str =
    "id, slug, title, meta_title, meta_description, content_format, content, published";

const CONTENT_COLUMNS: &str = "id, document_id, url, url_hash, title, content_hash, word_count, \
     vector_norm, status, processed_at";

const PHASE_KEY: &str = "phase";

/// SQLite implementation of the [`Store`] trait.
///
/// Wraps a [`SqlitePool`]. Multi-statement writes run inside a transaction.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace a source document, keyed by id.
    pub async fn upsert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, slug, title, meta_title, meta_description,
                                   content_format, content, published)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                slug = excluded.slug,
                title = excluded.title,
                meta_title = excluded.meta_title,
                meta_description = excluded.meta_description,
                content_format = excluded.content_format,
                content = excluded.content,
                published = excluded.published
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.slug)
        .bind(&doc.title)
        .bind(&doc.meta_title)
        .bind(&doc.meta_description)
        .bind(doc.content.format())
        .bind(doc.content.to_stored())
        .bind(doc.published)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count_documents(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn count_similarity_edges(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM similarity_edges")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Most recent status flip out of `pending`, if any.
    pub async fn last_processed_at(&self) -> Result<Option<i64>> {
        let ts: Option<i64> = sqlx::query_scalar("SELECT MAX(processed_at) FROM indexed_content")
            .fetch_one(&self.pool)
            .await?;
        Ok(ts)
    }
}

fn document_from_row(row: &SqliteRow) -> Document {
    let format: String = row.get("content_format");
    Document {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        meta_title: row.get("meta_title"),
        meta_description: row.get("meta_description"),
        content: Content::from_stored(&format, row.get("content")),
        published: row.get("published"),
    }
}

fn content_from_row(row: &SqliteRow) -> Result<IndexedContent> {
    let status: String = row.get("status");
    Ok(IndexedContent {
        id: row.get("id"),
        document_id: row.get("document_id"),
        url: row.get("url"),
        url_hash: row.get("url_hash"),
        title: row.get("title"),
        content_hash: row.get("content_hash"),
        word_count: row.get("word_count"),
        vector_norm: row.get("vector_norm"),
        status: status.parse()?,
        processed_at: row.get("processed_at"),
    })
}

fn term_from_row(row: &SqliteRow) -> Term {
    Term {
        id: row.get("id"),
        term: row.get("term"),
        document_frequency: row.get("document_frequency"),
        idf_score: row.get("idf_score"),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn list_published_documents(&self) -> Result<Vec<Document>> {
        let sql = format!(
            "SELECT {} FROM documents WHERE published = 1 ORDER BY id",
            DOCUMENT_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(document_from_row).collect())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let sql = format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(document_from_row))
    }

    async fn upsert_indexed_content(&self, content: &NewIndexedContent) -> Result<UpsertResult> {
        let mut tx = self.pool.begin().await?;

        let select = format!(
            "SELECT {} FROM indexed_content WHERE url_hash = ?",
            CONTENT_COLUMNS
        );
        let existing = sqlx::query(&select)
            .bind(&content.url_hash)
            .fetch_optional(&mut *tx)
            .await?;

        let (id, outcome) = match existing {
            Some(row) => {
                let current = content_from_row(&row)?;
                if current.content_hash == content.content_hash {
                    tx.commit().await?;
                    return Ok(UpsertResult {
                        content: current,
                        outcome: UpsertOutcome::Unchanged,
                    });
                }
                sqlx::query(
                    r#"
                    UPDATE indexed_content SET
                        document_id = ?,
                        url = ?,
                        title = ?,
                        content_hash = ?,
                        word_count = ?,
                        status = 'pending'
                    WHERE id = ?
                    "#,
                )
                .bind(&content.document_id)
                .bind(&content.url)
                .bind(&content.title)
                .bind(&content.content_hash)
                .bind(content.word_count)
                .bind(current.id)
                .execute(&mut *tx)
                .await?;
                (current.id, UpsertOutcome::Changed)
            }
            None => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO indexed_content (document_id, url, url_hash, title,
                                                 content_hash, word_count, status)
                    VALUES (?, ?, ?, ?, ?, ?, 'pending')
                    "#,
                )
                .bind(&content.document_id)
                .bind(&content.url)
                .bind(&content.url_hash)
                .bind(&content.title)
                .bind(&content.content_hash)
                .bind(content.word_count)
                .execute(&mut *tx)
                .await?;
                (result.last_insert_rowid(), UpsertOutcome::Inserted)
            }
        };

        let select_by_id = format!("SELECT {} FROM indexed_content WHERE id = ?", CONTENT_COLUMNS);
        let row = sqlx::query(&select_by_id)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        let stored = content_from_row(&row)?;
        tx.commit().await?;

        Ok(UpsertResult {
            content: stored,
            outcome,
        })
    }

    async fn update_indexed_content_status(
        &self,
        id: i64,
        status: IndexStatus,
        processed_at: i64,
    ) -> Result<()> {
        sqlx::query("UPDATE indexed_content SET status = ?, processed_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(processed_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_vector_norm(&self, id: i64, norm: f64) -> Result<()> {
        sqlx::query("UPDATE indexed_content SET vector_norm = ? WHERE id = ?")
            .bind(norm)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_indexed_content(&self, id: i64) -> Result<Option<IndexedContent>> {
        let sql = format!("SELECT {} FROM indexed_content WHERE id = ?", CONTENT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(content_from_row).transpose()
    }

    async fn get_indexed_content_by_document_id(
        &self,
        document_id: &str,
    ) -> Result<Option<IndexedContent>> {
        let sql = format!(
            "SELECT {} FROM indexed_content WHERE document_id = ? ORDER BY id DESC LIMIT 1",
            CONTENT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(content_from_row).transpose()
    }

    async fn delete_superseded_content(
        &self,
        document_id: &str,
        keep_url_hash: &str,
    ) -> Result<u64> {
        const STALE: &str =
            "SELECT id FROM indexed_content WHERE document_id = ? AND url_hash != ?";
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "DELETE FROM similarity_edges WHERE content_id_a IN ({STALE}) OR content_id_b IN ({STALE})"
        ))
        .bind(document_id)
        .bind(keep_url_hash)
        .bind(document_id)
        .bind(keep_url_hash)
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!(
            "DELETE FROM tfidf_entries WHERE content_id IN ({STALE})"
        ))
        .bind(document_id)
        .bind(keep_url_hash)
        .execute(&mut *tx)
        .await?;
        let removed =
            sqlx::query("DELETE FROM indexed_content WHERE document_id = ? AND url_hash != ?")
                .bind(document_id)
                .bind(keep_url_hash)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        tx.commit().await?;
        Ok(removed)
    }

    async fn list_indexed_content_by_status(
        &self,
        status: IndexStatus,
        limit: Option<usize>,
    ) -> Result<Vec<IndexedContent>> {
        // LIMIT -1 means no limit in SQLite
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let sql = format!(
            "SELECT {} FROM indexed_content WHERE status = ? ORDER BY id LIMIT ?",
            CONTENT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(content_from_row).collect()
    }

    async fn count_indexed_content_by_status(&self, status: IndexStatus) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM indexed_content WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_indexed_content(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM indexed_content")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn average_word_count(&self, status: IndexStatus) -> Result<f64> {
        let avg: f64 = sqlx::query_scalar(
            "SELECT COALESCE(AVG(word_count), 0.0) FROM indexed_content WHERE status = ?",
        )
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(avg)
    }

    async fn find_or_create_term(&self, term: &str) -> Result<Term> {
        sqlx::query("INSERT INTO terms (term) VALUES (?) ON CONFLICT(term) DO NOTHING")
            .bind(term)
            .execute(&self.pool)
            .await?;
        let row = sqlx::query(
            "SELECT id, term, document_frequency, idf_score FROM terms WHERE term = ?",
        )
        .bind(term)
        .fetch_one(&self.pool)
        .await?;
        Ok(term_from_row(&row))
    }

    async fn update_term(&self, id: i64, document_frequency: i64, idf_score: f64) -> Result<()> {
        sqlx::query("UPDATE terms SET document_frequency = ?, idf_score = ? WHERE id = ?")
            .bind(document_frequency)
            .bind(idf_score)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_terms(&self) -> Result<Vec<Term>> {
        let rows =
            sqlx::query("SELECT id, term, document_frequency, idf_score FROM terms ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.iter().map(term_from_row).collect())
    }

    async fn count_terms(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM terms")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_document_frequency_for_term(&self, term_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM tfidf_entries t
            JOIN indexed_content c ON c.id = t.content_id
            WHERE t.term_id = ? AND c.status = 'indexed'
            "#,
        )
        .bind(term_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn upsert_tfidf_entries(&self, entries: &[TfIdfEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO tfidf_entries (content_id, term_id, tf, score)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(content_id, term_id) DO UPDATE SET
                    tf = excluded.tf,
                    score = excluded.score
                "#,
            )
            .bind(entry.content_id)
            .bind(entry.term_id)
            .bind(entry.tf)
            .bind(entry.score)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_tfidf_vector(&self, content_id: i64) -> Result<Vec<TfIdfEntry>> {
        let rows = sqlx::query(
            "SELECT content_id, term_id, tf, score FROM tfidf_entries WHERE content_id = ? ORDER BY term_id",
        )
        .bind(content_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| TfIdfEntry {
                content_id: row.get("content_id"),
                term_id: row.get("term_id"),
                tf: row.get("tf"),
                score: row.get("score"),
            })
            .collect())
    }

    async fn delete_tfidf_vector(&self, content_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM tfidf_entries WHERE content_id = ?")
            .bind(content_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_similarity_edges(&self, edges: &[SimilarityEdge]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for edge in edges {
            sqlx::query(
                r#"
                INSERT INTO similarity_edges (content_id_a, content_id_b, score)
                VALUES (?, ?, ?)
                ON CONFLICT(content_id_a, content_id_b) DO UPDATE SET
                    score = excluded.score
                "#,
            )
            .bind(edge.content_id_a)
            .bind(edge.content_id_b)
            .bind(edge.score)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_top_similar_edges(
        &self,
        content_id: i64,
        limit: usize,
        min_score: f64,
    ) -> Result<Vec<SimilarityEdge>> {
        let rows = sqlx::query(
            r#"
            SELECT content_id_a, content_id_b, score
            FROM similarity_edges
            WHERE content_id_a = ? AND score >= ?
            ORDER BY score DESC, content_id_b ASC
            LIMIT ?
            "#,
        )
        .bind(content_id)
        .bind(min_score)
        .bind(i64::try_from(limit).unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| SimilarityEdge {
                content_id_a: row.get("content_id_a"),
                content_id_b: row.get("content_id_b"),
                score: row.get("score"),
            })
            .collect())
    }

    async fn delete_similarity_edges(&self) -> Result<()> {
        sqlx::query("DELETE FROM similarity_edges")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_phase(&self) -> Result<IndexingPhase> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_state WHERE key = ?")
                .bind(PHASE_KEY)
                .fetch_optional(&self.pool)
                .await?;
        match value {
            Some(v) => v.parse(),
            None => Ok(IndexingPhase::Registering),
        }
    }

    async fn set_phase(&self, phase: IndexingPhase) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO index_state (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(PHASE_KEY)
        .bind(phase.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_all_index_data(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "similarity_edges",
            "tfidf_entries",
            "indexed_content",
            "terms",
        ] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM index_state WHERE key = ?")
            .bind(PHASE_KEY)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
