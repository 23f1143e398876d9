//! Index statistics and term inspection.
//!
//! `interlink stats` gives a quick read on pipeline progress: how many
//! documents are registered, indexed, pending, or failed, the vocabulary
//! size, and the current phase. `interlink terms` shows what a single
//! document is "about" according to the processor.

use anyhow::{bail, Result};
use serde::Serialize;

use interlink_core::models::IndexStats;

use crate::config::Config;
use crate::db;

#[derive(Serialize)]
struct StatsReport<'a> {
    database: String,
    size_bytes: u64,
    similarity_edges: i64,
    last_processed_at: Option<i64>,
    #[serde(flatten)]
    stats: &'a IndexStats,
}

/// Run the stats command: query the index and print a summary.
pub async fn run_stats(config: &Config, json: bool) -> Result<()> {
    let engine = db::open_engine(config).await?;
    let stats = engine.get_index_stats().await?;
    let store = engine.store();
    let edges = store.count_similarity_edges().await?;
    let last_processed_at = store.last_processed_at().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    if json {
        let report = StatsReport {
            database: config.db.path.display().to_string(),
            size_bytes: db_size,
            similarity_edges: edges,
            last_processed_at,
            stats: &stats,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        store.pool().close().await;
        return Ok(());
    }

    println!("Interlink Index Stats");
    println!("=====================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Phase:       {}", stats.phase);
    println!();
    println!("  Registered:  {}", stats.total_documents);
    println!(
        "  Indexed:     {} / {} ({}%)",
        stats.processed_documents,
        stats.total_documents,
        if stats.total_documents > 0 {
            (stats.processed_documents * 100) / stats.total_documents
        } else {
            0
        }
    );
    println!("  Pending:     {}", stats.pending_documents);
    println!("  Errors:      {}", stats.error_documents);
    println!("  Terms:       {}", stats.total_terms);
    println!("  Avg words:   {:.1}", stats.average_word_count);
    println!("  Edges:       {}", edges);
    println!(
        "  Last index:  {}",
        match last_processed_at {
            Some(ts) => format_ts_relative(ts),
            None => "never".to_string(),
        }
    );
    println!();

    store.pool().close().await;
    Ok(())
}

/// Print the highest-frequency terms of one document.
pub async fn run_terms(config: &Config, document_id: &str, limit: usize) -> Result<()> {
    let engine = db::open_engine(config).await?;
    let Some(terms) = engine
        .get_top_terms_for_document(document_id, limit)
        .await?
    else {
        bail!("Document not found: {}", document_id);
    };

    if terms.is_empty() {
        println!("No terms found for {}.", document_id);
        return Ok(());
    }
    println!("  {:<24} {:>8}", "TERM", "TF");
    println!("  {}", "-".repeat(33));
    for (term, tf) in &terms {
        println!("  {:<24} {:>8.4}", term, tf);
    }
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_sizes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn relative_times() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 120), "2 mins ago");
        assert_eq!(format_ts_relative(now - 3 * 86400), "3 days ago");
        assert_eq!(format_ts_relative(0), "1970-01-01 00:00");
    }
}
