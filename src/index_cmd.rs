//! `interlink index ...` commands: drive the indexing pipeline stages.
//!
//! Each stage can run as its own process (the phase is persisted), so a
//! scheduler can call `index batch` repeatedly until nothing is pending.
//! `index run` executes every stage in one go and stops cleanly on Ctrl-C.

use anyhow::Result;
use tracing::warn;

use interlink_core::engine::SimilarityEngine;
use interlink_core::store::Store;

use crate::config::Config;
use crate::db;

pub async fn run_start(config: &Config) -> Result<()> {
    let engine = db::open_engine(config).await?;
    let summary = engine.start_indexing().await?;
    println!(
        "Registered {} of {} published documents ({} unchanged, {} errors).",
        summary.registered, summary.total, summary.unchanged, summary.errors
    );
    print_phase(&engine).await
}

pub async fn run_batch(config: &Config, batch_size: Option<usize>) -> Result<()> {
    let engine = db::open_engine(config).await?;
    let result = engine.process_batch(batch_size).await?;
    println!(
        "Processed {} documents ({} errors), {} pending.",
        result.processed_count, result.error_count, result.remaining_pending_count
    );
    print_phase(&engine).await
}

pub async fn run_idf(config: &Config) -> Result<()> {
    let engine = db::open_engine(config).await?;
    let summary = engine.recalculate_idf().await?;
    println!(
        "Recalculated IDF for {} terms over {} documents ({} vectors rescored).",
        summary.terms_updated, summary.total_documents, summary.documents_rescored
    );
    print_phase(&engine).await
}

pub async fn run_similarities(config: &Config) -> Result<()> {
    let engine = db::open_engine(config).await?;
    let summary = engine.calculate_all_similarities().await?;
    println!(
        "Compared {} documents: {} candidate pairs, {} edges written ({} skipped with empty vectors).",
        summary.documents, summary.candidate_pairs, summary.edges_written, summary.zero_norm_documents
    );
    print_phase(&engine).await
}

pub async fn run_pipeline(config: &Config) -> Result<()> {
    let engine = db::open_engine(config).await?;

    let token = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current document");
            token.cancel();
        }
    });

    let summary = engine.run_pipeline().await?;
    println!(
        "Registered {} documents, processed {} in {} batches ({} errors).",
        summary.registration.registered, summary.processed, summary.batches, summary.errors
    );
    if let Some(idf) = &summary.idf {
        println!("IDF recalculated for {} terms.", idf.terms_updated);
    }
    if let Some(similarity) = &summary.similarity {
        println!("{} similarity edges written.", similarity.edges_written);
    }
    if summary.cancelled {
        println!("Cancelled; run `interlink index run` again to resume.");
    }
    print_phase(&engine).await
}

pub async fn run_clear(config: &Config) -> Result<()> {
    let engine = db::open_engine(config).await?;
    engine.clear_index().await?;
    println!("Index cleared.");
    print_phase(&engine).await
}

async fn print_phase<S: Store>(engine: &SimilarityEngine<S>) -> Result<()> {
    println!("Phase: {}", engine.phase().await?);
    Ok(())
}
