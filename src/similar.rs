//! `interlink similar <document-id>`: suggested internal links.

use anyhow::{bail, Result};

use interlink_core::models::SimilarContent;

use crate::config::Config;
use crate::db;

pub async fn run_similar(
    config: &Config,
    document_id: &str,
    limit: Option<usize>,
    min_similarity: Option<f64>,
    json: bool,
) -> Result<()> {
    let limit = limit.unwrap_or(config.similarity.default_limit);
    let min_similarity = min_similarity.unwrap_or(config.similarity.min_similarity);
    if !(0.0..=1.0).contains(&min_similarity) {
        bail!("--min-similarity must be in [0.0, 1.0]");
    }

    let engine = db::open_engine(config).await?;
    let results = engine
        .get_similar_content(document_id, limit, min_similarity)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print!("{}", format_human(document_id, &results));
    }
    Ok(())
}

fn format_human(document_id: &str, results: &[SimilarContent]) -> String {
    if results.is_empty() {
        return format!("No similar content found for {}.\n", document_id);
    }
    let mut out = format!("Similar to {}:\n", document_id);
    for (i, r) in results.iter().enumerate() {
        out.push_str(&format!(
            "{:>3}. {:.4}  {}  {} ({})\n",
            i + 1,
            r.score,
            r.url,
            r.title,
            r.document_id
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_output_lists_results_in_order() {
        let results = vec![
            SimilarContent {
                content_id: 2,
                document_id: "b".into(),
                url: "/b".into(),
                title: "Bee".into(),
                score: 0.75,
            },
            SimilarContent {
                content_id: 3,
                document_id: "c".into(),
                url: "/c".into(),
                title: "Sea".into(),
                score: 0.5,
            },
        ];
        let out = format_human("a", &results);
        assert_eq!(
            out,
            "Similar to a:\n  1. 0.7500  /b  Bee (b)\n  2. 0.5000  /c  Sea (c)\n"
        );
        assert_eq!(format_human("z", &[]), "No similar content found for z.\n");
    }
}
