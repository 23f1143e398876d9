//! Content processor: document → normalized tokens, word count, content hash.
//!
//! Every step is total. Unrecognized content shapes produce empty text and
//! malformed markup is stripped on a best-effort basis; nothing here returns
//! an error.
//!
//! # Token pipeline
//!
//! 1. Lowercase.
//! 2. Decode the fixed HTML entity set (`&amp; &lt; &gt; &quot; &#39; &nbsp;`).
//! 3. Strip `http(s)://` runs, email addresses, and standalone integers.
//! 4. Replace everything outside `[a-z\s]` with a space.
//! 5. Split on whitespace.
//! 6. Keep tokens of 3–50 characters that contain a letter and are not
//!    stopwords.
//!
//! Token order is preserved.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::models::{Content, Document, ProcessedContent};
use crate::stopwords::STOPWORDS;

const MIN_TOKEN_LEN: usize = 3;
const MAX_TOKEN_LEN: usize = 50;

static SCRIPT_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>").unwrap()
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}").unwrap());
static INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d+\b").unwrap());
static NON_ALPHA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z\s]+").unwrap());

/// Turns documents into reproducible token sequences and change hashes.
#[derive(Debug, Clone)]
pub struct ContentProcessor {
    stopwords: HashSet<&'static str>,
    url_prefix: String,
}

impl Default for ContentProcessor {
    fn default() -> Self {
        Self::new("/")
    }
}

impl ContentProcessor {
    /// Create a processor that builds document urls as `{url_prefix}{slug}`.
    pub fn new(url_prefix: &str) -> Self {
        Self {
            stopwords: STOPWORDS.iter().copied().collect(),
            url_prefix: url_prefix.to_string(),
        }
    }

    /// Public url of a document.
    pub fn document_url(&self, document: &Document) -> String {
        format!(
            "{}{}",
            self.url_prefix,
            document.slug.trim_start_matches('/')
        )
    }

    /// Process one document.
    ///
    /// The indexed text is the title twice (up-weighting by duplication),
    /// then the meta description when present, then the body text.
    pub fn process_page_content(&self, document: &Document) -> ProcessedContent {
        let mut parts: Vec<&str> = vec![document.title.as_str(), document.title.as_str()];
        if let Some(description) = document.meta_description.as_deref() {
            parts.push(description);
        }
        let body = extract_body_text(&document.content);
        parts.push(&body);
        let full_text = parts.join(" ");

        let tokens = self.preprocess_text(&full_text);
        ProcessedContent {
            url: self.document_url(document),
            document_id: document.id.clone(),
            title: document.title.clone(),
            word_count: tokens.len(),
            content_hash: calculate_content_hash(&full_text),
            tokens,
        }
    }

    /// Normalize free text into an ordered token sequence.
    pub fn preprocess_text(&self, text: &str) -> Vec<String> {
        let text = decode_entities(&text.to_lowercase());
        let text = URL.replace_all(&text, " ");
        let text = EMAIL.replace_all(&text, " ");
        let text = INTEGER.replace_all(&text, " ");
        let text = NON_ALPHA.replace_all(&text, " ");

        text.split_whitespace()
            .filter(|token| {
                let len = token.chars().count();
                (MIN_TOKEN_LEN..=MAX_TOKEN_LEN).contains(&len)
                    && token.chars().any(|c| c.is_alphabetic())
                    && !self.stopwords.contains(token)
            })
            .map(str::to_string)
            .collect()
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }
}

/// Plain text of a document body.
pub fn extract_body_text(content: &Content) -> String {
    match content {
        Content::Html(html) => strip_html(html),
        Content::Structured(value) => {
            let mut leaves = Vec::new();
            collect_string_leaves(value, &mut leaves);
            leaves.join(" ")
        }
        Content::Empty => String::new(),
    }
}

/// Remove `<script>`/`<style>` blocks and all tags, then decode entities.
pub fn strip_html(html: &str) -> String {
    let text = SCRIPT_STYLE.replace_all(html, " ");
    let text = TAG.replace_all(&text, " ");
    decode_entities(&text)
}

fn collect_string_leaves<'a>(value: &'a serde_json::Value, out: &mut Vec<&'a str>) {
    match value {
        serde_json::Value::String(s) => out.push(s),
        serde_json::Value::Array(items) => {
            for item in items {
                collect_string_leaves(item, out);
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values() {
                collect_string_leaves(item, out);
            }
        }
        _ => {}
    }
}

/// Decode the fixed entity set, `&amp;` first, so `&amp;lt;` ends up as `<`.
pub fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

/// Stable change-detection hash of a text.
///
/// The text is lowercased and whitespace-collapsed, then fed through a
/// 32-bit `h * 31 + c` rolling hash over UTF-16 code units. The absolute
/// value is hex-encoded. Not collision resistant.
pub fn calculate_content_hash(text: &str) -> String {
    let normalized = text
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let mut hash: i32 = 0;
    for unit in normalized.encode_utf16() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit));
    }
    format!("{:x}", i64::from(hash).abs())
}

/// Key used to upsert an indexed-content row: hex SHA-256 of the url.
pub fn url_hash(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}

/// Distinct terms with their raw counts, in first-encountered order.
pub fn term_counts(tokens: &[String]) -> Vec<(String, usize)> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<(String, usize)> = Vec::new();
    for token in tokens {
        match positions.get(token.as_str()) {
            Some(&i) => counts[i].1 += 1,
            None => {
                positions.insert(token, counts.len());
                counts.push((token.clone(), 1));
            }
        }
    }
    counts
}

/// Term frequencies normalized by the total token count, in
/// first-encountered order.
pub fn ordered_term_frequencies(tokens: &[String]) -> Vec<(String, f64)> {
    let total = tokens.len() as f64;
    term_counts(tokens)
        .into_iter()
        .map(|(term, count)| (term, count as f64 / total))
        .collect()
}

/// Map of term → count / total tokens. Empty for an empty sequence.
pub fn calculate_term_frequencies(tokens: &[String]) -> HashMap<String, f64> {
    ordered_term_frequencies(tokens).into_iter().collect()
}

/// The `limit` most frequent terms, ties kept in first-encountered order.
pub fn get_top_terms(tokens: &[String], limit: usize) -> Vec<(String, f64)> {
    let mut frequencies = ordered_term_frequencies(tokens);
    frequencies.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    frequencies.truncate(limit);
    frequencies
}
