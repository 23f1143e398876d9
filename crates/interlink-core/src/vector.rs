//! Sparse TF-IDF vector math and the inverted index used by the
//! similarity pass.
//!
//! A sparse vector is a list of `(term_id, score)` pairs with unique term
//! ids. Order does not matter to any function here.

use std::collections::{BTreeMap, HashMap};

/// One sparse vector component.
pub type Component = (i64, f64);

/// Euclidean (L2) length of a vector.
pub fn vector_norm(vector: &[Component]) -> f64 {
    vector.iter().map(|(_, s)| s * s).sum::<f64>().sqrt()
}

/// Dot product over the intersection of nonzero term ids.
pub fn sparse_dot(a: &[Component], b: &[Component]) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let lookup: HashMap<i64, f64> = small.iter().copied().collect();
    large
        .iter()
        .filter_map(|(term, score)| lookup.get(term).map(|other| other * score))
        .sum()
}

/// Cosine similarity from a precomputed dot product, clamped to `[0, 1]`.
///
/// Zero (or negative) norms yield `0.0`.
pub fn cosine_from_dot(dot: f64, norm_a: f64, norm_b: f64) -> f64 {
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }
    let sim = dot / (norm_a * norm_b);
    if sim.is_nan() {
        0.0
    } else {
        sim.clamp(0.0, 1.0)
    }
}

/// Clamped cosine similarity of two sparse vectors.
pub fn cosine_similarity(a: &[Component], b: &[Component]) -> f64 {
    cosine_from_dot(sparse_dot(a, b), vector_norm(a), vector_norm(b))
}

#[derive(Debug, Clone, Copy)]
struct Posting {
    doc: usize,
    score: f64,
}

/// Term → postings map over a fixed, ordered set of document vectors.
///
/// Documents are addressed by their position in the slice passed to
/// [`build`](InvertedIndex::build). Postings lists are sorted by position.
#[derive(Debug, Default)]
pub struct InvertedIndex {
    postings: HashMap<i64, Vec<Posting>>,
}

impl InvertedIndex {
    /// Index every nonzero component of every vector.
    pub fn build<V: AsRef<[Component]>>(vectors: &[V]) -> Self {
        let mut postings: HashMap<i64, Vec<Posting>> = HashMap::new();
        for (doc, vector) in vectors.iter().enumerate() {
            for &(term, score) in vector.as_ref() {
                if score != 0.0 {
                    postings.entry(term).or_default().push(Posting { doc, score });
                }
            }
        }
        Self { postings }
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    /// Dot products between document `doc` and every later document that
    /// shares at least one nonzero term with it.
    ///
    /// `vector` must be the vector the index was built with at position
    /// `doc`. Only positions greater than `doc` are returned, so iterating
    /// `doc` over all positions visits each unordered pair once.
    pub fn dot_products_after(&self, doc: usize, vector: &[Component]) -> BTreeMap<usize, f64> {
        let mut dots: BTreeMap<usize, f64> = BTreeMap::new();
        for &(term, score) in vector {
            if score == 0.0 {
                continue;
            }
            let Some(list) = self.postings.get(&term) else {
                continue;
            };
            let start = list.partition_point(|p| p.doc <= doc);
            for posting in &list[start..] {
                *dots.entry(posting.doc).or_insert(0.0) += score * posting.score;
            }
        }
        dots
    }
}
