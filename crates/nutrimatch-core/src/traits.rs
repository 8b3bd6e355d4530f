use std::future::Future;

use crate::types::{LexicalHit, VectorHit};

/// Text -> dense vector encoder. Must be deterministic for fixed weights.
pub trait Embedder: Send + Sync {
    /// Stable identifier of model and dimensionality, stored in the index manifest.
    fn embedder_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    /// One vector per input, in input order.
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Sparse term-overlap ranking over the tokenized corpus.
pub trait LexicalRanker: Send + Sync {
    /// Number of corpus documents.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One score per corpus document, indexed by position.
    fn scores(&self, query: &str) -> anyhow::Result<Vec<f32>>;

    /// The `k` best positions by descending score; ties keep corpus order.
    fn top_k(&self, query: &str, k: usize) -> anyhow::Result<Vec<LexicalHit>> {
        let scores = self.scores(query)?;
        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
        order.truncate(k);
        Ok(order.into_iter().map(|position| LexicalHit { position, score: scores[position] }).collect())
    }
}

/// Nearest-neighbour lookup over the Reference Index embeddings.
pub trait VectorSearch: Send + Sync {
    fn dim(&self) -> usize;

    /// At most `k` hits ordered by ascending distance; empty for an empty index.
    fn search_vec(&self, query: &[f32], k: usize) -> impl Future<Output = anyhow::Result<Vec<VectorHit>>> + Send;
}
