use anyhow::Result;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use nutrimatch_core::tokenize;
use nutrimatch_core::traits::Embedder;

const TRIGRAM_WEIGHT: f32 = 0.35;

/// Deterministic feature-hashing encoder: whole tokens plus character
/// trigrams hashed into `dim` buckets, then L2-normalized.
///
/// Used by tests and offline builds without model weights. Texts sharing
/// tokens land close in cosine space, which is enough to exercise retrieval.
pub struct HashEmbedder {
    dim: usize,
    id: String,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self { dim, id: format!("fake-hash:d{dim}") }
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let mut hasher = XxHash64::with_seed(0);
        feature.hash(&mut hasher);
        let h = hasher.finish();
        let idx = (h as usize) % self.dim;
        let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
        (idx, sign * (0.5 + ((h >> 32) as u32) as f32 / (u32::MAX as f32)))
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let mut tokens = tokenize(text);
        if tokens.is_empty() && !text.trim().is_empty() {
            tokens.push(text.trim().to_lowercase());
        }
        for token in &tokens {
            let (idx, val) = self.bucket(token);
            v[idx] += val;
            let chars: Vec<char> = format!("^{token}$").chars().collect();
            for gram in chars.windows(3) {
                let gram: String = gram.iter().collect();
                let (idx, val) = self.bucket(&gram);
                v[idx] += TRIGRAM_WEIGHT * val;
            }
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm <= 1e-6 {
            // Blank text still maps to a unit vector.
            v[0] = 1.0;
            return v;
        }
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

impl Embedder for HashEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }
    fn dim(&self) -> usize {
        self.dim
    }
    fn max_len(&self) -> usize {
        usize::MAX
    }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
