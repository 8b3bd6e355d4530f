use anyhow::{ensure, Result};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use nutrimatch_core::traits::Embedder;

/// LRU memoization of text -> embedding in front of another encoder.
///
/// A batch forwards only its distinct misses, in one call, to the inner encoder.
pub struct CachingEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl CachingEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, capacity: NonZeroUsize) -> Self {
        Self { inner, cache: Mutex::new(LruCache::new(capacity)) }
    }

    /// Wrap `inner` unless `capacity` is 0, which disables caching.
    pub fn wrap(inner: Arc<dyn Embedder>, capacity: usize) -> Arc<dyn Embedder> {
        match NonZeroUsize::new(capacity) {
            Some(capacity) => Arc::new(Self::new(inner, capacity)),
            None => inner,
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }
}

impl Embedder for CachingEmbedder {
    fn embedder_id(&self) -> &str {
        self.inner.embedder_id()
    }
    fn dim(&self) -> usize {
        self.inner.dim()
    }
    fn max_len(&self) -> usize {
        self.inner.max_len()
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut misses: Vec<String> = Vec::new();
        {
            let mut cache = self.cache.lock();
            for text in texts {
                let hit = cache.get(text).cloned();
                if hit.is_none() && !misses.contains(text) {
                    misses.push(text.clone());
                }
                out.push(hit);
            }
        }
        tracing::debug!(hits = texts.len() - out.iter().filter(|v| v.is_none()).count(), misses = misses.len(), "embedding cache");
        if misses.is_empty() {
            return Ok(out.into_iter().flatten().collect());
        }

        let computed = self.inner.embed_batch(&misses)?;
        ensure!(
            computed.len() == misses.len(),
            "encoder returned {} vectors for {} texts",
            computed.len(),
            misses.len()
        );
        let fresh: HashMap<String, Vec<f32>> = misses.into_iter().zip(computed).collect();
        {
            let mut cache = self.cache.lock();
            for (text, vector) in &fresh {
                cache.put(text.clone(), vector.clone());
            }
        }
        Ok(texts
            .iter()
            .zip(out)
            .map(|(text, hit)| hit.or_else(|| fresh.get(text).cloned()).unwrap_or_default())
            .collect())
    }
}
