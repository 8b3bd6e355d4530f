//! Hybrid food-name retrieval.
//!
//! `HybridRetriever` runs BM25 over the tokenized corpus and nearest-neighbour
//! search over the Reference Index concurrently, then merges both candidate
//! lists into `(id, name, calories)` results. Batches of queries share one
//! encoder call.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use futures::future::try_join_all;
use tokio::task::JoinError;

use nutrimatch_core::config::{MergeStrategy, RetrievalSettings, VectorBackend};
use nutrimatch_core::traits::{Embedder, LexicalRanker, VectorSearch};
use nutrimatch_core::types::{FoodCatalog, LexicalHit, QueryResult, VectorHit};
use nutrimatch_core::{Error, Result};
use nutrimatch_text::{Bm25Ranker, TokenizedCorpus};
use nutrimatch_vector::table::open_table;
use nutrimatch_vector::{read_reference_rows, FlatVectorIndex, IndexManifest, LanceVectorSearch};

pub mod build;
pub mod dish;
pub mod fusion;

pub use build::{build_reference_index, BuildOptions};
pub use dish::{estimate_dish, match_dish, DishEstimate, Ingredient, IngredientMatch, Selection};

use fusion::{union_candidates, weighted_fusion};

pub struct HybridRetriever<L, V> {
    lexical: Arc<L>,
    vector: V,
    embedder: Arc<dyn Embedder>,
    catalog: Arc<FoodCatalog>,
    settings: RetrievalSettings,
}

fn join_failed(what: &str, err: JoinError) -> Error {
    Error::Operation(format!("{what} task failed: {err}"))
}

impl<L, V> HybridRetriever<L, V>
where
    L: LexicalRanker + 'static,
    V: VectorSearch,
{
    /// Assemble a retriever from already-loaded parts. The ranker must cover
    /// exactly the catalog and the vector index must match the encoder.
    pub fn new(
        lexical: L,
        vector: V,
        embedder: Arc<dyn Embedder>,
        catalog: Arc<FoodCatalog>,
        settings: RetrievalSettings,
    ) -> Result<Self> {
        if lexical.len() != catalog.len() {
            return Err(Error::IndexUnavailable(format!(
                "lexical ranker covers {} documents but the catalog has {} entries",
                lexical.len(),
                catalog.len()
            )));
        }
        if vector.dim() != embedder.dim() {
            return Err(Error::IndexUnavailable(format!(
                "vector index is {}-dimensional but encoder '{}' produces {}",
                vector.dim(),
                embedder.embedder_id(),
                embedder.dim()
            )));
        }
        Ok(Self { lexical: Arc::new(lexical), vector, embedder, catalog, settings })
    }

    pub fn catalog(&self) -> &FoodCatalog {
        &self.catalog
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    /// Candidates for one query: the lexical top `top_k` and the vector top
    /// `top_k`, deduplicated. At most `2 * top_k` results, never more than
    /// the catalog holds.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<QueryResult>> {
        validate(top_k, std::iter::once(query))?;
        let embedding = self
            .encode(vec![query.to_string()])
            .await?
            .pop()
            .ok_or_else(|| Error::EncoderFailure("encoder returned no vector".into()))?;
        self.retrieve_encoded(query, embedding, top_k).await
    }

    /// Same as `retrieve` with a caller-computed query embedding.
    pub async fn retrieve_with_embedding(&self, query: &str, embedding: Vec<f32>, top_k: usize) -> Result<Vec<QueryResult>> {
        validate(top_k, std::iter::once(query))?;
        if embedding.len() != self.vector.dim() {
            return Err(Error::InvalidArgument(format!(
                "embedding has dimension {}, index expects {}",
                embedding.len(),
                self.vector.dim()
            )));
        }
        self.retrieve_encoded(query, embedding, top_k).await
    }

    /// One result list per query, in input order. All queries are encoded
    /// with a single encoder call.
    pub async fn retrieve_batch(&self, queries: &[String], top_k: usize) -> Result<Vec<Vec<QueryResult>>> {
        validate(top_k, queries.iter().map(String::as_str))?;
        if queries.is_empty() {
            return Ok(Vec::new());
        }
        let embeddings = self.encode(queries.to_vec()).await?;
        try_join_all(
            queries
                .iter()
                .zip(embeddings)
                .map(|(query, embedding)| self.retrieve_encoded(query, embedding, top_k)),
        )
        .await
    }

    /// Runs the encoder off the async runtime. On timeout the call is
    /// abandoned; the blocking thread finishes in the background.
    async fn encode(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let expected = texts.len();
        let started = Instant::now();
        let embedder = Arc::clone(&self.embedder);
        let task = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts));
        let joined = match self.settings.encoder_timeout() {
            Some(after) => tokio::time::timeout(after, task)
                .await
                .map_err(|_| Error::Timeout { operation: "query encoding", after })?,
            None => task.await,
        };
        let vectors = joined.map_err(|e| join_failed("encoder", e))?.map_err(|e| Error::encoder(&e))?;

        if vectors.len() != expected {
            return Err(Error::EncoderFailure(format!(
                "encoder returned {} vectors for {} queries",
                vectors.len(),
                expected
            )));
        }
        if let Some(v) = vectors.iter().find(|v| v.len() != self.vector.dim()) {
            return Err(Error::InvalidArgument(format!(
                "encoder produced a {}-dimensional vector, index expects {}",
                v.len(),
                self.vector.dim()
            )));
        }
        tracing::debug!(queries = expected, elapsed_ms = started.elapsed().as_millis() as u64, "queries encoded");
        Ok(vectors)
    }

    async fn lexical_top_k(&self, query: &str, top_k: usize) -> Result<Vec<LexicalHit>> {
        let lexical = Arc::clone(&self.lexical);
        let query = query.to_string();
        tokio::task::spawn_blocking(move || lexical.top_k(&query, top_k))
            .await
            .map_err(|e| join_failed("lexical ranking", e))?
            .map_err(|e| Error::operation(&e))
    }

    async fn vector_top_k(&self, embedding: &[f32], top_k: usize) -> Result<Vec<VectorHit>> {
        let search = self.vector.search_vec(embedding, top_k);
        let hits = match self.settings.search_timeout() {
            Some(after) => tokio::time::timeout(after, search)
                .await
                .map_err(|_| Error::Timeout { operation: "vector search", after })?,
            None => search.await,
        };
        hits.map_err(|e| Error::operation(&e))
    }

    async fn retrieve_encoded(&self, query: &str, embedding: Vec<f32>, top_k: usize) -> Result<Vec<QueryResult>> {
        let (lexical_hits, vector_hits) =
            tokio::try_join!(self.lexical_top_k(query, top_k), self.vector_top_k(&embedding, top_k))?;

        let mut candidates = union_candidates(&self.catalog, &lexical_hits, &vector_hits)?;
        if let MergeStrategy::WeightedFusion { lexical_weight } = self.settings.merge {
            candidates = weighted_fusion(candidates, lexical_weight);
        }
        tracing::debug!(
            query,
            lexical = lexical_hits.len(),
            vector = vector_hits.len(),
            merged = candidates.len(),
            "hybrid candidates"
        );

        candidates
            .iter()
            .map(|c| {
                self.catalog
                    .entries()
                    .get(c.position)
                    .map(|entry| QueryResult::from_entry(entry, c.matched_by))
                    .ok_or_else(|| Error::IndexUnavailable(format!("no catalog entry at position {}", c.position)))
            })
            .collect()
    }
}

fn validate<'a>(top_k: usize, queries: impl IntoIterator<Item = &'a str>) -> Result<()> {
    if top_k == 0 {
        return Err(Error::InvalidArgument("top_k must be at least 1".into()));
    }
    for (i, query) in queries.into_iter().enumerate() {
        if query.trim().is_empty() {
            return Err(Error::InvalidArgument(format!("query {i} is empty")));
        }
    }
    Ok(())
}

/// The vector backend chosen by `retrieval.vector_backend`.
pub enum ReferenceVectors {
    Lance(LanceVectorSearch),
    Flat(FlatVectorIndex),
}

impl VectorSearch for ReferenceVectors {
    fn dim(&self) -> usize {
        match self {
            Self::Lance(v) => v.dim(),
            Self::Flat(v) => v.dim(),
        }
    }

    async fn search_vec(&self, query: &[f32], k: usize) -> anyhow::Result<Vec<VectorHit>> {
        match self {
            Self::Lance(v) => v.search_vec(query, k).await,
            Self::Flat(v) => v.search_vec(query, k).await,
        }
    }
}

pub type IndexedRetriever = HybridRetriever<Bm25Ranker, ReferenceVectors>;

impl HybridRetriever<Bm25Ranker, ReferenceVectors> {
    /// Load an index directory written by `build_reference_index`.
    ///
    /// Fails with `IndexUnavailable` when an artifact is missing, when the
    /// live encoder is not the one recorded in the manifest, or when the
    /// corpus no longer matches the stored catalog.
    pub async fn open(dir: &Path, embedder: Arc<dyn Embedder>, settings: RetrievalSettings) -> Result<Self> {
        let started = Instant::now();
        let manifest = IndexManifest::load(dir)?;
        manifest.ensure_compatible(embedder.embedder_id(), embedder.dim())?;

        let corpus = TokenizedCorpus::load(dir).map_err(|e| Error::unavailable(&e))?;
        if corpus.len() != manifest.entry_count {
            return Err(Error::IndexUnavailable(format!(
                "tokenized corpus has {} documents, manifest records {}",
                corpus.len(),
                manifest.entry_count
            )));
        }
        if corpus.fingerprint() != manifest.corpus_fingerprint {
            return Err(Error::IndexUnavailable("tokenized corpus does not match the manifest fingerprint".into()));
        }

        let table = open_table(dir, &manifest.table_name).await.map_err(|e| Error::unavailable(&e))?;
        let rows = read_reference_rows(&table).await.map_err(|e| Error::unavailable(&e))?;
        if rows.len() != manifest.entry_count {
            return Err(Error::IndexUnavailable(format!(
                "reference table has {} rows, manifest records {}",
                rows.len(),
                manifest.entry_count
            )));
        }
        let (entries, vectors): (Vec<_>, Vec<_>) = rows.into_iter().map(|r| (r.entry, r.vector)).unzip();
        let catalog = FoodCatalog::from_entries(entries).map_err(|e| Error::IndexUnavailable(e.to_string()))?;
        if TokenizedCorpus::from_names(catalog.entries().iter().map(|e| e.name_en.as_str())) != corpus {
            return Err(Error::IndexUnavailable("tokenized corpus is not aligned with the reference table".into()));
        }

        let lexical = Bm25Ranker::build(&corpus).map_err(|e| Error::operation(&e))?;
        let vector = match settings.vector_backend {
            VectorBackend::Lance => ReferenceVectors::Lance(
                LanceVectorSearch::open(dir, &manifest.table_name, manifest.dim)
                    .await
                    .map_err(|e| Error::unavailable(&e))?,
            ),
            VectorBackend::Flat => {
                let ids = catalog.entries().iter().map(|e| e.id.clone()).collect();
                ReferenceVectors::Flat(FlatVectorIndex::new(manifest.dim, ids, vectors).map_err(|e| Error::unavailable(&e))?)
            }
        };

        tracing::info!(
            dir = %dir.display(),
            entries = catalog.len(),
            embedder = embedder.embedder_id(),
            backend = ?settings.vector_backend,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reference index opened"
        );
        Self::new(lexical, vector, embedder, Arc::new(catalog), settings)
    }
}
