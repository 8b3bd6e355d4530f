use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nutrimatch_core::config::{MergeStrategy, RetrievalSettings, VectorBackend};
use nutrimatch_core::dataset::DatasetReader;
use nutrimatch_core::traits::{Embedder, LexicalRanker, VectorSearch};
use nutrimatch_core::types::{Calories, FoodCatalog, FoodEntry, MatchSource, VectorHit};
use nutrimatch_core::Error;
use nutrimatch_embed::HashEmbedder;
use nutrimatch_hybrid::{build_reference_index, BuildOptions, HybridRetriever, IndexedRetriever};
use nutrimatch_text::{Bm25Ranker, TokenizedCorpus};
use nutrimatch_vector::FlatVectorIndex;
use tempfile::TempDir;

const DIM: usize = 64;
const TABLE: &str = "food_embeddings";

const CIQUAL_CSV: &str = "\
alim_grp_code,alim_code,alim_nom_fr,alim_nom_en,Energie (kcal/100 g)
06,20087,\"Champignon, cru\",\"Mushroom, raw\",\"22,0\"
06,20091,\"Champignon de Paris, cuit\",\"Mushroom, button, cooked\",\"28,0\"
04,36018,\"Blanc de poulet, grillé\",\"Chicken breast, grilled\",165
04,36005,\"Poulet, entier, rôti\",\"Chicken, whole, roasted\",239
03,9102,\"Riz blanc, cuit\",\"Rice, white, cooked\",146
03,9103,\"Riz complet, cuit\",\"Rice, brown, cooked\",123
11,11058,\"Sel de table\",\"Salt, table\",-
02,13005,\"Pomme, crue\",\"Apple, raw\",52
05,19024,\"Lait demi-écrémé, UHT\",\"Milk, semi-skimmed, UHT\",46
03,7110,\"Pain blanc\",\"Bread, white\",265
";

fn entries(tmp: &TempDir) -> Vec<FoodEntry> {
    let csv = tmp.path().join("ciqual.csv");
    std::fs::write(&csv, CIQUAL_CSV).expect("write csv");
    DatasetReader::default().read(&csv).expect("read csv")
}

/// Delegates to the hashing encoder and counts calls.
struct CountingEmbedder {
    inner: HashEmbedder,
    calls: AtomicUsize,
}

impl CountingEmbedder {
    fn new() -> Self {
        Self { inner: HashEmbedder::new(DIM), calls: AtomicUsize::new(0) }
    }
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for CountingEmbedder {
    fn embedder_id(&self) -> &str { self.inner.embedder_id() }
    fn dim(&self) -> usize { self.inner.dim() }
    fn max_len(&self) -> usize { self.inner.max_len() }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed_batch(texts)
    }
}

struct SlowEmbedder(HashEmbedder);

impl Embedder for SlowEmbedder {
    fn embedder_id(&self) -> &str { self.0.embedder_id() }
    fn dim(&self) -> usize { self.0.dim() }
    fn max_len(&self) -> usize { self.0.max_len() }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        std::thread::sleep(Duration::from_millis(400));
        self.0.embed_batch(texts)
    }
}

struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn embedder_id(&self) -> &str { "fake-hash:d64" }
    fn dim(&self) -> usize { DIM }
    fn max_len(&self) -> usize { 128 }
    fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        anyhow::bail!("model exploded")
    }
}

async fn build_index(tmp: &TempDir) -> FoodCatalog {
    let entries = entries(tmp);
    let catalog = FoodCatalog::from_entries(entries.clone()).expect("catalog");
    build_reference_index(entries, Arc::new(HashEmbedder::new(DIM)), &index_dir(tmp), &BuildOptions::new(TABLE).with_batch_size(3))
        .await
        .expect("build");
    catalog
}

fn index_dir(tmp: &TempDir) -> std::path::PathBuf {
    tmp.path().join("index")
}

fn settings(backend: VectorBackend) -> RetrievalSettings {
    RetrievalSettings { vector_backend: backend, ..RetrievalSettings::default() }
}

async fn open(dir: &Path, embedder: Arc<dyn Embedder>, settings: RetrievalSettings) -> IndexedRetriever {
    HybridRetriever::open(dir, embedder, settings).await.expect("open")
}

fn ids(results: &[nutrimatch_core::types::QueryResult]) -> Vec<String> {
    results.iter().map(|r| r.id.clone()).collect()
}

#[tokio::test]
async fn mushroom_query_finds_the_raw_mushroom() {
    let tmp = TempDir::new().unwrap();
    build_index(&tmp).await;
    let retriever = open(&index_dir(&tmp), Arc::new(HashEmbedder::new(DIM)), settings(VectorBackend::Lance)).await;

    let results = retriever.retrieve("mushroom", 3).await.expect("retrieve");
    let hit = results.iter().find(|r| r.id == "20087").expect("Mushroom, raw is returned");
    assert_eq!(hit.name_en, "Mushroom, raw");
    assert_eq!(hit.calories_per_100g, Calories::Known(22.0));
    assert_eq!(hit.as_tuple(), ("20087", "Mushroom, raw", Calories::Known(22.0)));
}

#[tokio::test]
async fn exact_name_round_trips_through_the_dataset() {
    let tmp = TempDir::new().unwrap();
    let catalog = build_index(&tmp).await;
    for backend in [VectorBackend::Lance, VectorBackend::Flat] {
        let retriever = open(&index_dir(&tmp), Arc::new(HashEmbedder::new(DIM)), settings(backend)).await;
        for entry in catalog.entries() {
            let results = retriever.retrieve(&entry.name_en, 2).await.expect("retrieve");
            assert_eq!(results[0].id, entry.id, "exact name {:?} ranks first", entry.name_en);
            assert!(matches!(results[0].matched_by, MatchSource::Lexical | MatchSource::Both));
        }
    }
}

#[tokio::test]
async fn results_are_bounded_deduplicated_and_idempotent() {
    let tmp = TempDir::new().unwrap();
    let catalog = build_index(&tmp).await;
    let retriever = open(&index_dir(&tmp), Arc::new(HashEmbedder::new(DIM)), settings(VectorBackend::Lance)).await;

    for top_k in [1, 3, 5] {
        let results = retriever.retrieve("white rice", top_k).await.expect("retrieve");
        assert!(results.len() <= 2 * top_k);
        let unique: HashSet<_> = ids(&results).into_iter().collect();
        assert_eq!(unique.len(), results.len(), "no id appears twice");
    }

    let big = retriever.retrieve("white rice", 1000).await.expect("retrieve");
    assert_eq!(big.len(), catalog.len(), "top_k beyond the corpus caps at the corpus size");

    let a = retriever.retrieve("chicken", 4).await.expect("retrieve");
    let b = retriever.retrieve("chicken", 4).await.expect("retrieve");
    assert_eq!(a, b);
}

#[tokio::test]
async fn union_contains_every_lexical_and_vector_hit() {
    let tmp = TempDir::new().unwrap();
    let entries = entries(&tmp);
    let catalog = FoodCatalog::from_entries(entries).unwrap();
    let embedder = HashEmbedder::new(DIM);
    let names = catalog.names_en();
    let vectors = embedder.embed_batch(&names).unwrap();
    let ids_by_position: Vec<String> = catalog.entries().iter().map(|e| e.id.clone()).collect();

    let lexical = Bm25Ranker::build(&TokenizedCorpus::from_names(&names)).unwrap();
    let flat = FlatVectorIndex::new(DIM, ids_by_position.clone(), vectors.clone()).unwrap();
    let query = "cooked brown rice";
    let top_k = 3;
    let expected_lexical: Vec<String> =
        lexical.top_k(query, top_k).unwrap().iter().map(|h| ids_by_position[h.position].clone()).collect();
    let query_vector = embedder.embed_text(query);
    let expected_vector: Vec<String> = flat.search(&query_vector, top_k).unwrap().into_iter().map(|h| h.id).collect();

    let retriever = HybridRetriever::new(
        Bm25Ranker::build(&TokenizedCorpus::from_names(&names)).unwrap(),
        FlatVectorIndex::new(DIM, ids_by_position, vectors).unwrap(),
        Arc::new(HashEmbedder::new(DIM)),
        Arc::new(catalog),
        RetrievalSettings::default(),
    )
    .unwrap();
    let results = retriever.retrieve(query, top_k).await.unwrap();
    let got = ids(&results);

    for id in expected_lexical.iter().chain(&expected_vector) {
        assert!(got.contains(id), "{id} missing from {got:?}");
    }
    let unique: HashSet<_> = expected_lexical.iter().chain(&expected_vector).collect();
    assert_eq!(got.len(), unique.len());
    assert_eq!(&got[..expected_lexical.len()], &expected_lexical[..], "lexical hits come first, in rank order");
    for r in &results {
        let in_lex = expected_lexical.contains(&r.id);
        let in_vec = expected_vector.contains(&r.id);
        let expected = match (in_lex, in_vec) {
            (true, true) => MatchSource::Both,
            (true, false) => MatchSource::Lexical,
            _ => MatchSource::Vector,
        };
        assert_eq!(r.matched_by, expected, "{}", r.id);
    }
}

#[tokio::test]
async fn batch_encodes_once_and_matches_single_queries() {
    let tmp = TempDir::new().unwrap();
    build_index(&tmp).await;
    let counting = Arc::new(CountingEmbedder::new());
    let retriever = open(&index_dir(&tmp), counting.clone(), settings(VectorBackend::Flat)).await;

    let queries = vec!["chicken breast".to_string(), "white rice".to_string()];
    let batch = retriever.retrieve_batch(&queries, 3).await.expect("batch");
    assert_eq!(counting.calls(), 1, "one encoder call for the whole dish");
    assert_eq!(batch.len(), 2);

    for (query, results) in queries.iter().zip(&batch) {
        let single = retriever.retrieve(query, 3).await.expect("single");
        assert_eq!(&single, results);
    }
    assert_eq!(counting.calls(), 3);

    let empty = retriever.retrieve_batch(&[], 3).await.expect("empty batch");
    assert!(empty.is_empty());
    assert_eq!(counting.calls(), 3, "an empty batch never reaches the encoder");
}

#[tokio::test]
async fn invalid_arguments_are_rejected() {
    let tmp = TempDir::new().unwrap();
    build_index(&tmp).await;
    let retriever = open(&index_dir(&tmp), Arc::new(HashEmbedder::new(DIM)), settings(VectorBackend::Flat)).await;

    assert!(matches!(retriever.retrieve("rice", 0).await, Err(Error::InvalidArgument(_))));
    assert!(matches!(retriever.retrieve("", 3).await, Err(Error::InvalidArgument(_))));
    assert!(matches!(retriever.retrieve("   ", 3).await, Err(Error::InvalidArgument(_))));
    assert!(matches!(
        retriever.retrieve_batch(&["rice".to_string(), String::new()], 3).await,
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(retriever.retrieve_batch(&[], 0).await, Err(Error::InvalidArgument(_))));
    assert!(matches!(
        retriever.retrieve_with_embedding("rice", vec![0.1; DIM / 2], 3).await,
        Err(Error::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn punctuation_only_query_still_returns_candidates() {
    let tmp = TempDir::new().unwrap();
    build_index(&tmp).await;
    let retriever = open(&index_dir(&tmp), Arc::new(HashEmbedder::new(DIM)), settings(VectorBackend::Flat)).await;
    let results = retriever.retrieve(",;", 2).await.expect("degenerate query");
    assert!(!results.is_empty() && results.len() <= 4);
}

#[tokio::test]
async fn slow_encoder_times_out() {
    let tmp = TempDir::new().unwrap();
    build_index(&tmp).await;
    let settings = RetrievalSettings {
        encoder_timeout_ms: Some(50),
        vector_backend: VectorBackend::Flat,
        ..RetrievalSettings::default()
    };
    let retriever = open(&index_dir(&tmp), Arc::new(SlowEmbedder(HashEmbedder::new(DIM))), settings).await;
    match retriever.retrieve("rice", 3).await {
        Err(Error::Timeout { operation, after }) => {
            assert_eq!(operation, "query encoding");
            assert_eq!(after, Duration::from_millis(50));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

/// Sleeps before answering from an exact in-memory index.
struct SlowSearch(FlatVectorIndex);

impl VectorSearch for SlowSearch {
    fn dim(&self) -> usize {
        self.0.dim()
    }

    async fn search_vec(&self, query: &[f32], k: usize) -> anyhow::Result<Vec<VectorHit>> {
        tokio::time::sleep(Duration::from_millis(400)).await;
        self.0.search_vec(query, k).await
    }
}

#[tokio::test]
async fn slow_vector_search_times_out() {
    let tmp = TempDir::new().unwrap();
    let catalog = FoodCatalog::from_entries(entries(&tmp)).unwrap();
    let embedder = HashEmbedder::new(DIM);
    let names = catalog.names_en();
    let vectors = embedder.embed_batch(&names).unwrap();
    let ids_by_position = catalog.entries().iter().map(|e| e.id.clone()).collect();
    let settings = RetrievalSettings { search_timeout_ms: Some(50), ..RetrievalSettings::default() };
    let retriever = HybridRetriever::new(
        Bm25Ranker::build(&TokenizedCorpus::from_names(&names)).unwrap(),
        SlowSearch(FlatVectorIndex::new(DIM, ids_by_position, vectors).unwrap()),
        Arc::new(HashEmbedder::new(DIM)),
        Arc::new(catalog),
        settings,
    )
    .unwrap();

    match retriever.retrieve("mushroom", 3).await {
        Err(Error::Timeout { operation, after }) => {
            assert_eq!(operation, "vector search");
            assert_eq!(after, Duration::from_millis(50));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    let batch = retriever.retrieve_batch(&["rice".to_string(), "apple".to_string()], 3).await;
    assert!(matches!(batch, Err(Error::Timeout { operation: "vector search", .. })), "no partial batch comes back");
}

#[tokio::test]
async fn encoder_errors_are_propagated() {
    let tmp = TempDir::new().unwrap();
    build_index(&tmp).await;
    let retriever = open(&index_dir(&tmp), Arc::new(FailingEmbedder), settings(VectorBackend::Flat)).await;
    match retriever.retrieve("rice", 3).await {
        Err(Error::EncoderFailure(msg)) => assert!(msg.contains("model exploded")),
        other => panic!("expected encoder failure, got {other:?}"),
    }
}

#[tokio::test]
async fn mismatched_or_missing_index_is_unavailable() {
    let tmp = TempDir::new().unwrap();
    let dir = index_dir(&tmp);

    let missing = HybridRetriever::open(&dir, Arc::new(HashEmbedder::new(DIM)), RetrievalSettings::default()).await;
    assert!(matches!(missing, Err(Error::IndexUnavailable(_))));

    build_index(&tmp).await;
    let other_dim = HybridRetriever::open(&dir, Arc::new(HashEmbedder::new(DIM * 2)), RetrievalSettings::default()).await;
    assert!(matches!(other_dim, Err(Error::IndexUnavailable(_))));

    let corpus = TokenizedCorpus::from_names(["something", "else"]);
    corpus.save(&dir).unwrap();
    let tampered = HybridRetriever::open(&dir, Arc::new(HashEmbedder::new(DIM)), RetrievalSettings::default()).await;
    assert!(matches!(tampered, Err(Error::IndexUnavailable(_))));
}

#[tokio::test]
async fn rebuilding_replaces_the_previous_index() {
    let tmp = TempDir::new().unwrap();
    build_index(&tmp).await;
    let fewer = vec![FoodEntry::new("1", "Kiwi, raw", Calories::Known(61.0))];
    let manifest = build_reference_index(fewer, Arc::new(HashEmbedder::new(DIM)), &index_dir(&tmp), &BuildOptions::new(TABLE))
        .await
        .expect("rebuild");
    assert_eq!(manifest.entry_count, 1);

    let retriever = open(&index_dir(&tmp), Arc::new(HashEmbedder::new(DIM)), settings(VectorBackend::Lance)).await;
    let results = retriever.retrieve("mushroom", 5).await.expect("retrieve");
    assert_eq!(ids(&results), vec!["1".to_string()]);
}

#[tokio::test]
async fn duplicate_ids_fail_the_build() {
    let tmp = TempDir::new().unwrap();
    let dup = vec![
        FoodEntry::new("1", "Kiwi, raw", Calories::Known(61.0)),
        FoodEntry::new("1", "Kiwi, dried", Calories::Known(300.0)),
    ];
    let err = build_reference_index(dup, Arc::new(HashEmbedder::new(DIM)), &index_dir(&tmp), &BuildOptions::new(TABLE))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[tokio::test]
async fn weighted_fusion_reorders_the_same_candidates() {
    let tmp = TempDir::new().unwrap();
    build_index(&tmp).await;
    let dir = index_dir(&tmp);
    let union = open(&dir, Arc::new(HashEmbedder::new(DIM)), settings(VectorBackend::Flat)).await;
    let fused = open(
        &dir,
        Arc::new(HashEmbedder::new(DIM)),
        RetrievalSettings {
            merge: MergeStrategy::WeightedFusion { lexical_weight: 0.5 },
            vector_backend: VectorBackend::Flat,
            ..RetrievalSettings::default()
        },
    )
    .await;

    let a = union.retrieve("raw mushroom", 3).await.unwrap();
    let b = fused.retrieve("raw mushroom", 3).await.unwrap();
    let set_a: HashSet<_> = ids(&a).into_iter().collect();
    let set_b: HashSet<_> = ids(&b).into_iter().collect();
    assert_eq!(set_a, set_b);
    assert_eq!(b[0].id, "20087", "matching both ways puts the raw mushroom first");
}

#[tokio::test]
async fn parts_that_disagree_are_rejected() {
    let catalog = FoodCatalog::from_entries(vec![FoodEntry::new("1", "Kiwi", Calories::Unknown)]).unwrap();
    let lexical = Bm25Ranker::build(&TokenizedCorpus::from_names(["Kiwi", "Pear"])).unwrap();
    let flat = FlatVectorIndex::new(DIM, vec!["1".into()], vec![vec![0.0; DIM]]).unwrap();
    let err = HybridRetriever::new(lexical, flat, Arc::new(HashEmbedder::new(DIM)), Arc::new(catalog), RetrievalSettings::default())
        .err()
        .expect("length mismatch");
    assert!(matches!(err, Error::IndexUnavailable(_)));
}
