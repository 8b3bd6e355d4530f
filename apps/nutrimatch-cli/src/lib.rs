//! Shared plumbing for the nutrimatch binaries.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail};

use nutrimatch_core::config::{expand_path, Config, Settings};
use nutrimatch_core::traits::LexicalRanker;
use nutrimatch_core::types::{FoodEntry, QueryResult};
use nutrimatch_text::{Bm25Ranker, TokenizedCorpus};
use nutrimatch_vector::table::open_table;
use nutrimatch_vector::{read_reference_rows, IndexManifest, ReferenceRow};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logs go to stderr so stdout stays machine-readable. `RUST_LOG` wins over `-v`.
pub fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

pub fn load_settings() -> anyhow::Result<Settings> {
    Ok(Config::load()?.settings()?)
}

pub fn index_dir(flag: Option<PathBuf>, settings: &Settings) -> PathBuf {
    flag.unwrap_or_else(|| expand_path(&settings.data.index_dir))
}

pub fn print_results(query: &str, results: &[QueryResult], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "query": query, "results": results }))?);
        return Ok(());
    }
    println!("{query:?}: {} candidates", results.len());
    for (i, r) in results.iter().enumerate() {
        println!("  {:>2}. {:<8} {:<48} {:>16}  [{:?}]", i + 1, r.id, r.name_en, r.calories_per_100g.to_string(), r.matched_by);
    }
    Ok(())
}

/// BM25 over a built index, without loading an encoder.
pub struct LexicalIndex {
    ranker: Bm25Ranker,
    rows: Vec<ReferenceRow>,
}

impl LexicalIndex {
    /// Refuses a corpus that no longer matches the manifest or the table.
    pub async fn open(dir: &Path) -> anyhow::Result<Self> {
        let manifest = IndexManifest::load(dir)?;
        let corpus = TokenizedCorpus::load(dir)?;
        if corpus.fingerprint() != manifest.corpus_fingerprint {
            bail!("tokenized corpus in {} does not match its manifest; rebuild the index", dir.display());
        }
        let rows = read_reference_rows(&open_table(dir, &manifest.table_name).await?).await?;
        if rows.len() != corpus.len() {
            bail!("reference table has {} rows but the corpus has {} documents", rows.len(), corpus.len());
        }
        let ranker = Bm25Ranker::build(&corpus)?;
        Ok(Self { ranker, rows })
    }

    pub fn search(&self, query: &str, k: usize) -> anyhow::Result<Vec<(f32, &FoodEntry)>> {
        self.ranker
            .top_k(query, k)?
            .into_iter()
            .map(|hit| {
                self.rows
                    .get(hit.position)
                    .map(|row| (hit.score, &row.entry))
                    .ok_or_else(|| anyhow!("no reference row at position {}", hit.position))
            })
            .collect()
    }
}
