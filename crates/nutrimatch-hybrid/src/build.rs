//! Offline construction of an index directory:
//! `lance/<table>`, `tokenized_corpus.json` and `manifest.json`.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};

use nutrimatch_core::traits::Embedder;
use nutrimatch_core::types::{FoodCatalog, FoodEntry};
use nutrimatch_core::{Error, Result};
use nutrimatch_text::corpus::CORPUS_FILE;
use nutrimatch_text::TokenizedCorpus;
use nutrimatch_vector::table::lance_dir;
use nutrimatch_vector::{IndexManifest, ReferenceIndexWriter, MANIFEST_FILE};

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub table_name: String,
    /// Texts per encoder call.
    pub batch_size: usize,
}

impl BuildOptions {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self { table_name: table_name.into(), batch_size: 64 }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// Encode every `name_en`, write the reference table, the tokenized corpus
/// and the manifest into `dir`, replacing any previous index there.
pub async fn build_reference_index(
    entries: Vec<FoodEntry>,
    embedder: Arc<dyn Embedder>,
    dir: &Path,
    options: &BuildOptions,
) -> Result<IndexManifest> {
    let catalog = FoodCatalog::from_entries(entries)?;
    tracing::info!(
        entries = catalog.len(),
        embedder = embedder.embedder_id(),
        dir = %dir.display(),
        "building reference index"
    );

    clear_previous_index(dir)?;
    let embeddings = encode_names(&catalog, Arc::clone(&embedder), options.batch_size.max(1)).await?;

    let writer = ReferenceIndexWriter::new(dir, &options.table_name, embedder.dim())
        .await
        .map_err(|e| Error::operation(&e))?;
    writer.write(&catalog, &embeddings).await.map_err(|e| Error::operation(&e))?;

    let corpus = TokenizedCorpus::from_names(catalog.entries().iter().map(|e| e.name_en.as_str()));
    corpus.save(dir).map_err(|e| Error::operation(&e))?;

    let manifest = IndexManifest::new(
        embedder.embedder_id(),
        embedder.dim(),
        catalog.len(),
        &options.table_name,
        corpus.fingerprint(),
    );
    manifest.save(dir)?;
    tracing::info!(entries = catalog.len(), dim = manifest.dim, "reference index built");
    Ok(manifest)
}

fn clear_previous_index(dir: &Path) -> Result<()> {
    let io = |e: std::io::Error| Error::Operation(format!("preparing {}: {e}", dir.display()));
    fs::create_dir_all(dir).map_err(io)?;
    // The manifest goes first so a half-cleared directory never opens.
    for file in [MANIFEST_FILE, CORPUS_FILE] {
        let path = dir.join(file);
        if path.exists() {
            fs::remove_file(&path).map_err(io)?;
        }
    }
    let lance = lance_dir(dir);
    if lance.exists() {
        tracing::info!(path = %lance.display(), "removing previous reference table");
        fs::remove_dir_all(&lance).map_err(io)?;
    }
    Ok(())
}

async fn encode_names(catalog: &FoodCatalog, embedder: Arc<dyn Embedder>, batch_size: usize) -> Result<Vec<Vec<f32>>> {
    let names = catalog.names_en();
    let pb = ProgressBar::new(names.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} names encoded ({percent}%)")
    {
        pb.set_style(style.progress_chars("#>-"));
    }

    let mut out = Vec::with_capacity(names.len());
    for chunk in names.chunks(batch_size) {
        let chunk = chunk.to_vec();
        let expected = chunk.len();
        let embedder = Arc::clone(&embedder);
        let vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&chunk))
            .await
            .map_err(|e| Error::Operation(format!("encoder task failed: {e}")))?
            .map_err(|e| Error::encoder(&e))?;
        if vectors.len() != expected {
            return Err(Error::EncoderFailure(format!("encoder returned {} vectors for {} names", vectors.len(), expected)));
        }
        out.extend(vectors);
        pb.inc(expected as u64);
    }
    pb.finish_and_clear();
    Ok(out)
}
