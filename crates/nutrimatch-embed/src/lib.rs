//! Sentence encoders for food names.
//!
//! `BertEmbedder` runs a BERT-family sentence-transformer (MiniLM by default)
//! with candle: mean pooling over unmasked tokens, then L2 normalization.
//! `HashEmbedder` is a deterministic stand-in that needs no weights.
//! `shared_embedder` loads one encoder per process and hands out clones.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;

use nutrimatch_core::config::{expand_path, EmbedderBackend, EmbeddingSettings};
use nutrimatch_core::traits::Embedder;

pub mod cache;
pub mod device;
pub mod hash;
pub mod pool;
pub mod tokenize;

pub use cache::CachingEmbedder;
pub use device::select_device;
pub use hash::HashEmbedder;
pub use pool::masked_mean_l2;

/// Sentence-transformer looked up under `models/` when no directory is configured.
pub const DEFAULT_MODEL: &str = "paraphrase-MiniLM-L6-v2";
const MODEL_ROOTS: [&str; 2] = ["models", "../models"];

pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    pad_id: u32,
    dim: usize,
    max_len: usize,
    batch_size: usize,
    id: String,
}

impl BertEmbedder {
    /// Load `tokenizer.json`, `config.json` and `model.safetensors`
    /// (or `pytorch_model.bin`) from `model_dir`.
    pub fn load(model_dir: &Path, settings: &EmbeddingSettings) -> Result<Self> {
        let started = Instant::now();
        let device = select_device(settings.prefer_gpu);

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let config: BertConfig = serde_json::from_str(
            &std::fs::read_to_string(&config_path).with_context(|| format!("Failed to read {}", config_path.display()))?,
        )
        .context("Failed to parse BERT config")?;

        let safetensors = model_dir.join("model.safetensors");
        let vb = if safetensors.exists() {
            // SAFETY: the weights file is treated as read-only for the lifetime of the mapping.
            unsafe {
                VarBuilder::from_mmaped_safetensors(&[&safetensors], DType::F32, &device)
                    .context("Failed to load safetensors weights")?
            }
        } else {
            let weights_path = model_dir.join("pytorch_model.bin");
            let weights = candle_core::pickle::read_all(&weights_path)
                .with_context(|| format!("Failed to read weights from {}", weights_path.display()))?;
            let weights_map: std::collections::HashMap<String, Tensor> = weights.into_iter().collect();
            VarBuilder::from_tensors(weights_map, DType::F32, &device)
        };
        let model = BertModel::load(vb, &config).context("Failed to initialize BERT model from weights")?;

        let name = model_dir.file_name().and_then(|n| n.to_str()).unwrap_or("bert");
        let dim = config.hidden_size;
        let max_len = settings.max_len.min(config.max_position_embeddings).max(1);
        tracing::info!(
            model = name,
            layers = config.num_hidden_layers,
            dim,
            max_len,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "BERT encoder loaded"
        );
        Ok(Self {
            pad_id: tokenize::pad_token_id(&tokenizer),
            model,
            tokenizer,
            device,
            dim,
            max_len,
            batch_size: settings.batch_size.max(1),
            id: format!("bert:{name}:d{dim}"),
        })
    }

    fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let batch = tokenize::encode_batch_on_device(&self.tokenizer, texts, self.max_len, self.pad_id, &self.device)?;
        let hidden = self
            .model
            .forward(&batch.input_ids, &batch.token_type_ids, Some(&batch.attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &batch.attention_mask)?;
        Ok(pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2::<f32>()?)
    }
}

impl Embedder for BertEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }
    fn dim(&self) -> usize {
        self.dim
    }
    fn max_len(&self) -> usize {
        self.max_len
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let started = Instant::now();
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            out.extend(self.embed_chunk(chunk)?);
        }
        tracing::debug!(texts = texts.len(), elapsed_ms = started.elapsed().as_millis() as u64, "encoded batch");
        Ok(out)
    }
}

/// Build the encoder selected by `settings`, wrapped in a cache when
/// `cache_capacity > 0`.
pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    let inner: Arc<dyn Embedder> = match settings.backend {
        EmbedderBackend::Hash => {
            tracing::info!(dim = settings.hash_dim, "using hashing encoder");
            Arc::new(HashEmbedder::new(settings.hash_dim))
        }
        EmbedderBackend::Bert => Arc::new(BertEmbedder::load(&resolve_model_dir(settings)?, settings)?),
    };
    Ok(CachingEmbedder::wrap(inner, settings.cache_capacity))
}

static SHARED: OnceLock<Arc<dyn Embedder>> = OnceLock::new();
static SHARED_INIT: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

/// Process-wide encoder, loaded on first use. Later calls return the same
/// instance and ignore their `settings`.
pub fn shared_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    if let Some(embedder) = SHARED.get() {
        return Ok(Arc::clone(embedder));
    }
    let _guard = SHARED_INIT.lock();
    if let Some(embedder) = SHARED.get() {
        return Ok(Arc::clone(embedder));
    }
    let embedder = get_default_embedder(settings)?;
    let shared = SHARED.get_or_init(|| embedder);
    Ok(Arc::clone(shared))
}

fn resolve_model_dir(settings: &EmbeddingSettings) -> Result<PathBuf> {
    if let Some(dir) = &settings.model_dir {
        let p = expand_path(dir);
        if p.exists() {
            tracing::info!(path = %p.display(), "using configured model dir");
            return Ok(p);
        }
        return Err(anyhow!("Configured model dir {} does not exist", p.display()));
    }
    if let Ok(dir) = std::env::var("APP_MODEL_DIR") {
        let p = expand_path(dir);
        if p.exists() {
            tracing::info!(path = %p.display(), "using APP_MODEL_DIR");
            return Ok(p);
        }
    }
    for root in MODEL_ROOTS {
        let p = Path::new(root).join(DEFAULT_MODEL);
        if p.exists() {
            tracing::info!(path = %p.display(), "using model dir");
            return Ok(p);
        }
    }
    Err(anyhow!("Could not locate {DEFAULT_MODEL} under {MODEL_ROOTS:?} (set embedding.model_dir)"))
}
