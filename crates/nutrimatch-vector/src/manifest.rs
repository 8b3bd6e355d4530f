//! `manifest.json`: ties an index directory to the encoder that built it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use nutrimatch_core::{Error, Result};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub embedder_id: String,
    pub dim: usize,
    pub entry_count: usize,
    pub table_name: String,
    /// blake3 of the tokenized corpus.
    pub corpus_fingerprint: String,
    pub created_at: DateTime<Utc>,
}

impl IndexManifest {
    pub fn new(
        embedder_id: &str,
        dim: usize,
        entry_count: usize,
        table_name: &str,
        corpus_fingerprint: String,
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            embedder_id: embedder_id.to_string(),
            dim,
            entry_count,
            table_name: table_name.to_string(),
            corpus_fingerprint,
            created_at: Utc::now(),
        }
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| Error::Operation(e.to_string()))?;
        fs::write(&path, json).map_err(|e| Error::Operation(format!("writing {}: {e}", path.display())))
    }

    /// Missing or unreadable manifests make the whole index unavailable.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let raw = fs::read_to_string(&path)
            .map_err(|e| Error::IndexUnavailable(format!("cannot read {}: {e}", path.display())))?;
        let manifest: Self = serde_json::from_str(&raw)
            .map_err(|e| Error::IndexUnavailable(format!("malformed {}: {e}", path.display())))?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(Error::IndexUnavailable(format!(
                "index format version {} is not supported (expected {FORMAT_VERSION}); rebuild the index",
                manifest.format_version
            )));
        }
        Ok(manifest)
    }

    /// The live encoder must be the one the index was built with.
    pub fn ensure_compatible(&self, embedder_id: &str, dim: usize) -> Result<()> {
        if self.dim != dim {
            return Err(Error::IndexUnavailable(format!(
                "index was built with {}-dimensional embeddings, encoder produces {}",
                self.dim, dim
            )));
        }
        if self.embedder_id != embedder_id {
            return Err(Error::IndexUnavailable(format!(
                "index was built with encoder '{}', live encoder is '{}'; rebuild the index",
                self.embedder_id, embedder_id
            )));
        }
        Ok(())
    }
}
