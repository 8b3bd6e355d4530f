//! TokenizedCorpus: one token list per reference entry, position-aligned with
//! the catalog. Persisted as a JSON array of arrays.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use nutrimatch_core::tokenize;

pub const CORPUS_FILE: &str = "tokenized_corpus.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenizedCorpus {
	documents: Vec<Vec<String>>,
}

impl TokenizedCorpus {
	pub fn from_names<I, S>(names: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		Self { documents: names.into_iter().map(|n| tokenize(n.as_ref())).collect() }
	}

	pub fn documents(&self) -> &[Vec<String>] {
		&self.documents
	}

	pub fn len(&self) -> usize {
		self.documents.len()
	}

	pub fn is_empty(&self) -> bool {
		self.documents.is_empty()
	}

	/// blake3 over every token with unit/record separators, so any change in
	/// order, count or content yields a different value.
	pub fn fingerprint(&self) -> String {
		let mut hasher = blake3::Hasher::new();
		hasher.update(&(self.documents.len() as u64).to_le_bytes());
		for doc in &self.documents {
			for token in doc {
				hasher.update(token.as_bytes());
				hasher.update(&[0x1f]);
			}
			hasher.update(&[0x1e]);
		}
		hasher.finalize().to_hex().to_string()
	}

	pub fn save(&self, dir: &Path) -> Result<()> {
		let path = dir.join(CORPUS_FILE);
		let json = serde_json::to_string(&self)?;
		fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
		Ok(())
	}

	pub fn load(dir: &Path) -> Result<Self> {
		let path = dir.join(CORPUS_FILE);
		let json = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
		let corpus: Self = serde_json::from_str(&json).with_context(|| format!("Malformed {}", path.display()))?;
		Ok(corpus)
	}
}
