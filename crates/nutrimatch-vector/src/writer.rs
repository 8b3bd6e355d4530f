use anyhow::{bail, Result};
use arrow_array::types::Float32Type;
use arrow_array::{FixedSizeListArray, Float64Array, RecordBatch, RecordBatchIterator, StringArray, UInt64Array};
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::Connection;
use std::path::Path;
use std::sync::Arc;

use nutrimatch_core::types::{FoodCatalog, FoodEntry};

use crate::schema::reference_schema;
use crate::table::{open_db, table_exists};

const INSERT_BATCH: usize = 1000;

/// Writes the catalog and its embeddings into a fresh LanceDB table.
pub struct ReferenceIndexWriter {
	db: Connection,
	table_name: String,
	dim: usize,
}

impl ReferenceIndexWriter {
	pub async fn new(index_dir: &Path, table_name: &str, dim: usize) -> Result<Self> {
		let db = open_db(index_dir).await?;
		Ok(Self { db, table_name: table_name.to_string(), dim })
	}

	/// `embeddings[i]` belongs to the catalog entry at position `i`.
	pub async fn write(&self, catalog: &FoodCatalog, embeddings: &[Vec<f32>]) -> Result<()> {
		if catalog.len() != embeddings.len() {
			bail!("{} entries but {} embeddings", catalog.len(), embeddings.len());
		}
		if let Some((position, v)) = embeddings.iter().enumerate().find(|(_, v)| v.len() != self.dim) {
			bail!("embedding at position {} has dimension {}, expected {}", position, v.len(), self.dim);
		}
		if table_exists(&self.db, &self.table_name).await? {
			bail!("table '{}' already exists; build into an empty directory", self.table_name);
		}
		if catalog.is_empty() {
			let schema = reference_schema(self.dim);
			let iter = RecordBatchIterator::new(vec![].into_iter(), schema);
			self.db.create_table(&self.table_name, Box::new(iter)).execute().await?;
			tracing::warn!(table = %self.table_name, "wrote an empty reference table");
			return Ok(());
		}

		tracing::info!(entries = catalog.len(), table = %self.table_name, "writing reference table");
		let pb = ProgressBar::new(catalog.len() as u64);
		pb.set_style(
			ProgressStyle::default_bar()
				.template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} foods ({percent}%) {msg}")?
				.progress_chars("#>-"),
		);
		let mut start = 0usize;
		for (entries, vectors) in catalog.entries().chunks(INSERT_BATCH).zip(embeddings.chunks(INSERT_BATCH)) {
			let batch = self.to_record_batch(start, entries, vectors)?;
			self.insert_batch(batch).await?;
			start += entries.len();
			pb.set_position(start as u64);
		}
		pb.finish_with_message("reference table written");
		Ok(())
	}

	async fn insert_batch(&self, batch: RecordBatch) -> Result<()> {
		let schema = batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
		if table_exists(&self.db, &self.table_name).await? {
			self.db.open_table(&self.table_name).execute().await?.add(reader).execute().await?;
		} else {
			self.db.create_table(&self.table_name, reader).execute().await?;
		}
		Ok(())
	}

	fn to_record_batch(&self, start: usize, entries: &[FoodEntry], vectors: &[Vec<f32>]) -> Result<RecordBatch> {
		let positions: Vec<u64> = (start..start + entries.len()).map(|p| p as u64).collect();
		let text = |f: fn(&FoodEntry) -> Option<&str>| StringArray::from(entries.iter().map(f).collect::<Vec<_>>());
		let record_batch = RecordBatch::try_new(
			reference_schema(self.dim),
			vec![
				Arc::new(UInt64Array::from(positions)),
				Arc::new(text(|e| Some(e.id.as_str()))),
				Arc::new(text(|e| Some(e.name_en.as_str()))),
				Arc::new(text(|e| Some(e.name_fr.as_str()))),
				Arc::new(text(|e| e.group_code.as_deref())),
				Arc::new(text(|e| e.subgroup_code.as_deref())),
				Arc::new(text(|e| e.subsubgroup_code.as_deref())),
				Arc::new(text(|e| e.group_name_fr.as_deref())),
				Arc::new(text(|e| e.subgroup_name_fr.as_deref())),
				Arc::new(Float64Array::from(entries.iter().map(|e| e.calories_per_100g.per_100g()).collect::<Vec<_>>())),
				Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
					vectors.iter().map(|v| Some(v.iter().map(|&x| Some(x)).collect::<Vec<_>>())),
					self.dim as i32,
				)),
			],
		)?;
		Ok(record_batch)
	}
}
