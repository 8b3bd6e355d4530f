use anyhow::{anyhow, bail, Result};
use arrow_array::{Float32Array, StringArray, UInt64Array};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use std::path::Path;

use nutrimatch_core::traits::VectorSearch;
use nutrimatch_core::types::VectorHit;

use crate::schema::{COL_DISTANCE, COL_ID, COL_POSITION};
use crate::table::open_table;

/// Cosine nearest-neighbour search served by LanceDB.
pub struct LanceVectorSearch {
	table: Table,
	dim: usize,
	rows: usize,
}

impl LanceVectorSearch {
	pub async fn open(index_dir: &Path, table_name: &str, dim: usize) -> Result<Self> {
		let table = open_table(index_dir, table_name).await?;
		let rows = table.count_rows(None).await?;
		tracing::info!(table = table_name, rows, dim, "vector search ready");
		Ok(Self { table, dim, rows })
	}

	pub fn len(&self) -> usize {
		self.rows
	}

	pub fn is_empty(&self) -> bool {
		self.rows == 0
	}

	/// The `limit` nearest rows as `(distance, position, id)`, sorted by
	/// distance then position.
	async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<(f32, u64, String)>> {
		let mut stream = self
			.table
			.vector_search(query.to_vec())?
			.distance_type(DistanceType::Cosine)
			.limit(limit)
			.execute()
			.await?;

		let mut hits: Vec<(f32, u64, String)> = Vec::new();
		while let Some(batch) = stream.try_next().await? {
			let ids = batch.column_by_name(COL_ID).and_then(|c| c.as_any().downcast_ref::<StringArray>());
			let positions = batch.column_by_name(COL_POSITION).and_then(|c| c.as_any().downcast_ref::<UInt64Array>());
			let distances = batch.column_by_name(COL_DISTANCE).and_then(|c| c.as_any().downcast_ref::<Float32Array>());
			let (Some(ids), Some(positions), Some(distances)) = (ids, positions, distances) else {
				return Err(anyhow!("vector search result is missing id/position/_distance columns"));
			};
			for i in 0..batch.num_rows() {
				hits.push((distances.value(i), positions.value(i), ids.value(i).to_string()));
			}
		}
		hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
		Ok(hits)
	}
}

impl VectorSearch for LanceVectorSearch {
	fn dim(&self) -> usize {
		self.dim
	}

	async fn search_vec(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>> {
		if query.len() != self.dim {
			bail!("query vector has dimension {}, index expects {}", query.len(), self.dim);
		}
		if self.rows == 0 || k == 0 {
			return Ok(Vec::new());
		}
		// Widen the scan until the k-th distance is no longer shared with the
		// last row returned, so ties at the boundary resolve by position.
		let mut limit = (k + 1).min(self.rows);
		let mut hits = loop {
			let hits = self.nearest(query, limit).await?;
			if hits.len() <= k || limit >= self.rows {
				break hits;
			}
			let boundary = hits[k - 1].0;
			if hits.last().map_or(true, |last| last.0 > boundary) {
				break hits;
			}
			limit = (limit * 2).min(self.rows);
		};
		hits.truncate(k);
		Ok(hits.into_iter().map(|(distance, _, id)| VectorHit { id, distance }).collect())
	}
}
