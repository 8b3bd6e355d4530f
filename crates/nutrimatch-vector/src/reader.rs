//! Full scan of the reference table back into position order.

use anyhow::{anyhow, bail, Context, Result};
use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float64Array, RecordBatch, StringArray, UInt64Array};
use futures::TryStreamExt;
use lancedb::query::ExecutableQuery;
use lancedb::Table;

use nutrimatch_core::types::{Calories, FoodEntry};

use crate::schema::*;

/// One stored row: its catalog position, metadata and embedding.
#[derive(Debug, Clone)]
pub struct ReferenceRow {
	pub position: usize,
	pub entry: FoodEntry,
	pub vector: Vec<f32>,
}

/// Every row of `table`, sorted by position. Positions must be exactly `0..n`.
pub async fn read_reference_rows(table: &Table) -> Result<Vec<ReferenceRow>> {
	let mut rows = Vec::new();
	let mut stream = table.query().execute().await?;
	while let Some(batch) = stream.try_next().await? {
		read_batch(&batch, &mut rows)?;
	}
	rows.sort_by_key(|r| r.position);
	for (expected, row) in rows.iter().enumerate() {
		if row.position != expected {
			bail!("reference table positions are not contiguous: expected {}, found {}", expected, row.position);
		}
	}
	Ok(rows)
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<T>())
		.ok_or_else(|| anyhow!("reference table column '{}' missing or mistyped", name))
}

fn opt_text(col: &StringArray, i: usize) -> Option<String> {
	(!col.is_null(i)).then(|| col.value(i).to_string())
}

fn read_batch(batch: &RecordBatch, out: &mut Vec<ReferenceRow>) -> Result<()> {
	let position = column::<UInt64Array>(batch, COL_POSITION)?;
	let id = column::<StringArray>(batch, COL_ID)?;
	let name_en = column::<StringArray>(batch, COL_NAME_EN)?;
	let name_fr = column::<StringArray>(batch, COL_NAME_FR)?;
	let group_code = column::<StringArray>(batch, COL_GROUP_CODE)?;
	let subgroup_code = column::<StringArray>(batch, COL_SUBGROUP_CODE)?;
	let subsubgroup_code = column::<StringArray>(batch, COL_SUBSUBGROUP_CODE)?;
	let group_name_fr = column::<StringArray>(batch, COL_GROUP_NAME_FR)?;
	let subgroup_name_fr = column::<StringArray>(batch, COL_SUBGROUP_NAME_FR)?;
	let kcal = column::<Float64Array>(batch, COL_KCAL)?;
	let vectors = column::<FixedSizeListArray>(batch, COL_VECTOR)?;

	for i in 0..batch.num_rows() {
		let vector = vectors.value(i).as_primitive::<Float32Type>().values().to_vec();
		let calories = if kcal.is_null(i) { Calories::Unknown } else { Calories::Known(kcal.value(i)) };
		out.push(ReferenceRow {
			position: usize::try_from(position.value(i)).context("position overflows usize")?,
			entry: FoodEntry {
				id: id.value(i).to_string(),
				name_en: name_en.value(i).to_string(),
				name_fr: name_fr.value(i).to_string(),
				group_code: opt_text(group_code, i),
				subgroup_code: opt_text(subgroup_code, i),
				subsubgroup_code: opt_text(subsubgroup_code, i),
				group_name_fr: opt_text(group_name_fr, i),
				subgroup_name_fr: opt_text(subgroup_name_fr, i),
				calories_per_100g: calories,
			},
			vector,
		});
	}
	Ok(())
}
