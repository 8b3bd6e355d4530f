//! Ciqual nutrition table ingestion.
//!
//! Every column is read as text and resolved by header name, so extra columns
//! (pandas index, unused nutrients) are ignored.

use anyhow::{anyhow, bail, Context, Result};
use arrow_array::{Array, RecordBatch, StringArray};
use arrow_csv::reader::Format;
use arrow_csv::ReaderBuilder;
use arrow_schema::{DataType, Field, Schema};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use crate::types::{Calories, FoodEntry};

pub const COL_GROUP_CODE: &str = "alim_grp_code";
pub const COL_SUBGROUP_CODE: &str = "alim_ssgrp_code";
pub const COL_SUBSUBGROUP_CODE: &str = "alim_ssssgrp_code";
pub const COL_GROUP_NAME_FR: &str = "alim_grp_nom_fr";
pub const COL_SUBGROUP_NAME_FR: &str = "alim_ssgrp_nom_fr";
pub const COL_CODE: &str = "alim_code";
pub const COL_NAME_FR: &str = "alim_nom_fr";
pub const COL_NAME_EN: &str = "alim_nom_en";
pub const COL_ENERGY_KCAL: &str = "Energie (kcal/100 g)";

#[derive(Debug, Clone)]
pub struct DatasetReader {
    delimiter: u8,
    limit: Option<usize>,
}

impl Default for DatasetReader {
    fn default() -> Self {
        Self { delimiter: b',', limit: None }
    }
}

impl DatasetReader {
    pub fn new(delimiter: char) -> Result<Self> {
        if !delimiter.is_ascii() {
            bail!("CSV delimiter must be a single ASCII character, got {delimiter:?}");
        }
        Ok(Self { delimiter: delimiter as u8, limit: None })
    }

    /// Keep only the first `limit` rows (quick local builds).
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn read(&self, path: &Path) -> Result<Vec<FoodEntry>> {
        let format = Format::default().with_header(true).with_delimiter(self.delimiter);
        let header_file = File::open(path).with_context(|| format!("Failed to open dataset {}", path.display()))?;
        let (inferred, _) = format
            .infer_schema(header_file, Some(1))
            .with_context(|| format!("Failed to read CSV header of {}", path.display()))?;
        let fields: Vec<Field> = inferred
            .fields()
            .iter()
            .map(|f| Field::new(f.name(), DataType::Utf8, true))
            .collect();
        let schema = Arc::new(Schema::new(fields));
        for required in [COL_CODE, COL_NAME_EN] {
            if schema.field_with_name(required).is_err() {
                bail!("dataset {} is missing required column '{}'", path.display(), required);
            }
        }

        let reader = ReaderBuilder::new(schema)
            .with_header(true)
            .with_delimiter(self.delimiter)
            .with_batch_size(1024)
            .build(File::open(path)?)?;

        let mut entries = Vec::new();
        for batch in reader {
            let batch = batch.with_context(|| format!("Malformed CSV in {}", path.display()))?;
            let columns = DatasetColumns::from_batch(&batch)?;
            for i in 0..batch.num_rows() {
                if self.limit.is_some_and(|limit| entries.len() >= limit) {
                    break;
                }
                let row = entries.len() + 1;
                entries.push(columns.entry(i, row)?);
            }
        }
        tracing::info!(rows = entries.len(), path = %path.display(), "dataset loaded");
        Ok(entries)
    }
}

struct DatasetColumns<'a> {
    code: &'a StringArray,
    name_en: &'a StringArray,
    name_fr: Option<&'a StringArray>,
    group_code: Option<&'a StringArray>,
    subgroup_code: Option<&'a StringArray>,
    subsubgroup_code: Option<&'a StringArray>,
    group_name_fr: Option<&'a StringArray>,
    subgroup_name_fr: Option<&'a StringArray>,
    energy: Option<&'a StringArray>,
}

impl<'a> DatasetColumns<'a> {
    fn from_batch(batch: &'a RecordBatch) -> Result<Self> {
        let optional = |name: &str| batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let required = |name: &str| optional(name).ok_or_else(|| anyhow!("column '{name}' missing from batch"));
        Ok(Self {
            code: required(COL_CODE)?,
            name_en: required(COL_NAME_EN)?,
            name_fr: optional(COL_NAME_FR),
            group_code: optional(COL_GROUP_CODE),
            subgroup_code: optional(COL_SUBGROUP_CODE),
            subsubgroup_code: optional(COL_SUBSUBGROUP_CODE),
            group_name_fr: optional(COL_GROUP_NAME_FR),
            subgroup_name_fr: optional(COL_SUBGROUP_NAME_FR),
            energy: optional(COL_ENERGY_KCAL),
        })
    }

    fn entry(&self, i: usize, row: usize) -> Result<FoodEntry> {
        let id = cell(Some(self.code), i).ok_or_else(|| anyhow!("row {row}: empty {COL_CODE}"))?;
        let name_en = cell(Some(self.name_en), i).ok_or_else(|| anyhow!("row {row}: empty {COL_NAME_EN}"))?;
        Ok(FoodEntry {
            id,
            name_en,
            name_fr: cell(self.name_fr, i).unwrap_or_default(),
            group_code: cell(self.group_code, i),
            subgroup_code: cell(self.subgroup_code, i),
            subsubgroup_code: cell(self.subsubgroup_code, i),
            group_name_fr: cell(self.group_name_fr, i),
            subgroup_name_fr: cell(self.subgroup_name_fr, i),
            calories_per_100g: cell(self.energy, i).map_or(Calories::Unknown, |raw| Calories::parse(&raw)),
        })
    }
}

fn cell(column: Option<&StringArray>, i: usize) -> Option<String> {
    let column = column?;
    if column.is_null(i) {
        return None;
    }
    let value = column.value(i).trim();
    (!value.is_empty()).then(|| value.to_string())
}
