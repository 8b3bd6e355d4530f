use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const COL_POSITION: &str = "position";
pub const COL_ID: &str = "id";
pub const COL_NAME_EN: &str = "name_en";
pub const COL_NAME_FR: &str = "name_fr";
pub const COL_GROUP_CODE: &str = "group_code";
pub const COL_SUBGROUP_CODE: &str = "subgroup_code";
pub const COL_SUBSUBGROUP_CODE: &str = "subsubgroup_code";
pub const COL_GROUP_NAME_FR: &str = "group_name_fr";
pub const COL_SUBGROUP_NAME_FR: &str = "subgroup_name_fr";
pub const COL_KCAL: &str = "kcal_per_100g";
pub const COL_VECTOR: &str = "vector";
/// Added by LanceDB to vector search results.
pub const COL_DISTANCE: &str = "_distance";

/// Reference Index rows: catalog position, metadata and the `name_en` embedding.
/// A null kcal is an unknown calorie value.
pub fn reference_schema(dim: usize) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new(COL_POSITION, DataType::UInt64, false),
		Field::new(COL_ID, DataType::Utf8, false),
		Field::new(COL_NAME_EN, DataType::Utf8, false),
		Field::new(COL_NAME_FR, DataType::Utf8, false),
		Field::new(COL_GROUP_CODE, DataType::Utf8, true),
		Field::new(COL_SUBGROUP_CODE, DataType::Utf8, true),
		Field::new(COL_SUBSUBGROUP_CODE, DataType::Utf8, true),
		Field::new(COL_GROUP_NAME_FR, DataType::Utf8, true),
		Field::new(COL_SUBGROUP_NAME_FR, DataType::Utf8, true),
		Field::new(COL_KCAL, DataType::Float64, true),
		Field::new(
			COL_VECTOR,
			DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32),
			true,
		),
	]))
}
