use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

pub const META_TABLE: &str = "meta";

/// One row per listing fragment.
pub fn build_fragment_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("fragment_id", DataType::Utf8, false),
		Field::new("listing_id", DataType::Utf8, false),
		Field::new("chunk_index", DataType::Int32, false),
		Field::new("total_chunks", DataType::Int32, false),
		Field::new("content", DataType::Utf8, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}

/// Key/value rows describing what a fragment table was built from.
pub fn build_meta_schema() -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("key", DataType::Utf8, false),
		Field::new("value", DataType::Utf8, false),
		Field::new("updated_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
	]))
}
