use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// Arrow layout of the product table. Optional catalog fields are nullable.
pub fn build_product_schema(dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("category", DataType::Utf8, true),
        Field::new("brand", DataType::Utf8, true),
        Field::new("description", DataType::Utf8, false),
        Field::new("rag_context", DataType::Utf8, true),
        Field::new("image_relative_path", DataType::Utf8, false),
        Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), false),
    ]))
}

/// Reads the vector width out of a product schema.
pub fn vector_dim(schema: &Schema) -> Option<i32> {
    match schema.field_with_name("vector").ok()?.data_type() {
        DataType::FixedSizeList(_, n) => Some(*n),
        _ => None,
    }
}
