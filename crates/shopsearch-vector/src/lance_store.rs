//! LanceDB-backed `VectorStore`.
//!
//! One table per catalog. Upserts go through `merge_insert` on `id`, queries
//! use cosine distance, and `clear` removes the table's storage so a rebuild
//! starts from an empty table with the current schema.

use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::index::vector::IvfPqIndexBuilder;
use lancedb::index::Index;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use shopsearch_core::traits::{prepare_batch, VectorStore};
use shopsearch_core::types::{IndexedVector, ProductMetadata, VectorMatch};
use shopsearch_core::{Error, Result};

use crate::schema::{build_product_schema, vector_dim};
use crate::table::{ensure_table, lance_err, open_db, table_exists};

pub struct LanceVectorStore {
    conn: Connection,
    root: PathBuf,
    table_name: String,
    dim: usize,
}

impl LanceVectorStore {
    /// Connects to (or creates) the database directory at `root`.
    pub async fn open(root: &Path, table_name: &str, dim: usize) -> Result<Self> {
        if dim == 0 || i32::try_from(dim).is_err() {
            return Err(Error::InvalidConfig(format!("unsupported vector dimension {dim}")));
        }
        std::fs::create_dir_all(root)?;
        let conn = open_db(&root.to_string_lossy()).await?;
        info!(root = %root.display(), table = table_name, dim, "opened vector store");
        Ok(Self { conn, root: root.to_path_buf(), table_name: table_name.to_string(), dim })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    fn dim_i32(&self) -> i32 {
        // checked in `open`
        i32::try_from(self.dim).unwrap_or(i32::MAX)
    }

    async fn open_table(&self) -> Result<Option<Table>> {
        if !table_exists(&self.conn, &self.table_name).await? {
            return Ok(None);
        }
        let t = self.conn.open_table(&self.table_name).execute().await.map_err(lance_err)?;
        Ok(Some(t))
    }

    /// Opens the table for writing, creating it if needed and refusing a
    /// table whose vector width differs from this store's.
    async fn writable_table(&self) -> Result<Table> {
        ensure_table(&self.conn, &self.table_name, build_product_schema(self.dim_i32())).await?;
        let t = self.conn.open_table(&self.table_name).execute().await.map_err(lance_err)?;
        let schema = t.schema().await.map_err(lance_err)?;
        match vector_dim(&schema) {
            Some(d) if d == self.dim_i32() => Ok(t),
            other => Err(Error::IndexConsistency(format!(
                "table '{}' stores vectors of dimension {:?}, store expects {}; rebuild the index",
                self.table_name, other, self.dim
            ))),
        }
    }

    fn to_record_batch(&self, records: &[IndexedVector]) -> Result<RecordBatch> {
        let mut ids = Vec::with_capacity(records.len());
        let mut titles = Vec::with_capacity(records.len());
        let mut categories: Vec<Option<String>> = Vec::with_capacity(records.len());
        let mut brands: Vec<Option<String>> = Vec::with_capacity(records.len());
        let mut descriptions = Vec::with_capacity(records.len());
        let mut contexts: Vec<Option<String>> = Vec::with_capacity(records.len());
        let mut images = Vec::with_capacity(records.len());
        let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(records.len());
        for rec in records {
            let m = &rec.metadata;
            ids.push(rec.id.clone());
            titles.push(m.title.clone());
            categories.push(m.category.clone());
            brands.push(m.brand.clone());
            descriptions.push(m.description.clone());
            contexts.push(m.rag_context.clone());
            images.push(m.image_relative_path.clone());
            vectors.push(Some(rec.vector.iter().map(|&x| Some(x)).collect()));
        }
        RecordBatch::try_new(
            build_product_schema(self.dim_i32()),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(titles)),
                Arc::new(StringArray::from(categories)),
                Arc::new(StringArray::from(brands)),
                Arc::new(StringArray::from(descriptions)),
                Arc::new(StringArray::from(contexts)),
                Arc::new(StringArray::from(images)),
                Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, self.dim_i32())),
            ],
        )
        .map_err(|e| Error::IndexConsistency(format!("record batch: {e}")))
    }

    /// Trains an IVF_PQ index once the table holds at least `min_rows` rows.
    /// Below that a flat scan is both exact and fast enough.
    pub async fn ensure_ann_index(&self, min_rows: usize) -> Result<bool> {
        let rows = self.count().await?;
        if rows < min_rows.max(256) {
            debug!(rows, "skipping ANN index: too few rows");
            return Ok(false);
        }
        let Some(table) = self.open_table().await? else { return Ok(false) };
        let partitions = ((rows as f64).sqrt() as u32).clamp(1, 4096);
        let sub_vectors = if self.dim % 16 == 0 { 16 } else { 1 };
        table
            .create_index(
                &["vector"],
                Index::IvfPq(
                    IvfPqIndexBuilder::default()
                        .distance_type(DistanceType::Cosine)
                        .num_partitions(partitions)
                        .num_sub_vectors(sub_vectors),
                ),
            )
            .execute()
            .await
            .map_err(lance_err)?;
        info!(rows, partitions, sub_vectors, "built IVF_PQ index");
        Ok(true)
    }
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::Retrieval(format!("column '{name}' missing from result")))
}

fn opt_value(col: &StringArray, i: usize) -> Option<String> {
    if col.is_null(i) { None } else { Some(col.value(i).to_string()) }
}

fn matches_from_batch(batch: &RecordBatch, out: &mut Vec<VectorMatch>) -> Result<()> {
    let id = string_col(batch, "id")?;
    let title = string_col(batch, "title")?;
    let category = string_col(batch, "category")?;
    let brand = string_col(batch, "brand")?;
    let description = string_col(batch, "description")?;
    let rag_context = string_col(batch, "rag_context")?;
    let image = string_col(batch, "image_relative_path")?;
    let distance = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| Error::Retrieval("column '_distance' missing from result".to_string()))?;
    for i in 0..batch.num_rows() {
        out.push(VectorMatch {
            id: id.value(i).to_string(),
            metadata: ProductMetadata {
                title: title.value(i).to_string(),
                category: opt_value(category, i),
                brand: opt_value(brand, i),
                description: description.value(i).to_string(),
                rag_context: opt_value(rag_context, i),
                image_relative_path: image.value(i).to_string(),
            },
            distance: distance.value(i),
        });
    }
    Ok(())
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn upsert_batch(&self, records: &[IndexedVector]) -> Result<()> {
        let records = prepare_batch(self.dim, records)?;
        if records.is_empty() {
            return Ok(());
        }
        let batch = self.to_record_batch(&records)?;
        let table = self.writable_table().await?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        let mut mi = table.merge_insert(&["id"]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        mi.execute(reader).await.map_err(lance_err)?;
        debug!(rows = records.len(), table = %self.table_name, "upserted");
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<VectorMatch>> {
        if vector.len() != self.dim {
            return Err(Error::Retrieval(format!(
                "query vector has dimension {}, index expects {}",
                vector.len(),
                self.dim
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        let Some(table) = self.open_table().await? else { return Ok(Vec::new()) };
        if table.count_rows(None).await.map_err(lance_err)? == 0 {
            return Ok(Vec::new());
        }
        let mut stream = table
            .vector_search(vector.to_vec())
            .map_err(lance_err)?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(lance_err)?;
        let mut out = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(lance_err)? {
            matches_from_batch(&batch, &mut out)?;
        }
        out.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));
        out.truncate(k);
        Ok(out)
    }

    async fn count(&self) -> Result<usize> {
        match self.open_table().await? {
            Some(t) => t.count_rows(None).await.map_err(lance_err),
            None => Ok(0),
        }
    }

    async fn clear(&self) -> Result<()> {
        if !table_exists(&self.conn, &self.table_name).await? {
            return Ok(());
        }
        let dir = self.root.join(format!("{}.lance", self.table_name));
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        if table_exists(&self.conn, &self.table_name).await? {
            // layout we do not own; fall back to deleting rows
            let t = self.conn.open_table(&self.table_name).execute().await.map_err(lance_err)?;
            t.delete("true").await.map_err(lance_err)?;
        }
        info!(table = %self.table_name, "cleared vector store");
        Ok(())
    }
}
