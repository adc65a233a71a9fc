use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::types::{EmbedInput, IndexedVector, VectorMatch};

/// Maps text or an image into one shared, fixed-dimension vector space.
///
/// Implementations are deterministic for a fixed model and return
/// L2-normalized vectors of length `dim()`. Undecodable input fails with
/// `Error::Encoding`.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn model_id(&self) -> &str;
    fn encode(&self, input: &EmbedInput<'_>) -> Result<Vec<f32>>;
}

/// Pairwise text relevance scorer. Higher is more relevant; scores are only
/// comparable within one call.
pub trait Reranker: Send + Sync {
    fn model_id(&self) -> &str;

    /// Scores every `(query, doc)` pair; output order matches `docs`.
    fn score_batch(&self, query: &str, docs: &[String]) -> Result<Vec<f32>>;

    fn score(&self, query: &str, doc: &str) -> Result<f32> {
        self.score_batch(query, &[doc.to_string()])?
            .pop()
            .ok_or_else(|| Error::Rerank("reranker returned no score".to_string()))
    }
}

/// Persistent (or in-memory) k-nearest-neighbor index under cosine distance.
///
/// Upserts are idempotent per id. `query` returns hits in ascending distance
/// with a deterministic order for a fixed index state.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn dim(&self) -> usize;

    async fn upsert_batch(&self, records: &[IndexedVector]) -> Result<()>;

    async fn upsert(&self, record: IndexedVector) -> Result<()> {
        self.upsert_batch(std::slice::from_ref(&record)).await
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<VectorMatch>>;

    async fn count(&self) -> Result<usize>;

    /// Drops every indexed item.
    async fn clear(&self) -> Result<()>;
}

/// Checks a batch before any of it is written: non-empty ids and vectors of
/// the store's dimension. Returns the batch with duplicate ids collapsed to
/// their last occurrence, preserving first-seen order.
pub fn prepare_batch(dim: usize, records: &[IndexedVector]) -> Result<Vec<IndexedVector>> {
    let mut out: Vec<IndexedVector> = Vec::with_capacity(records.len());
    let mut slots: HashMap<&str, usize> = HashMap::with_capacity(records.len());
    for rec in records {
        if rec.id.is_empty() {
            return Err(Error::IndexConsistency("empty id in upsert batch".to_string()));
        }
        if rec.vector.len() != dim {
            return Err(Error::IndexConsistency(format!(
                "vector for '{}' has dimension {}, index expects {}",
                rec.id,
                rec.vector.len(),
                dim
            )));
        }
        match slots.get(rec.id.as_str()) {
            Some(&slot) => out[slot] = rec.clone(),
            None => {
                slots.insert(rec.id.as_str(), out.len());
                out.push(rec.clone());
            }
        }
    }
    Ok(out)
}
