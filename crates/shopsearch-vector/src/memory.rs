use async_trait::async_trait;
use tokio::sync::RwLock;

use shopsearch_core::traits::{prepare_batch, VectorStore};
use shopsearch_core::types::{IndexedVector, VectorMatch};
use shopsearch_core::{Error, Result};

use crate::cosine_similarity;

/// Exact brute-force store kept in memory. Ties in distance resolve by
/// insertion order; re-upserting an id keeps its original slot.
pub struct MemoryVectorStore {
    dim: usize,
    rows: RwLock<Vec<IndexedVector>>,
}

impl MemoryVectorStore {
    pub fn new(dim: usize) -> Self {
        Self { dim, rows: RwLock::new(Vec::new()) }
    }

    pub async fn get(&self, id: &str) -> Option<IndexedVector> {
        self.rows.read().await.iter().find(|r| r.id == id).cloned()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn upsert_batch(&self, records: &[IndexedVector]) -> Result<()> {
        let records = prepare_batch(self.dim, records)?;
        let mut rows = self.rows.write().await;
        for rec in records {
            match rows.iter_mut().find(|r| r.id == rec.id) {
                Some(slot) => *slot = rec,
                None => rows.push(rec),
            }
        }
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
        let rows = self.rows.read().await;
        let mut scored: Vec<(usize, f32)> = rows
            .iter()
            .enumerate()
            .map(|(i, r)| (i, 1.0 - cosine_similarity(vector, &r.vector)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, distance)| VectorMatch {
                id: rows[i].id.clone(),
                metadata: rows[i].metadata.clone(),
                distance,
            })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.rows.read().await.len())
    }

    async fn clear(&self) -> Result<()> {
        self.rows.write().await.clear();
        Ok(())
    }
}
