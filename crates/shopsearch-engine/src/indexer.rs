//! Offline catalog indexer: image embedding per product, serialized upserts.

use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use shopsearch_core::config::{resolve_with_base, IndexingSettings};
use shopsearch_core::traits::{prepare_batch, Embedder, VectorStore};
use shopsearch_core::types::{EmbedInput, IndexedVector, ProductRecord};
use shopsearch_core::{Error, Result};

use crate::lock::RebuildLock;

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    EmptyId,
    MissingImage(PathBuf),
    Encoding(String),
    Dimension { got: usize, want: usize },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::EmptyId => write!(f, "empty id"),
            SkipReason::MissingImage(p) => write!(f, "image not found: {}", p.display()),
            SkipReason::Encoding(e) => write!(f, "{e}"),
            SkipReason::Dimension { got, want } => write!(f, "embedding has {got} values, expected {want}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    pub id: String,
    pub reason: SkipReason,
}

/// Outcome of one indexing run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexReport {
    /// Catalog rows seen.
    pub total: usize,
    /// Distinct ids written to the store.
    pub indexed: usize,
    pub skipped: Vec<SkippedRecord>,
}

pub struct CatalogIndexer {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    image_root: PathBuf,
    lock: RebuildLock,
    settings: IndexingSettings,
}

impl CatalogIndexer {
    /// `image_root` is the directory every `ProductRecord::image_path` is
    /// relative to.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        image_root: impl Into<PathBuf>,
        lock: RebuildLock,
        settings: IndexingSettings,
    ) -> Result<Self> {
        if embedder.dim() != store.dim() {
            return Err(Error::IndexConsistency(format!(
                "embedder '{}' produces {} dimensions but the store holds {}",
                embedder.model_id(),
                embedder.dim(),
                store.dim()
            )));
        }
        settings.validate()?;
        Ok(Self { embedder, store, image_root: image_root.into(), lock, settings })
    }

    /// Clears the store and indexes `records` from scratch under the rebuild
    /// lock. A concurrent rebuild fails with `Error::IndexConsistency`.
    pub async fn rebuild(&self, records: &[ProductRecord]) -> Result<IndexReport> {
        let _guard = self.lock.try_acquire()?;
        self.store.clear().await?;
        info!(products = records.len(), "store cleared, rebuilding index");
        self.index_records(records).await
    }

    /// Embeds and upserts `records` without clearing first. Bad records are
    /// skipped; a store write failure aborts the run.
    pub async fn index_records(&self, records: &[ProductRecord]) -> Result<IndexReport> {
        let start = Instant::now();
        let mut report = IndexReport { total: records.len(), ..IndexReport::default() };
        if records.is_empty() {
            info!("no products to index");
            return Ok(report);
        }

        let pb = ProgressBar::new(records.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} products ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let mut embedded: Vec<(usize, std::result::Result<IndexedVector, SkippedRecord>)> =
            stream::iter(records.iter().enumerate())
                .map(|(pos, rec)| {
                    let embedder = Arc::clone(&self.embedder);
                    let image = resolve_with_base(&self.image_root, &rec.image_path);
                    let rec = rec.clone();
                    async move { (pos, embed_record(embedder, rec, image).await) }
                })
                .buffer_unordered(self.settings.workers)
                .inspect(|_| pb.inc(1))
                .collect()
                .await;
        pb.finish_and_clear();
        // catalog order decides which row wins for a repeated id
        embedded.sort_by_key(|(pos, _)| *pos);

        let mut rows = Vec::with_capacity(embedded.len());
        for (_, outcome) in embedded {
            match outcome {
                Ok(row) => rows.push(row),
                Err(skip) => {
                    warn!(id = %skip.id, reason = %skip.reason, "skipping product");
                    report.skipped.push(skip);
                }
            }
        }
        let rows = prepare_batch(self.store.dim(), &rows)?;

        let mut written = 0usize;
        for chunk in rows.chunks(self.settings.batch_size) {
            self.store.upsert_batch(chunk).await?;
            let before = written;
            written += chunk.len();
            let every = self.settings.progress_every;
            if every > 0 && written / every > before / every {
                info!(indexed = written, total = rows.len(), "indexing progress");
            }
        }
        report.indexed = written;

        info!(
            total = report.total,
            indexed = report.indexed,
            skipped = report.skipped.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "indexing finished"
        );
        Ok(report)
    }
}

async fn embed_record(
    embedder: Arc<dyn Embedder>,
    rec: ProductRecord,
    image: PathBuf,
) -> std::result::Result<IndexedVector, SkippedRecord> {
    let skip = |reason| SkippedRecord { id: rec.id.clone(), reason };
    if rec.id.trim().is_empty() {
        return Err(skip(SkipReason::EmptyId));
    }
    if !image.is_file() {
        return Err(skip(SkipReason::MissingImage(image)));
    }
    let want = embedder.dim();
    let vector = tokio::task::spawn_blocking(move || embedder.encode(&EmbedInput::Image(&image)))
        .await
        .map_err(|e| skip(SkipReason::Encoding(format!("embedding task failed: {e}"))))?
        .map_err(|e| skip(SkipReason::Encoding(e.to_string())))?;
    if vector.len() != want {
        return Err(skip(SkipReason::Dimension { got: vector.len(), want }));
    }
    Ok(IndexedVector { id: rec.id.clone(), vector, metadata: rec.metadata() })
}
