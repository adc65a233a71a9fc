use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use shopsearch_core::catalog::read_catalog;
use shopsearch_embed::default_embedder;
use shopsearch_engine::{CatalogIndexer, RebuildLock};
use shopsearch_vector::LanceVectorStore;

/// Row count from which an IVF_PQ index pays off over a flat scan.
const ANN_MIN_ROWS: usize = 10_000;

/// Rebuild the product vector index from the catalog CSV.
#[derive(Parser, Debug)]
#[command(name = "shopsearch-indexer", version)]
struct Args {
    /// Catalog CSV (defaults to paths.catalog_csv)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// LanceDB directory (defaults to paths.vector_db_dir)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Use the deterministic hashing embedder instead of CLIP
    #[arg(long)]
    fake: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shopsearch_cli::init_tracing();
    let args = Args::parse();
    let settings = shopsearch_cli::load_settings(args.fake)?;

    let catalog = args.catalog.unwrap_or_else(|| settings.paths.resolve(&settings.paths.catalog_csv));
    let db = args.db.unwrap_or_else(|| settings.paths.resolve(&settings.paths.vector_db_dir));
    info!(catalog = %catalog.display(), db = %db.display(), "starting rebuild");

    let records = read_catalog(&catalog)?;
    let embedder = default_embedder(&settings)?;
    let store = Arc::new(LanceVectorStore::open(&db, &settings.paths.table_name, embedder.dim()).await?);
    let indexer = CatalogIndexer::new(
        embedder,
        store.clone(),
        settings.paths.root(),
        RebuildLock::in_dir(&db),
        settings.indexing.clone(),
    )?;

    let report = indexer.rebuild(&records).await?;
    store.ensure_ann_index(ANN_MIN_ROWS).await?;

    println!("Indexed {} of {} products into '{}'", report.indexed, report.total, store.table_name());
    if !report.skipped.is_empty() {
        println!("Skipped {}:", report.skipped.len());
        for s in &report.skipped {
            println!("  {}: {}", s.id, s.reason);
        }
    }
    Ok(())
}
