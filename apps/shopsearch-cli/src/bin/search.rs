use anyhow::Context;
use clap::{ArgGroup, Parser};
use std::path::PathBuf;
use std::sync::Arc;

use shopsearch_core::types::Query;
use shopsearch_embed::default_embedder;
use shopsearch_engine::ProductSearch;
use shopsearch_rerank::default_reranker;
use shopsearch_vector::LanceVectorStore;

/// Search the product index by text or by an example photo.
#[derive(Parser, Debug)]
#[command(name = "shopsearch-search", version)]
#[command(group(ArgGroup::new("query").required(true).args(["text", "image"])))]
struct Args {
    /// Free-text description of the product
    #[arg(long)]
    text: Option<String>,

    /// Path to a photo of the product
    #[arg(long)]
    image: Option<PathBuf>,

    /// Maximum results shown (defaults to search.top_k_final)
    #[arg(long)]
    top_k: Option<usize>,

    /// Candidates retrieved before reranking (defaults to search.top_k_retrieval)
    #[arg(long)]
    retrieve: Option<usize>,

    /// LanceDB directory (defaults to paths.vector_db_dir)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Use the deterministic hashing models
    #[arg(long)]
    fake: bool,

    /// Keep retrieval order for text queries
    #[arg(long)]
    no_rerank: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shopsearch_cli::init_tracing();
    let args = Args::parse();
    let mut settings = shopsearch_cli::load_settings(args.fake)?;
    if args.no_rerank {
        settings.search.rerank = false;
    }

    let query = match (args.text, args.image) {
        (Some(text), None) => Query::text(text),
        (None, Some(path)) => Query::image(path),
        _ => anyhow::bail!("pass exactly one of --text or --image"),
    };

    let db = args.db.unwrap_or_else(|| settings.paths.resolve(&settings.paths.vector_db_dir));
    let embedder = default_embedder(&settings)?;
    let store = Arc::new(LanceVectorStore::open(&db, &settings.paths.table_name, embedder.dim()).await?);
    let reranker = default_reranker(&settings)?;
    let search = ProductSearch::new(embedder, store, reranker, settings.search.clone())?;

    let retrieve = args.retrieve.unwrap_or(settings.search.top_k_retrieval);
    let top_k = args.top_k.unwrap_or(settings.search.top_k_final);
    let result = search.search_with(&query, retrieve, top_k).await.context("search failed")?;

    if result.is_no_match() {
        println!("No confident match for this {:?} query.", result.modality);
        return Ok(());
    }
    for (rank, c) in result.candidates.iter().enumerate() {
        let score = match c.rerank_score {
            Some(r) => format!("rerank {r:.3}, sim {:.3}", c.similarity),
            None => format!("sim {:.3}", c.similarity),
        };
        println!("{:>2}. [{score}] {} ({})", rank + 1, c.metadata.title, c.metadata.image_relative_path);
    }
    Ok(())
}
