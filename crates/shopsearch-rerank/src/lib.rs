//! Text relevance rerankers: a BERT cross-encoder on candle and a
//! deterministic token-overlap fake.

pub mod cross_encoder;
pub mod fake;

use std::sync::Arc;
use tracing::info;

use shopsearch_core::config::Settings;
use shopsearch_core::traits::Reranker;
use shopsearch_core::Result;

pub use cross_encoder::CrossEncoderReranker;
pub use fake::FakeReranker;

/// Builds the process-wide reranker, or `None` when reranking is disabled.
pub fn default_reranker(settings: &Settings) -> Result<Option<Arc<dyn Reranker>>> {
    if !settings.search.rerank {
        info!("reranking disabled");
        return Ok(None);
    }
    if settings.use_fake_models() {
        info!("using FakeReranker");
        return Ok(Some(Arc::new(FakeReranker::new())));
    }
    let dir = settings.paths.resolve(&settings.paths.reranker_model_dir);
    let device = shopsearch_embed::device::select_device();
    Ok(Some(Arc::new(CrossEncoderReranker::load(&dir, device)?)))
}
