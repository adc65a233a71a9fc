//! Multimodal embedders: CLIP on candle, plus a deterministic fake.

pub mod clip;
pub mod device;
pub mod fake;
pub mod preprocess;
pub mod tokenize;

use std::sync::Arc;
use tracing::info;

use shopsearch_core::config::Settings;
use shopsearch_core::traits::Embedder;
use shopsearch_core::Result;

pub use clip::ClipEmbedder;
pub use fake::FakeEmbedder;

/// Output dimension of CLIP ViT-B/32.
pub const CLIP_DIM: usize = 512;

/// Scales `v` to unit length; an all-zero vector is returned unchanged.
pub fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

/// Builds the process-wide embedder. Construction failure is fatal for the
/// caller: a process without an embedder cannot serve searches.
pub fn default_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    if settings.use_fake_models() {
        info!("using FakeEmbedder");
        return Ok(Arc::new(FakeEmbedder::new(CLIP_DIM)));
    }
    let dir = settings.paths.resolve(&settings.paths.clip_model_dir);
    Ok(Arc::new(ClipEmbedder::load(&dir, device::select_device())?))
}
