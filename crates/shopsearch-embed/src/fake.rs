use std::hash::Hasher;
use twox_hash::XxHash64;

use shopsearch_core::traits::Embedder;
use shopsearch_core::types::EmbedInput;
use shopsearch_core::Result;

use crate::preprocess::load_image;

/// Deterministic hashing embedder for tests and model-free runs.
///
/// Text: each whitespace token is hashed into one bucket. Image: the file is
/// really decoded (so corrupt images fail like they would with CLIP), then a
/// 16x16 RGB thumbnail is hashed into buckets. Identical images map to
/// identical vectors. There is no cross-modal semantics.
pub struct FakeEmbedder {
    dim: usize,
    id: String,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, id: format!("fake:d{dim}") }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let h = hash_bytes(token.to_lowercase().as_bytes(), 0);
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        v
    }

    fn embed_pixels(&self, pixels: &[u8]) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, chunk) in pixels.chunks(3).enumerate() {
            let h = hash_bytes(chunk, i as u64);
            v[(h as usize) % self.dim] += 1.0;
        }
        v
    }
}

fn hash_bytes(bytes: &[u8], seed: u64) -> u64 {
    let mut hasher = XxHash64::with_seed(seed);
    hasher.write(bytes);
    hasher.finish()
}

impl Embedder for FakeEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn model_id(&self) -> &str {
        &self.id
    }

    fn encode(&self, input: &EmbedInput<'_>) -> Result<Vec<f32>> {
        let v = match input {
            EmbedInput::Text(text) => self.embed_text(text),
            EmbedInput::Image(path) => {
                let thumb = load_image(path)?.thumbnail_exact(16, 16).to_rgb8();
                self.embed_pixels(thumb.as_raw())
            }
        };
        Ok(crate::l2_normalize(v))
    }
}
