//! CLIP ViT-B/32 embedder on candle.
//!
//! Text and images are projected into the same 512-d space and
//! L2-normalized, so cosine similarity compares a text query against
//! image-indexed products.

use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{Linear, VarBuilder};
use candle_transformers::models::clip::{self, ClipConfig};
use std::path::Path;
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use shopsearch_core::traits::Embedder;
use shopsearch_core::types::EmbedInput;
use shopsearch_core::{Error, Result};

use crate::preprocess::{load_image, to_clip_tensor};
use crate::tokenize::tokenize_on_device;

pub struct ClipEmbedder {
    text_model: clip::text_model::ClipTextTransformer,
    vision_model: clip::vision_model::ClipVisionTransformer,
    text_projection: Linear,
    visual_projection: Linear,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_tokens: usize,
    image_size: usize,
    id: String,
}

impl ClipEmbedder {
    /// Loads `tokenizer.json` and `model.safetensors` from `model_dir`.
    pub fn load(model_dir: &Path, device: Device) -> Result<Self> {
        let start = Instant::now();
        info!(dir = %model_dir.display(), "loading CLIP model");
        let config = ClipConfig::vit_base_patch32();

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| Error::Model(format!("tokenizer {}: {e}", tokenizer_path.display())))?;

        let weights_path = model_dir.join("model.safetensors");
        let model_err = |e: candle_core::Error| Error::Model(format!("CLIP weights {}: {e}", weights_path.display()));
        let weights = candle_core::safetensors::load(&weights_path, &device).map_err(model_err)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);

        let text_model = clip::text_model::ClipTextTransformer::new(vb.pp("text_model"), &config.text_config)
            .map_err(model_err)?;
        let vision_model = clip::vision_model::ClipVisionTransformer::new(vb.pp("vision_model"), &config.vision_config)
            .map_err(model_err)?;
        let dim = config.text_config.projection_dim;
        let text_projection = candle_nn::linear_no_bias(config.text_config.embed_dim, dim, vb.pp("text_projection"))
            .map_err(model_err)?;
        let visual_projection = candle_nn::linear_no_bias(config.vision_config.embed_dim, dim, vb.pp("visual_projection"))
            .map_err(model_err)?;

        info!(dim, elapsed_ms = start.elapsed().as_millis() as u64, "CLIP model loaded");
        Ok(Self {
            text_model,
            vision_model,
            text_projection,
            visual_projection,
            tokenizer,
            device,
            dim,
            max_tokens: config.text_config.max_position_embeddings,
            image_size: config.vision_config.image_size,
            id: format!("clip-vit-base-patch32:d{dim}"),
        })
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let ids = tokenize_on_device(&self.tokenizer, text, self.max_tokens, &self.device)?;
        let features = self.text_model.forward(&ids).map_err(encoding)?;
        let projected = self.text_projection.forward(&features).map_err(encoding)?;
        self.finish(&projected)
    }

    fn embed_image(&self, path: &Path) -> Result<Vec<f32>> {
        let img = load_image(path)?;
        let pixels = to_clip_tensor(&img, self.image_size, &self.device)?;
        let features = self.vision_model.forward(&pixels).map_err(encoding)?;
        let projected = self.visual_projection.forward(&features).map_err(encoding)?;
        self.finish(&projected)
    }

    fn finish(&self, projected: &Tensor) -> Result<Vec<f32>> {
        let v: Vec<f32> = projected
            .to_device(&Device::Cpu)
            .and_then(|t| t.squeeze(0))
            .and_then(|t| t.to_vec1())
            .map_err(encoding)?;
        if v.len() != self.dim {
            return Err(Error::Encoding(format!("CLIP returned {} values, expected {}", v.len(), self.dim)));
        }
        Ok(crate::l2_normalize(v))
    }
}

fn encoding(e: candle_core::Error) -> Error {
    Error::Encoding(e.to_string())
}

impl Embedder for ClipEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn model_id(&self) -> &str {
        &self.id
    }

    fn encode(&self, input: &EmbedInput<'_>) -> Result<Vec<f32>> {
        let start = Instant::now();
        let v = match input {
            EmbedInput::Text(text) => self.embed_text(text)?,
            EmbedInput::Image(path) => self.embed_image(path)?,
        };
        debug!(modality = ?input.modality(), elapsed_ms = start.elapsed().as_millis() as u64, "encoded");
        Ok(v)
    }
}
