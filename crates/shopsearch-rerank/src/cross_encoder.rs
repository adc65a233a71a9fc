//! ms-marco MiniLM cross-encoder on candle.
//!
//! Query and candidate text are encoded together as one BERT pair; the
//! pooled `[CLS]` state goes through a single-logit classification head and
//! a sigmoid, so scores fall in (0, 1).

use candle_core::{DType, Device, IndexOp, Module, Tensor};
use candle_nn::{Linear, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use serde::Deserialize;
use std::path::Path;
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use shopsearch_core::traits::Reranker;
use shopsearch_core::{Error, Result};

const MAX_PAIR_TOKENS: usize = 512;

#[derive(Deserialize)]
struct HeadConfig {
    hidden_size: usize,
}

pub struct CrossEncoderReranker {
    bert: BertModel,
    pooler: Linear,
    classifier: Linear,
    tokenizer: Tokenizer,
    device: Device,
    id: String,
}

impl CrossEncoderReranker {
    /// Loads `config.json`, `tokenizer.json` and `model.safetensors` from `model_dir`.
    pub fn load(model_dir: &Path, device: Device) -> Result<Self> {
        let start = Instant::now();
        info!(dir = %model_dir.display(), "loading cross-encoder");

        let config_path = model_dir.join("config.json");
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| Error::Model(format!("{}: {e}", config_path.display())))?;
        let config: BertConfig = serde_json::from_str(&raw)
            .map_err(|e| Error::Model(format!("{}: {e}", config_path.display())))?;
        let head: HeadConfig = serde_json::from_str(&raw)
            .map_err(|e| Error::Model(format!("{}: {e}", config_path.display())))?;

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| Error::Model(format!("tokenizer {}: {e}", tokenizer_path.display())))?;

        let weights_path = model_dir.join("model.safetensors");
        let model_err = |e: candle_core::Error| Error::Model(format!("cross-encoder weights {}: {e}", weights_path.display()));
        let weights = candle_core::safetensors::load(&weights_path, &device).map_err(model_err)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);

        let bert = BertModel::load(vb.pp("bert"), &config).map_err(model_err)?;
        let pooler = candle_nn::linear(head.hidden_size, head.hidden_size, vb.pp("bert.pooler.dense")).map_err(model_err)?;
        let classifier = candle_nn::linear(head.hidden_size, 1, vb.pp("classifier")).map_err(model_err)?;

        info!(elapsed_ms = start.elapsed().as_millis() as u64, "cross-encoder loaded");
        Ok(Self {
            bert,
            pooler,
            classifier,
            tokenizer,
            device,
            id: "ms-marco-MiniLM-L-6-v2".to_string(),
        })
    }

    /// Tokenizes all pairs and pads them to the longest one: `(ids, type_ids, mask)`, each `[B, T]`.
    fn encode_pairs(&self, query: &str, docs: &[String]) -> Result<(Tensor, Tensor, Tensor)> {
        let mut rows = Vec::with_capacity(docs.len());
        for doc in docs {
            let enc = self
                .tokenizer
                .encode((query, doc.as_str()), true)
                .map_err(|e| Error::Rerank(format!("tokenization failed: {e}")))?;
            let mut ids = enc.get_ids().to_vec();
            let mut types = enc.get_type_ids().to_vec();
            let mut mask = enc.get_attention_mask().to_vec();
            if ids.len() > MAX_PAIR_TOKENS {
                ids.truncate(MAX_PAIR_TOKENS);
                types.truncate(MAX_PAIR_TOKENS);
                mask.truncate(MAX_PAIR_TOKENS);
            }
            rows.push((ids, types, mask));
        }
        let width = rows.iter().map(|r| r.0.len()).max().unwrap_or(0);
        let batch = rows.len();
        let (mut ids, mut types, mut mask) = (
            Vec::with_capacity(batch * width),
            Vec::with_capacity(batch * width),
            Vec::with_capacity(batch * width),
        );
        for (i, t, m) in rows {
            let pad = width - i.len();
            ids.extend(i.into_iter().chain(std::iter::repeat(0).take(pad)));
            types.extend(t.into_iter().chain(std::iter::repeat(0).take(pad)));
            mask.extend(m.into_iter().chain(std::iter::repeat(0).take(pad)));
        }
        let shape = (batch, width);
        Ok((
            Tensor::from_vec(ids, shape, &self.device).map_err(rerank)?,
            Tensor::from_vec(types, shape, &self.device).map_err(rerank)?,
            Tensor::from_vec(mask, shape, &self.device).map_err(rerank)?,
        ))
    }
}

fn rerank(e: candle_core::Error) -> Error {
    Error::Rerank(e.to_string())
}

impl Reranker for CrossEncoderReranker {
    fn model_id(&self) -> &str {
        &self.id
    }

    fn score_batch(&self, query: &str, docs: &[String]) -> Result<Vec<f32>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let (ids, types, mask) = self.encode_pairs(query, docs)?;
        let hidden = self.bert.forward(&ids, &types, Some(&mask)).map_err(rerank)?;
        let cls = hidden.i((.., 0)).map_err(rerank)?;
        let pooled = self.pooler.forward(&cls).and_then(|t| t.tanh()).map_err(rerank)?;
        let logits = self.classifier.forward(&pooled).and_then(|t| t.squeeze(1)).map_err(rerank)?;
        let scores: Vec<f32> = candle_nn::ops::sigmoid(&logits)
            .and_then(|t| t.to_device(&Device::Cpu))
            .and_then(|t| t.to_vec1())
            .map_err(rerank)?;
        debug!(pairs = docs.len(), elapsed_ms = start.elapsed().as_millis() as u64, "reranked");
        Ok(scores)
    }
}
