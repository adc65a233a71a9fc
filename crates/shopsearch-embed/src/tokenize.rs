use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

use shopsearch_core::{Error, Result};

/// Tokenizes one text into a `[1, T]` id tensor, truncated to `max_len`.
///
/// CLIP pools at the end-of-text token, so no padding is added for a single
/// sequence.
pub fn tokenize_on_device(tokenizer: &Tokenizer, text: &str, max_len: usize, device: &Device) -> Result<Tensor> {
    let enc = tokenizer
        .encode(text, true)
        .map_err(|e| Error::Encoding(format!("tokenization failed: {e}")))?;
    let mut ids = enc.get_ids().to_vec();
    if ids.len() > max_len {
        // keep the trailing end-of-text token the text model pools on
        let eot = ids[ids.len() - 1];
        ids.truncate(max_len);
        ids[max_len - 1] = eot;
    }
    if ids.is_empty() {
        return Err(Error::Encoding("text produced no tokens".to_string()));
    }
    let len = ids.len();
    Tensor::from_vec(ids, (1, len), device).map_err(|e| Error::Encoding(e.to_string()))
}
