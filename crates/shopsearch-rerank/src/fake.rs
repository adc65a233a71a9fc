use std::collections::HashSet;

use shopsearch_core::traits::Reranker;
use shopsearch_core::Result;

/// Scores a pair by the fraction of distinct query tokens found in the
/// document (case-insensitive). Always in `[0, 1]`.
#[derive(Debug, Default)]
pub struct FakeReranker;

impl FakeReranker {
    pub fn new() -> Self {
        Self
    }
}

fn tokens(s: &str) -> HashSet<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

impl Reranker for FakeReranker {
    fn model_id(&self) -> &str {
        "fake-overlap"
    }

    fn score_batch(&self, query: &str, docs: &[String]) -> Result<Vec<f32>> {
        let q = tokens(query);
        if q.is_empty() {
            return Ok(vec![0.0; docs.len()]);
        }
        Ok(docs
            .iter()
            .map(|d| {
                let d = tokens(d);
                q.iter().filter(|t| d.contains(*t)).count() as f32 / q.len() as f32
            })
            .collect())
    }
}
