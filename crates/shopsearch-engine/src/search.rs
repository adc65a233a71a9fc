//! Online search path: embed, retrieve, rerank (text only), filter.

use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use shopsearch_core::config::SearchSettings;
use shopsearch_core::traits::{Embedder, Reranker, VectorStore};
use shopsearch_core::types::{Candidate, Query, SearchResult};
use shopsearch_core::{Error, Result};

use crate::filter::ConfidencePolicy;

/// Holds the long-lived models and the index; construct once, search many
/// times. Safe to share across tasks.
pub struct ProductSearch {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    reranker: Option<Arc<dyn Reranker>>,
    settings: SearchSettings,
    policy: ConfidencePolicy,
}

impl ProductSearch {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        reranker: Option<Arc<dyn Reranker>>,
        settings: SearchSettings,
    ) -> Result<Self> {
        settings.validate()?;
        if embedder.dim() != store.dim() {
            return Err(Error::IndexConsistency(format!(
                "embedder '{}' produces {} dimensions but the index holds {}",
                embedder.model_id(),
                embedder.dim(),
                store.dim()
            )));
        }
        let policy = ConfidencePolicy::from_settings(&settings);
        Ok(Self { embedder, store, reranker, settings, policy })
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub fn policy(&self) -> &ConfidencePolicy {
        &self.policy
    }

    pub async fn search(&self, query: &Query) -> Result<SearchResult> {
        self.search_with(query, self.settings.top_k_retrieval, self.settings.top_k_final)
            .await
    }

    /// Runs one query with explicit K values. An empty result means no
    /// candidate was confident enough; errors mean the search itself failed.
    pub async fn search_with(
        &self,
        query: &Query,
        top_k_retrieval: usize,
        top_k_final: usize,
    ) -> Result<SearchResult> {
        let modality = query.modality();
        if top_k_retrieval == 0 || top_k_final == 0 {
            return Ok(SearchResult::empty(modality));
        }
        let start = Instant::now();

        let vector = self.embed_query(query).await?;
        let candidates = self.retrieve(&vector, top_k_retrieval).await?;
        let retrieved = candidates.len();

        let candidates = match query {
            Query::Text(text) => self.rerank(text, candidates).await,
            Query::Image(_) => candidates,
        };

        let candidates = self.policy.apply(modality, candidates, top_k_final);
        info!(
            ?modality,
            retrieved,
            returned = candidates.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "search finished"
        );
        Ok(SearchResult { modality, candidates })
    }

    async fn embed_query(&self, query: &Query) -> Result<Vec<f32>> {
        let embedder = Arc::clone(&self.embedder);
        let owned = query.clone();
        let task = tokio::task::spawn_blocking(move || embedder.encode(&owned.as_embed_input()));
        let vector = timeout(self.settings.embed_timeout(), task)
            .await
            .map_err(|_| {
                Error::Retrieval(format!(
                    "query embedding timed out after {} ms",
                    self.settings.embed_timeout_ms
                ))
            })?
            .map_err(|e| Error::Retrieval(format!("query embedding task failed: {e}")))??;
        if vector.len() != self.store.dim() {
            return Err(Error::Retrieval(format!(
                "query embedding has dimension {}, index expects {}",
                vector.len(),
                self.store.dim()
            )));
        }
        Ok(vector)
    }

    async fn retrieve(&self, vector: &[f32], k: usize) -> Result<Vec<Candidate>> {
        let matches = timeout(self.settings.query_timeout(), self.store.query(vector, k))
            .await
            .map_err(|_| {
                Error::Retrieval(format!("index query timed out after {} ms", self.settings.query_timeout_ms))
            })?
            .map_err(|e| match e {
                Error::Retrieval(_) => e,
                other => Error::Retrieval(format!("index query failed: {other}")),
            })?;
        debug!(hits = matches.len(), "retrieved");
        Ok(matches
            .into_iter()
            .enumerate()
            .map(|(i, m)| Candidate::from_match(m, i + 1))
            .collect())
    }

    /// Reorders text candidates by cross-encoder score. Any reranker problem
    /// leaves the retrieval order untouched.
    async fn rerank(&self, query: &str, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
        let Some(reranker) = self.reranker.as_ref().map(Arc::clone) else {
            return candidates;
        };
        if candidates.is_empty() {
            return candidates;
        }
        let docs: Vec<String> = candidates.iter().map(|c| c.metadata.description.clone()).collect();
        let query = query.to_string();
        let task = tokio::task::spawn_blocking(move || reranker.score_batch(&query, &docs));

        let scores = match timeout(self.settings.rerank_timeout(), task).await {
            Ok(Ok(Ok(scores))) if scores.len() == candidates.len() => scores,
            Ok(Ok(Ok(scores))) => {
                warn!(
                    expected = candidates.len(),
                    got = scores.len(),
                    "reranker returned wrong number of scores; keeping retrieval order"
                );
                return candidates;
            }
            Ok(Ok(Err(e))) => {
                warn!(error = %e, "rerank failed; keeping retrieval order");
                return candidates;
            }
            Ok(Err(e)) => {
                warn!(error = %e, "rerank task failed; keeping retrieval order");
                return candidates;
            }
            Err(_) => {
                warn!(timeout_ms = self.settings.rerank_timeout_ms, "rerank timed out; keeping retrieval order");
                return candidates;
            }
        };

        for (c, s) in candidates.iter_mut().zip(scores) {
            c.rerank_score = Some(s);
        }
        // stable: equal scores keep retrieval order
        candidates.sort_by(|a, b| b.score().total_cmp(&a.score()));
        candidates
    }
}

impl std::fmt::Debug for ProductSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductSearch")
            .field("embedder", &self.embedder.model_id())
            .field("reranker", &self.reranker.as_ref().map(|r| r.model_id().to_string()))
            .field("dim", &self.store.dim())
            .field("policy", &self.policy)
            .finish()
    }
}

