use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use shopsearch_core::config::SearchSettings;
use shopsearch_core::traits::{Embedder, Reranker, VectorStore};
use shopsearch_core::types::{EmbedInput, IndexedVector, Modality, ProductMetadata, Query, VectorMatch};
use shopsearch_core::{Error, Result};
use shopsearch_embed::FakeEmbedder;
use shopsearch_engine::ProductSearch;
use shopsearch_vector::{LanceVectorStore, MemoryVectorStore};

const DIM: usize = 4;

/// Looks vectors up by query text or image file name and counts calls.
struct ScriptedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedEmbedder {
    fn new() -> Self {
        let mut vectors = HashMap::new();
        vectors.insert("smart speaker".to_string(), vec![1.0, 0.0, 0.0, 0.0]);
        vectors.insert("nothing like it".to_string(), vec![0.0, 0.0, 0.0, 1.0]);
        vectors.insert("speaker_photo.png".to_string(), vec![0.95, 0.3122, 0.0, 0.0]);
        Self { vectors, delay: None, calls: AtomicUsize::new(0) }
    }

    fn slow(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::new() }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for ScriptedEmbedder {
    fn dim(&self) -> usize {
        DIM
    }

    fn model_id(&self) -> &str {
        "scripted"
    }

    fn encode(&self, input: &EmbedInput<'_>) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            std::thread::sleep(d);
        }
        let key = match input {
            EmbedInput::Text(t) => t.to_string(),
            EmbedInput::Image(p) => p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
        };
        self.vectors.get(&key).cloned().ok_or_else(|| Error::Encoding(format!("unknown input {key}")))
    }
}

/// Scores documents from a fixed table.
struct ScriptedReranker {
    scores: HashMap<String, f32>,
    fail: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedReranker {
    fn new(pairs: &[(&str, f32)]) -> Self {
        Self {
            scores: pairs.iter().map(|(d, s)| (d.to_string(), *s)).collect(),
            fail: false,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Reranker for ScriptedReranker {
    fn model_id(&self) -> &str {
        "scripted-reranker"
    }

    fn score_batch(&self, _query: &str, docs: &[String]) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            std::thread::sleep(d);
        }
        if self.fail {
            return Err(Error::Rerank("model exploded".to_string()));
        }
        Ok(docs.iter().map(|d| self.scores.get(d).copied().unwrap_or(0.0)).collect())
    }
}

/// A store whose queries fail or hang.
struct BrokenStore {
    hang: bool,
}

#[async_trait]
impl VectorStore for BrokenStore {
    fn dim(&self) -> usize {
        DIM
    }

    async fn upsert_batch(&self, _records: &[IndexedVector]) -> Result<()> {
        Ok(())
    }

    async fn query(&self, _vector: &[f32], _k: usize) -> Result<Vec<VectorMatch>> {
        if self.hang {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        Err(Error::Model("table files are gone".to_string()))
    }

    async fn count(&self) -> Result<usize> {
        Ok(0)
    }

    async fn clear(&self) -> Result<()> {
        Ok(())
    }
}

fn product(id: &str, description: &str, vector: [f32; DIM]) -> IndexedVector {
    IndexedVector {
        id: id.to_string(),
        vector: vector.to_vec(),
        metadata: ProductMetadata {
            title: id.to_string(),
            category: Some("Electronics".to_string()),
            brand: Some("Amazon".to_string()),
            description: description.to_string(),
            rag_context: None,
            image_relative_path: format!("images/{id}.jpg"),
        },
    }
}

async fn catalog_store() -> Arc<MemoryVectorStore> {
    let store = MemoryVectorStore::new(DIM);
    store
        .upsert_batch(&[
            product("echo", "smart speaker with alexa", [1.0, 0.0, 0.0, 0.0]),
            product("kindle", "e-reader with glare-free display", [0.0, 1.0, 0.0, 0.0]),
            product("firetv", "streaming stick with voice remote", [0.8, 0.6, 0.0, 0.0]),
        ])
        .await
        .unwrap();
    Arc::new(store)
}

fn fast_settings() -> SearchSettings {
    SearchSettings { embed_timeout_ms: 200, query_timeout_ms: 200, rerank_timeout_ms: 200, ..SearchSettings::default() }
}

#[tokio::test]
async fn text_query_without_reranker_keeps_dominant_leader() {
    let embedder = Arc::new(ScriptedEmbedder::new());
    let search = ProductSearch::new(embedder.clone(), catalog_store().await, None, SearchSettings::default()).unwrap();

    let result = search.search(&Query::text("smart speaker")).await.expect("search");
    assert_eq!(result.modality, Modality::Text);
    // echo 1.0 vs firetv 0.8: gap above the margin
    assert_eq!(result.ids(), vec!["echo"]);
    assert_eq!(result.candidates[0].retrieval_rank, 1);
    assert!(result.candidates[0].rerank_score.is_none());
    assert_eq!(embedder.calls(), 1, "query embedded exactly once");
}

#[tokio::test]
async fn reranker_reorders_text_candidates() {
    let reranker = Arc::new(ScriptedReranker::new(&[
        ("streaming stick with voice remote", 0.9),
        ("smart speaker with alexa", 0.85),
        ("e-reader with glare-free display", 0.1),
    ]));
    let search = ProductSearch::new(
        Arc::new(ScriptedEmbedder::new()),
        catalog_store().await,
        Some(reranker.clone() as Arc<dyn Reranker>),
        SearchSettings::default(),
    )
    .unwrap();

    let result = search.search(&Query::text("smart speaker")).await.unwrap();
    assert_eq!(result.ids(), vec!["firetv", "echo"]);
    assert_eq!(result.candidates[0].rerank_score, Some(0.9));
    assert_eq!(result.candidates[0].retrieval_rank, 2);
    assert_eq!(reranker.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn equal_rerank_scores_keep_retrieval_order() {
    let reranker = Arc::new(ScriptedReranker::new(&[
        ("streaming stick with voice remote", 0.5),
        ("smart speaker with alexa", 0.5),
        ("e-reader with glare-free display", 0.5),
    ]));
    let search = ProductSearch::new(
        Arc::new(ScriptedEmbedder::new()),
        catalog_store().await,
        Some(reranker as Arc<dyn Reranker>),
        SearchSettings::default(),
    )
    .unwrap();

    let result = search.search(&Query::text("smart speaker")).await.unwrap();
    assert_eq!(result.ids(), vec!["echo", "firetv", "kindle"]);
}

#[tokio::test]
async fn image_query_skips_reranker_and_uses_image_floor() {
    let reranker = Arc::new(ScriptedReranker::new(&[]));
    let search = ProductSearch::new(
        Arc::new(ScriptedEmbedder::new()),
        catalog_store().await,
        Some(reranker.clone() as Arc<dyn Reranker>),
        SearchSettings::default(),
    )
    .unwrap();

    let result = search.search(&Query::image("uploads/speaker_photo.png")).await.unwrap();
    assert_eq!(result.modality, Modality::Image);
    // kindle's ~0.31 would clear the text floor but not the image floor
    assert_eq!(result.ids(), vec!["echo", "firetv"]);
    assert!(result.candidates.iter().all(|c| c.score() >= 0.60));
    assert_eq!(reranker.calls.load(Ordering::SeqCst), 0, "image queries are never reranked");
}

#[tokio::test]
async fn text_that_looks_like_a_filename_stays_text() {
    let embedder = Arc::new(ScriptedEmbedder::new());
    let search = ProductSearch::new(embedder, catalog_store().await, None, SearchSettings::default()).unwrap();
    // embedded as the literal string; no file is opened
    let result = search.search(&Query::text("speaker_photo.png")).await.unwrap();
    assert_eq!(result.modality, Modality::Text);
    assert_eq!(result.ids(), vec!["echo", "firetv", "kindle"]);
}

#[tokio::test]
async fn failing_reranker_falls_back_to_retrieval_order() {
    let mut failing = ScriptedReranker::new(&[]);
    failing.fail = true;
    let search = ProductSearch::new(
        Arc::new(ScriptedEmbedder::new()),
        catalog_store().await,
        Some(Arc::new(failing) as Arc<dyn Reranker>),
        SearchSettings::default(),
    )
    .unwrap();

    let result = search.search(&Query::text("smart speaker")).await.unwrap();
    assert_eq!(result.ids(), vec!["echo"]);
    assert!(result.candidates[0].rerank_score.is_none());
}

#[tokio::test]
async fn slow_reranker_times_out_into_fallback() {
    let mut slow = ScriptedReranker::new(&[("streaming stick with voice remote", 0.99)]);
    slow.delay = Some(Duration::from_millis(1000));
    let search = ProductSearch::new(
        Arc::new(ScriptedEmbedder::new()),
        catalog_store().await,
        Some(Arc::new(slow) as Arc<dyn Reranker>),
        fast_settings(),
    )
    .unwrap();

    let result = search.search(&Query::text("smart speaker")).await.unwrap();
    assert_eq!(result.ids(), vec!["echo"]);
}

#[tokio::test]
async fn store_failure_is_retrieval_error() {
    let search = ProductSearch::new(
        Arc::new(ScriptedEmbedder::new()),
        Arc::new(BrokenStore { hang: false }),
        None,
        SearchSettings::default(),
    )
    .unwrap();
    let err = search.search(&Query::text("smart speaker")).await.unwrap_err();
    assert!(err.is_retrieval(), "got {err:?}");
}

#[tokio::test]
async fn store_timeout_is_retrieval_error() {
    let search = ProductSearch::new(
        Arc::new(ScriptedEmbedder::new()),
        Arc::new(BrokenStore { hang: true }),
        None,
        fast_settings(),
    )
    .unwrap();
    let err = search.search(&Query::text("smart speaker")).await.unwrap_err();
    assert!(err.is_retrieval(), "got {err:?}");
}

#[tokio::test]
async fn embed_timeout_is_retrieval_error() {
    let search = ProductSearch::new(
        Arc::new(ScriptedEmbedder::slow(Duration::from_millis(1000))),
        catalog_store().await,
        None,
        fast_settings(),
    )
    .unwrap();
    let err = search.search(&Query::text("smart speaker")).await.unwrap_err();
    assert!(err.is_retrieval(), "got {err:?}");
}

#[tokio::test]
async fn corrupt_query_image_is_encoding_error() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("upload.jpg");
    std::fs::write(&path, b"\xff\xd8 truncated").unwrap();

    let search = ProductSearch::new(
        Arc::new(FakeEmbedder::new(DIM)),
        Arc::new(MemoryVectorStore::new(DIM)),
        None,
        SearchSettings::default(),
    )
    .unwrap();
    let err = search.search(&Query::image(path)).await.unwrap_err();
    assert!(err.is_encoding(), "got {err:?}");
}

#[tokio::test]
async fn empty_index_yields_no_match() {
    let embedder = Arc::new(ScriptedEmbedder::new());
    let reranker = Arc::new(ScriptedReranker::new(&[]));
    let search = ProductSearch::new(
        embedder.clone(),
        Arc::new(MemoryVectorStore::new(DIM)),
        Some(reranker.clone() as Arc<dyn Reranker>),
        SearchSettings::default(),
    )
    .unwrap();
    let result = search.search(&Query::text("smart speaker")).await.unwrap();
    assert!(result.is_no_match());
    assert_eq!(result.modality, Modality::Text);
    assert_eq!(embedder.calls(), 1, "embedded once, no retry on an empty result");
    assert_eq!(reranker.calls.load(Ordering::SeqCst), 0, "nothing to rerank");
}

async fn assert_repeatable(store: Arc<dyn VectorStore>) {
    let reranker = Arc::new(ScriptedReranker::new(&[
        ("streaming stick with voice remote", 0.5),
        ("smart speaker with alexa", 0.5),
        ("e-reader with glare-free display", 0.45),
    ]));
    let search =
        ProductSearch::new(Arc::new(ScriptedEmbedder::new()), store, Some(reranker as Arc<dyn Reranker>), SearchSettings::default())
            .unwrap();

    for query in [Query::text("smart speaker"), Query::image("speaker_photo.png")] {
        let first = search.search(&query).await.unwrap();
        let second = search.search(&query).await.unwrap();
        assert!(!first.is_empty());
        assert_eq!(first.ids(), second.ids());
        let scores = |r: &shopsearch_core::types::SearchResult| r.candidates.iter().map(|c| c.score()).collect::<Vec<_>>();
        assert_eq!(scores(&first), scores(&second));
        assert_eq!(first, second);
    }
}

#[tokio::test]
async fn repeated_search_is_deterministic_on_memory_store() {
    assert_repeatable(catalog_store().await).await;
}

#[tokio::test]
async fn repeated_search_is_deterministic_on_lance_store() {
    let tmp = TempDir::new().unwrap();
    let store = LanceVectorStore::open(tmp.path(), "products", DIM).await.unwrap();
    store
        .upsert_batch(&[
            product("echo", "smart speaker with alexa", [1.0, 0.0, 0.0, 0.0]),
            product("kindle", "e-reader with glare-free display", [0.0, 1.0, 0.0, 0.0]),
            product("firetv", "streaming stick with voice remote", [0.8, 0.6, 0.0, 0.0]),
        ])
        .await
        .unwrap();
    assert_repeatable(Arc::new(store)).await;
}

#[tokio::test]
async fn unrelated_query_yields_no_match() {
    let search = ProductSearch::new(
        Arc::new(ScriptedEmbedder::new()),
        catalog_store().await,
        None,
        SearchSettings::default(),
    )
    .unwrap();
    let result = search.search(&Query::text("nothing like it")).await.unwrap();
    assert!(result.is_no_match());
}

#[tokio::test]
async fn zero_k_returns_empty_without_embedding() {
    let embedder = Arc::new(ScriptedEmbedder::new());
    let search = ProductSearch::new(embedder.clone(), catalog_store().await, None, SearchSettings::default()).unwrap();

    assert!(search.search_with(&Query::text("smart speaker"), 20, 0).await.unwrap().is_empty());
    assert!(search.search_with(&Query::text("smart speaker"), 0, 5).await.unwrap().is_empty());
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn retrieval_k_bounds_candidates() {
    let reranker = Arc::new(ScriptedReranker::new(&[
        ("streaming stick with voice remote", 0.5),
        ("smart speaker with alexa", 0.5),
        ("e-reader with glare-free display", 0.5),
    ]));
    let search = ProductSearch::new(
        Arc::new(ScriptedEmbedder::new()),
        catalog_store().await,
        Some(reranker as Arc<dyn Reranker>),
        SearchSettings::default(),
    )
    .unwrap();
    let result = search.search_with(&Query::text("smart speaker"), 2, 5).await.unwrap();
    assert_eq!(result.ids(), vec!["echo", "firetv"]);
}

#[tokio::test]
async fn mismatched_dimensions_are_refused_up_front() {
    let err = ProductSearch::new(
        Arc::new(FakeEmbedder::new(8)),
        Arc::new(MemoryVectorStore::new(DIM)),
        None,
        SearchSettings::default(),
    )
    .unwrap_err();
    assert!(err.is_index_consistency());
}

#[test]
fn scripted_image_lookup_uses_file_name() {
    let e = ScriptedEmbedder::new();
    let v = e.encode(&EmbedInput::Image(Path::new("/any/dir/speaker_photo.png"))).unwrap();
    assert_eq!(v.len(), DIM);
}
