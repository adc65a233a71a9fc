//! Domain types shared by the indexer, the vector stores and the search path.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub type ProductId = String;

/// A normalized catalog row as produced by ingestion.
///
/// - `id`: stable catalog identifier, unique across the catalog
/// - `description`: short text compared against text queries by the reranker
/// - `rag_context`: longer review/context blob for the answer-generation layer
/// - `image_path`: representative image, relative to the project root
///
/// `category`, `brand` and `rag_context` are absent in some legacy rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rag_context: Option<String>,
    #[serde(default)]
    pub image_path: String,
}

impl ProductRecord {
    /// Display fields copied into the vector store next to the embedding.
    pub fn metadata(&self) -> ProductMetadata {
        ProductMetadata {
            title: self.title.clone(),
            category: self.category.clone(),
            brand: self.brand.clone(),
            description: self.description.clone(),
            rag_context: self.rag_context.clone(),
            image_relative_path: self.image_path.clone(),
        }
    }
}

/// Metadata stored alongside every indexed vector and returned with each hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductMetadata {
    pub title: String,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub description: String,
    pub rag_context: Option<String>,
    pub image_relative_path: String,
}

/// One row of the vector store: id, embedding and a metadata copy.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedVector {
    pub id: ProductId,
    pub vector: Vec<f32>,
    pub metadata: ProductMetadata,
}

/// A nearest-neighbor hit as returned by a `VectorStore`.
///
/// `distance` is cosine distance, `1 - cosine similarity`.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: ProductId,
    pub metadata: ProductMetadata,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modality {
    Text,
    Image,
}

/// A search request. The variant is chosen by the caller and decides the
/// embedding path, whether reranking runs, and which confidence floor applies.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Text(String),
    Image(PathBuf),
}

impl Query {
    pub fn text(s: impl Into<String>) -> Self {
        Query::Text(s.into())
    }

    pub fn image(p: impl Into<PathBuf>) -> Self {
        Query::Image(p.into())
    }

    pub fn modality(&self) -> Modality {
        match self {
            Query::Text(_) => Modality::Text,
            Query::Image(_) => Modality::Image,
        }
    }

    pub fn as_embed_input(&self) -> EmbedInput<'_> {
        match self {
            Query::Text(t) => EmbedInput::Text(t),
            Query::Image(p) => EmbedInput::Image(p),
        }
    }
}

/// Input accepted by a multimodal embedder.
#[derive(Debug, Clone, Copy)]
pub enum EmbedInput<'a> {
    Text(&'a str),
    Image(&'a Path),
}

impl EmbedInput<'_> {
    pub fn modality(&self) -> Modality {
        match self {
            EmbedInput::Text(_) => Modality::Text,
            EmbedInput::Image(_) => Modality::Image,
        }
    }
}

/// A scored hit living for the duration of one search call.
///
/// `similarity` is `1 - distance` from retrieval. `rerank_score` is set only
/// when the reranker ran for a text query. `retrieval_rank` is 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: ProductId,
    pub similarity: f32,
    pub rerank_score: Option<f32>,
    pub metadata: ProductMetadata,
    pub retrieval_rank: usize,
}

impl Candidate {
    pub fn from_match(m: VectorMatch, retrieval_rank: usize) -> Self {
        Self {
            id: m.id,
            similarity: 1.0 - m.distance,
            rerank_score: None,
            metadata: m.metadata,
            retrieval_rank,
        }
    }

    /// The score the confidence filter judges: rerank score when present,
    /// retrieval similarity otherwise.
    pub fn score(&self) -> f32 {
        self.rerank_score.unwrap_or(self.similarity)
    }
}

/// Ordered candidates that survived the confidence filter.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub modality: Modality,
    pub candidates: Vec<Candidate>,
}

impl SearchResult {
    pub fn empty(modality: Modality) -> Self {
        Self { modality, candidates: Vec::new() }
    }

    /// True when the search ran but nothing was confident enough to show.
    pub fn is_no_match(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.id.as_str()).collect()
    }
}
