use thiserror::Error;

/// Every failure the search core can surface.
///
/// A search that fails returns one of these; a search that simply matched
/// nothing returns an empty `SearchResult` instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input to the embedder could not be decoded (corrupt image, unreadable file).
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// Vector store unavailable, query failure, or a timed-out stage.
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// A rebuild collided with another rebuild, or a write violated the index schema.
    #[error("Index consistency violated: {0}")]
    IndexConsistency(String),

    #[error("Reranking failed: {0}")]
    Rerank(String),

    #[error("Model load failed: {0}")]
    Model(String),

    #[error("Catalog unreadable: {0}")]
    Catalog(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn is_retrieval(&self) -> bool {
        matches!(self, Error::Retrieval(_))
    }

    pub fn is_encoding(&self) -> bool {
        matches!(self, Error::Encoding(_))
    }

    pub fn is_index_consistency(&self) -> bool {
        matches!(self, Error::IndexConsistency(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
