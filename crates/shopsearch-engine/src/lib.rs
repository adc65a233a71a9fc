//! Indexing and search orchestration over the model and store seams.

pub mod filter;
pub mod indexer;
pub mod lock;
pub mod search;

pub use filter::ConfidencePolicy;
pub use indexer::{CatalogIndexer, IndexReport, SkipReason, SkippedRecord};
pub use lock::{RebuildGuard, RebuildLock};
pub use search::ProductSearch;
