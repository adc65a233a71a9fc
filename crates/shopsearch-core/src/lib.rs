//! Shared data model, error kinds and trait seams for the product search core.
//!
//! The embedder, reranker and vector store are defined here as traits so the
//! indexer and the search orchestrator can be wired with real models in the
//! binaries and with fakes in tests.

pub mod catalog;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
