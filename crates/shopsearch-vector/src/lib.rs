//! Vector stores for product embeddings: a persistent LanceDB table and an
//! in-memory brute-force index.

pub mod lance_store;
pub mod memory;
pub mod schema;
pub mod table;

pub use lance_store::LanceVectorStore;
pub use memory::MemoryVectorStore;

/// Cosine similarity; zero-length vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut na, mut nb) = (0f32, 0f32, 0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na <= f32::EPSILON || nb <= f32::EPSILON {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}
