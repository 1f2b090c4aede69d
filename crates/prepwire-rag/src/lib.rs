pub mod embedder;
pub mod indexer;
pub mod retrieval;

pub use embedder::{cosine, Embedder, Embedding};
pub use indexer::Indexer;
pub use retrieval::Retriever;

use thiserror::Error;

/// Retrieval-layer errors. Callers treat these as advisory: a failed
/// retrieval means no context, never a failed turn.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("store error: {0}")]
    Store(#[from] prepwire_store::StoreError),

    #[error("embedding endpoint error: {0}")]
    Endpoint(String),
}

pub type Result<T> = std::result::Result<T, RagError>;
