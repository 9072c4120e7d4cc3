// LanceDB vector index module
// Holds the embedded documents and answers nearest-neighbor lookups

pub mod vector_store;

pub use vector_store::VectorStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Document record persisted in the vector index, 1:1 with an observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Observation id this document was rendered from
    pub id: i64,
    /// The embedding vector
    pub vector: Vec<f32>,
    /// Canonical sentence rendering of the observation
    pub document: String,
    pub metadata: DocumentMetadata,
}

/// Metadata stored alongside each document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentMetadata {
    pub timestamp: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// A document returned from similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub id: i64,
    pub document: String,
    pub metadata: DocumentMetadata,
    /// Similarity score, higher is closer
    pub score: f32,
    /// Raw provider distance, lower is closer
    pub distance: f32,
}

/// Vector index capability.
///
/// `rebuild` replaces the whole collection; incremental upsert would be an
/// additional method, not a change to this one.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn rebuild(&self, records: Vec<DocumentRecord>) -> Result<()>;

    /// Nearest neighbors by vector distance. Callers sort ties by id.
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredDocument>>;

    async fn count(&self) -> Result<u64>;
}
