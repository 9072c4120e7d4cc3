// Embedding generation module

pub mod ollama;

pub use ollama::OllamaClient;

use crate::Result;

/// Capability boundary for embedding generation.
///
/// Errors abort the caller's whole operation; index builds never commit a
/// partial set of vectors.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts; the output is positionally aligned with the
    /// input and every vector has the provider's fixed dimension.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
