// Embeddings module
// OpenAI embedding client, retry policy, and the embedding seam used by retrieval

pub mod openai;
pub mod retry;

use anyhow::Result;

pub use openai::{OpenAiClient, embedding_dimension};
pub use retry::RetryPolicy;

/// Seam for producing embedding vectors.
///
/// Retrieval and ingestion are written against this trait so tests can
/// substitute a mock and assert on call counts; `OpenAiClient` is the
/// production implementation.
pub trait Embedder: Send + Sync {
    /// Embed a single text, returning a vector of the model's fixed dimensionality
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts; output order matches input order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Name of the model producing the vectors
    fn model_name(&self) -> &str;
}
