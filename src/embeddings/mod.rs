// Embeddings module
// Ollama-backed embedding generation behind the EmbeddingProvider seam

pub mod ollama;

use async_trait::async_trait;

pub use ollama::{ModelInfo, OllamaClient};

/// Maps text to fixed-length embedding vectors.
///
/// Implementations are expected to be cheap to clone behind an `Arc` and
/// safe to call concurrently; each call is a single best-effort attempt from
/// the caller's point of view.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// Embed a batch of texts, preserving order.
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}
