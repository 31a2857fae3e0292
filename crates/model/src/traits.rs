use async_trait::async_trait;
use qhse_common::Result;

/// Text embedding capability
///
/// The matching logic only sees this trait, so the runtime behind it can be
/// swapped without touching search code.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Identifier recorded next to persisted embeddings
    fn model_name(&self) -> &str;

    /// Test connection/availability
    async fn test_connection(&self) -> Result<bool>;
}

/// Binary classification capability over fixed-width feature vectors
pub trait Classifier: Send + Sync {
    /// Expected feature vector length
    fn input_dim(&self) -> usize;

    /// Probability-like score in `[0, 1]` for one feature vector
    fn classify(&self, features: &[f32]) -> Result<f32>;

    /// Score many rows at once
    fn classify_batch(&self, rows: &[Vec<f32>]) -> Result<Vec<f32>> {
        rows.iter().map(|row| self.classify(row)).collect()
    }
}
