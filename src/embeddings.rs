use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EmbeddingError;

/// Representation of a vector embedding
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn dims(&self) -> usize {
        self.values.len()
    }

    /// Cosine similarity; zero for empty, mismatched or zero-length vectors
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        let (a, b) = (&self.values, &other.values);
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
            0.0
        } else {
            dot / (mag_a * mag_b)
        }
    }
}

/// External capability that turns text into vectors.
///
/// Every vector in one knowledge base must come from the same model.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Model identifier, e.g. `text-embedding-ada-002`
    fn model_name(&self) -> &str;

    /// Declared dimensionality, if known up front
    fn dims(&self) -> Option<usize>;

    /// Embed a batch of texts, one vector per text in input order
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError>;

    /// Embed a single query text
    async fn embed_query(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let mut embeddings = self.embed_documents(&[text.to_string()]).await?;
        if embeddings.len() != 1 {
            return Err(EmbeddingError::CountMismatch {
                expected: 1,
                actual: embeddings.len(),
            });
        }
        Ok(embeddings.remove(0))
    }
}
