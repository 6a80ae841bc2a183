//! Embedding adapter contract.
//!
//! The engine never computes embeddings on its own; when text arrives
//! without vectors it makes one batched call to the injected
//! [`EmbeddingFunction`].

use std::sync::Arc;

use crate::error::{BoxError, Error, Result};

/// Converts a batch of texts into vectors of the same length and order.
pub trait EmbeddingFunction: Send + Sync {
    fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, BoxError>;
}

impl<F> EmbeddingFunction for F
where
    F: Fn(&[String]) -> std::result::Result<Vec<Vec<f32>>, BoxError> + Send + Sync,
{
    fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, BoxError> {
        self(texts)
    }
}

pub type SharedEmbeddingFunction = Arc<dyn EmbeddingFunction>;

/// Runs the adapter and checks that it answered once per input text.
pub(crate) fn embed_batch(
    embedder: Option<&SharedEmbeddingFunction>,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let embedder = embedder.ok_or_else(|| {
        Error::embedding("no embedding function configured; supply embeddings explicitly")
    })?;

    let vectors = embedder.embed(texts).map_err(|source| Error::Embedding {
        message: format!("embedding function failed: {source}"),
        source: Some(source),
    })?;

    if vectors.len() != texts.len() {
        return Err(Error::embedding(format!(
            "embedding function returned {} vectors for {} texts",
            vectors.len(),
            texts.len()
        )));
    }
    tracing::debug!(texts = texts.len(), "embedded text batch");
    Ok(vectors)
}

/// Deterministic byte-hash embedding. It carries no semantics and is meant
/// for tests, demos and benchmarks.
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimensions: usize,
}

impl HashEmbedding {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimensions];
        for (index, byte) in text.bytes().enumerate() {
            embedding[index % self.dimensions] += f32::from(byte) / 255.0;
        }

        let norm = embedding.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }
        embedding
    }
}

impl EmbeddingFunction for HashEmbedding {
    fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, BoxError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_embedding_is_deterministic_and_normalized() {
        let embedder = HashEmbedding::new(8);
        let texts = vec!["hello".to_string(), "hello".to_string(), String::new()];
        let vectors = embedder.embed(&texts).expect("embedding must succeed");

        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0], vectors[1]);
        let norm = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(vectors[2].iter().all(|value| *value == 0.0));
    }

    #[test]
    fn closures_are_embedding_functions() {
        let embedder: SharedEmbeddingFunction =
            Arc::new(|texts: &[String]| -> std::result::Result<Vec<Vec<f32>>, BoxError> {
                Ok(texts.iter().map(|text| vec![text.len() as f32]).collect())
            });
        let vectors = embed_batch(Some(&embedder), &["abc".to_string()]).expect("must embed");
        assert_eq!(vectors, vec![vec![3.0]]);
    }

    #[test]
    fn missing_adapter_is_an_embedding_error() {
        let error = embed_batch(None, &["a".to_string()]).expect_err("must fail");
        assert!(matches!(error, Error::Embedding { source: None, .. }));
    }

    #[test]
    fn adapter_failures_keep_their_source() {
        let embedder: SharedEmbeddingFunction =
            Arc::new(|_: &[String]| -> std::result::Result<Vec<Vec<f32>>, BoxError> {
                Err("provider offline".into())
            });
        let error = embed_batch(Some(&embedder), &["a".to_string()]).expect_err("must fail");
        assert!(matches!(error, Error::Embedding { source: Some(_), .. }));
        assert!(error.to_string().contains("provider offline"));
    }

    #[test]
    fn short_adapter_output_is_rejected() {
        let embedder: SharedEmbeddingFunction =
            Arc::new(|_: &[String]| -> std::result::Result<Vec<Vec<f32>>, BoxError> {
                Ok(vec![vec![1.0]])
            });
        let texts = vec!["a".to_string(), "b".to_string()];
        let error = embed_batch(Some(&embedder), &texts).expect_err("must fail");
        assert!(matches!(error, Error::Embedding { .. }));
    }
}
