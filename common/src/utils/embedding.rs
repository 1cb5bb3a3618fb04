use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::Arc,
};

use anyhow::{anyhow, Result};
use async_openai::{types::CreateEmbeddingRequestArgs, Client};
use tracing::debug;

use crate::utils::config::AppConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    OpenAI,
    Hashed,
}

impl Default for EmbeddingBackend {
    fn default() -> Self {
        Self::OpenAI
    }
}

impl std::str::FromStr for EmbeddingBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "hashed" => Ok(Self::Hashed),
            other => Err(anyhow!(
                "unknown embedding backend '{other}'. Expected 'openai' or 'hashed'."
            )),
        }
    }
}

/// Gateway to the embedding service. The hashed backend produces
/// deterministic vectors without any network access; tests and offline runs
/// use it.
#[derive(Clone)]
pub struct EmbeddingProvider {
    inner: EmbeddingInner,
}

#[derive(Clone)]
enum EmbeddingInner {
    OpenAI {
        client: Arc<Client<async_openai::config::OpenAIConfig>>,
        model: String,
        dimensions: u32,
        batch_size: usize,
    },
    Hashed {
        dimension: usize,
    },
}

impl EmbeddingProvider {
    pub fn backend_label(&self) -> &'static str {
        match self.inner {
            EmbeddingInner::Hashed { .. } => "hashed",
            EmbeddingInner::OpenAI { .. } => "openai",
        }
    }

    pub fn dimension(&self) -> usize {
        match &self.inner {
            EmbeddingInner::Hashed { dimension } => *dimension,
            EmbeddingInner::OpenAI { dimensions, .. } => *dimensions as usize,
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        match &self.inner {
            EmbeddingInner::Hashed { dimension } => Ok(hashed_embedding(text, *dimension)),
            EmbeddingInner::OpenAI {
                client,
                model,
                dimensions,
                ..
            } => {
                let request = CreateEmbeddingRequestArgs::default()
                    .model(model.clone())
                    .input([text])
                    .dimensions(*dimensions)
                    .build()?;

                let response = client.embeddings().create(request).await?;

                let embedding = response
                    .data
                    .first()
                    .ok_or_else(|| anyhow!("No embedding data received from API"))?
                    .embedding
                    .clone();

                Ok(embedding)
            }
        }
    }

    /// Batched embedding. OpenAI requests are split into `batch_size` slices
    /// so a long document cannot exceed the service's per-request limits.
    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        match &self.inner {
            EmbeddingInner::Hashed { dimension } => Ok(texts
                .into_iter()
                .map(|text| hashed_embedding(&text, *dimension))
                .collect()),
            EmbeddingInner::OpenAI {
                client,
                model,
                dimensions,
                batch_size,
            } => {
                if texts.is_empty() {
                    return Ok(Vec::new());
                }

                let mut embeddings = Vec::with_capacity(texts.len());
                for batch in texts.chunks((*batch_size).max(1)) {
                    let request = CreateEmbeddingRequestArgs::default()
                        .model(model.clone())
                        .input(batch.to_vec())
                        .dimensions(*dimensions)
                        .build()?;

                    let response = client.embeddings().create(request).await?;
                    embeddings.extend(response.data.into_iter().map(|item| item.embedding));
                }

                debug!(
                    count = embeddings.len(),
                    "embedding batch completed"
                );
                Ok(embeddings)
            }
        }
    }

    pub fn new_openai(
        client: Arc<Client<async_openai::config::OpenAIConfig>>,
        model: String,
        dimensions: u32,
        batch_size: usize,
    ) -> Self {
        EmbeddingProvider {
            inner: EmbeddingInner::OpenAI {
                client,
                model,
                dimensions,
                batch_size: batch_size.max(1),
            },
        }
    }

    pub fn new_hashed(dimension: usize) -> Self {
        EmbeddingProvider {
            inner: EmbeddingInner::Hashed {
                dimension: dimension.max(1),
            },
        }
    }

    /// Picks a backend from configuration, using the model/dimensions stored
    /// in settings for the OpenAI path.
    pub fn from_config(
        config: &AppConfig,
        model: &str,
        dimensions: u32,
        client: Arc<Client<async_openai::config::OpenAIConfig>>,
    ) -> Result<Self> {
        let backend: EmbeddingBackend = config.embedding_backend.parse()?;
        match backend {
            EmbeddingBackend::OpenAI => Ok(Self::new_openai(
                client,
                model.to_owned(),
                dimensions,
                config.embedding_batch_size,
            )),
            EmbeddingBackend::Hashed => Ok(Self::new_hashed(dimensions as usize)),
        }
    }
}

// Helper functions for hashed embeddings
fn hashed_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let dim = dimension.max(1);
    let mut vector = vec![0.0f32; dim];
    if text.is_empty() {
        return vector;
    }

    let mut token_count = 0f32;
    for token in tokens(text) {
        token_count += 1.0;
        let idx = bucket(&token, dim);
        vector[idx] += 1.0;
    }

    if token_count == 0.0 {
        return vector;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }

    vector
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
}

fn bucket(token: &str, dimension: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() as usize) % dimension
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashed_embeddings_are_deterministic_and_normalized() {
        let provider = EmbeddingProvider::new_hashed(8);
        assert_eq!(provider.dimension(), 8);
        assert_eq!(provider.backend_label(), "hashed");

        let first = provider.embed("gaming notebook").await.expect("embed");
        let second = provider.embed("gaming notebook").await.expect("embed");
        assert_eq!(first, second);
        assert_eq!(first.len(), 8);

        let norm: f32 = first.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "expected unit norm, got {norm}");
    }

    #[tokio::test]
    async fn similar_texts_share_buckets() {
        let provider = EmbeddingProvider::new_hashed(16);
        let a = provider.embed("budget notebook 15000").await.expect("embed");
        let b = provider.embed("notebook budget").await.expect("embed");
        let unrelated = provider.embed("usb cable adapter").await.expect("embed");

        let cosine = |x: &[f32], y: &[f32]| -> f32 {
            x.iter().zip(y.iter()).map(|(a, b)| a * b).sum::<f32>()
        };
        assert!(cosine(&a, &b) > cosine(&a, &unrelated));
    }

    #[tokio::test]
    async fn batch_matches_single_embedding() {
        let provider = EmbeddingProvider::new_hashed(8);
        let single = provider.embed("alpha beta").await.expect("embed");
        let batch = provider
            .embed_batch(vec!["alpha beta".into(), "gamma".into()])
            .await
            .expect("embed batch");
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], single);
    }

    #[test]
    fn backend_parsing_rejects_unknown_values() {
        assert!("openai".parse::<EmbeddingBackend>().is_ok());
        assert!("hashed".parse::<EmbeddingBackend>().is_ok());
        assert!("onnx".parse::<EmbeddingBackend>().is_err());
    }
}
