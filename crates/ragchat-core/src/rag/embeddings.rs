use crate::config::EmbeddingConfig;
use crate::errors::RagError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// Turns text into dense vectors
#[async_trait]
pub trait Embeddings: Send + Sync {
    /// Embed a batch of texts; the output is aligned with the input.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
        self.embed_documents(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("No embedding returned for query".to_string()))
    }

    fn dimension(&self) -> usize;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

/// Client for the `/embeddings` endpoint of an OpenAI-compatible API
pub struct OpenAIEmbeddings {
    client: Client,
    config: EmbeddingConfig,
    api_key: Option<String>,
}

impl OpenAIEmbeddings {
    pub fn new(config: EmbeddingConfig) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| RagError::Embedding(format!("Failed to create HTTP client: {}", e)))?;

        let api_key = config.auth.resolve_key();
        if api_key.is_none() {
            log::warn!("No API key configured for embeddings model {}", config.model);
        }

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    pub fn create_batches(&self, texts: &[String]) -> Vec<Vec<String>> {
        let batch_size = self.config.max_batch_size.max(1);
        texts
            .chunks(batch_size)
            .map(|chunk| chunk.to_vec())
            .collect()
    }

    async fn call_api(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| RagError::Config("OpenAI API key not configured".to_string()))?;

        let url = format!("{}/embeddings", self.config.api_base.trim_end_matches('/'));

        let mut payload = json!({
            "model": self.config.model,
            "input": texts,
            "encoding_format": "float"
        });
        // Only the text-embedding-3 family accepts a requested size.
        if self.config.model.starts_with("text-embedding-3") {
            payload["dimensions"] = json!(self.config.dimension);
        }

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("OpenAI API request failed: {}", e)))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| RagError::Embedding(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            log::error!("OpenAI embeddings error response: {}", response_text);
            return Err(RagError::Embedding(format!(
                "OpenAI API error ({}): {}",
                status, response_text
            )));
        }

        let response_data: OpenAIEmbeddingResponse =
            serde_json::from_str(&response_text).map_err(|e| {
                RagError::Embedding(format!(
                    "Failed to parse OpenAI response: {}. Response: {}",
                    e, response_text
                ))
            })?;

        if response_data.data.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "Mismatch between input texts ({}) and returned embeddings ({})",
                texts.len(),
                response_data.data.len()
            )));
        }

        if let Some(item) = response_data
            .data
            .iter()
            .find(|item| item.embedding.len() != self.config.dimension)
        {
            return Err(RagError::Embedding(format!(
                "Expected embeddings with {} dimensions, got {}",
                self.config.dimension,
                item.embedding.len()
            )));
        }

        let mut data = response_data.data;
        data.sort_by_key(|item| item.index.unwrap_or(usize::MAX));

        Ok(data.into_iter().map(|item| item.embedding).collect())
    }
}

#[async_trait]
impl Embeddings for OpenAIEmbeddings {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        log::info!(
            "Generating embeddings for {} texts with {}",
            texts.len(),
            self.config.model
        );

        let batches = self.create_batches(texts);
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for (i, batch) in batches.iter().enumerate() {
            log::debug!(
                "Processing batch {}/{} ({} texts)",
                i + 1,
                batches.len(),
                batch.len()
            );
            all_embeddings.extend(self.call_api(batch).await?);
        }

        Ok(all_embeddings)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}

/// Offline embeddings built from hashed word counts.
///
/// Texts sharing words get similar vectors, which is enough for local runs
/// and tests without network access.
#[derive(Debug, Clone)]
pub struct HashEmbeddings {
    dimension: usize,
}

impl HashEmbeddings {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let hash = hasher.finish();

            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for val in &mut embedding {
                *val /= magnitude;
            }
        }

        embedding
    }
}

impl Default for HashEmbeddings {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embeddings for HashEmbeddings {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiAuth;
    use crate::test_utils::MockOpenAIServer;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_hash_embeddings_are_deterministic() {
        let embeddings = HashEmbeddings::new(64);
        let a = embeddings.embed_query("Rust ownership rules").await.unwrap();
        let b = embeddings.embed_query("rust OWNERSHIP rules").await.unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_hash_embeddings_rank_shared_words_higher() {
        let embeddings = HashEmbeddings::new(256);
        let query = embeddings.embed("borrow checker");
        let related = embeddings.embed("the borrow checker enforces ownership");
        let unrelated = embeddings.embed("bananas are yellow fruit");
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    fn config_for(server: &MockOpenAIServer, batch: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            api_base: server.base_url(),
            max_batch_size: batch,
            dimension: 3,
            auth: ApiAuth {
                api_key: Some("sk-test".to_string()),
                api_key_env: None,
            },
            ..EmbeddingConfig::default()
        }
    }

    #[tokio::test]
    async fn test_openai_embeddings_batches_and_orders() {
        let server = MockOpenAIServer::start().await;
        let client = OpenAIEmbeddings::new(config_for(&server, 2)).unwrap();

        let texts: Vec<String> = ["a", "bb", "ccc", "dddd", "eeeee"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let vectors = client.embed_documents(&texts).await.unwrap();

        assert_eq!(vectors.len(), 5);
        // The mock encodes the text length in the first component.
        let lengths: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
        assert_eq!(lengths, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(server.embedding_requests(), 3);
    }

    #[tokio::test]
    async fn test_openai_embeddings_missing_key() {
        let server = MockOpenAIServer::start().await;
        let mut config = config_for(&server, 10);
        config.auth = ApiAuth {
            api_key: None,
            api_key_env: None,
        };
        let client = OpenAIEmbeddings::new(config).unwrap();
        let result = client.embed_query("hello").await;
        assert!(matches!(result, Err(RagError::Config(_))));
    }

    #[tokio::test]
    async fn test_openai_embeddings_upstream_error() {
        let server = MockOpenAIServer::start().await;
        server.fail_next_requests(1);
        let client = OpenAIEmbeddings::new(config_for(&server, 10)).unwrap();
        let result = client.embed_query("hello").await;
        assert!(matches!(result, Err(RagError::Embedding(msg)) if msg.contains("500")));
    }

    #[tokio::test]
    async fn test_openai_embeddings_reject_wrong_dimension() {
        let server = MockOpenAIServer::start().await;
        let mut config = config_for(&server, 10);
        config.dimension = 1536;
        let client = OpenAIEmbeddings::new(config).unwrap();

        assert_eq!(client.dimension(), 1536);
        let result = client.embed_query("hello").await;
        assert!(matches!(result, Err(RagError::Embedding(msg)) if msg.contains("1536 dimensions, got 3")));
    }
}
