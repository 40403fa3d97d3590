use std::sync::Arc;

use crate::errors::RagError;
use crate::rag::embeddings::{cosine_similarity, Embeddings};
use crate::rag::Document;

/// Number of chunks a retriever returns when not told otherwise.
pub const DEFAULT_TOP_K: usize = 4;

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub document: Document,
    pub score: f32,
}

/// Flat cosine-similarity index over embedded chunks
#[derive(Debug, Clone, Default)]
pub struct InMemoryVectorStore {
    entries: Vec<(Document, Vec<f32>)>,
    embedding_dimension: Option<usize>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty store that only accepts vectors of `dimension` components.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            entries: Vec::new(),
            embedding_dimension: Some(dimension),
        }
    }

    /// Embed and index every chunk.
    pub async fn from_documents(
        documents: Vec<Document>,
        embeddings: &dyn Embeddings,
    ) -> Result<Self, RagError> {
        let texts: Vec<String> = documents.iter().map(|d| d.page_content.clone()).collect();
        let vectors = embeddings.embed_documents(&texts).await?;

        let mut store = Self::with_dimension(embeddings.dimension());
        store.add_documents(documents, vectors)?;

        log::debug!("Indexed {} chunks", store.len());
        Ok(store)
    }

    pub fn add_documents(
        &mut self,
        documents: Vec<Document>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<(), RagError> {
        if documents.len() != vectors.len() {
            return Err(RagError::VectorStore(format!(
                "Got {} documents but {} embeddings",
                documents.len(),
                vectors.len()
            )));
        }

        for (document, embedding) in documents.into_iter().zip(vectors) {
            self.add_document(document, embedding)?;
        }
        Ok(())
    }

    pub fn add_document(&mut self, document: Document, embedding: Vec<f32>) -> Result<(), RagError> {
        if let Some(expected_dim) = self.embedding_dimension {
            if embedding.len() != expected_dim {
                return Err(RagError::VectorStore(format!(
                    "Embedding dimension mismatch: expected {}, got {}",
                    expected_dim,
                    embedding.len()
                )));
            }
        } else {
            self.embedding_dimension = Some(embedding.len());
        }

        self.entries.push((document, embedding));
        Ok(())
    }

    /// Top `k` documents by descending cosine similarity; ties keep insertion order.
    pub fn similarity_search_by_vector(
        &self,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<SearchResult>, RagError> {
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(expected_dim) = self.embedding_dimension {
            if query_embedding.len() != expected_dim {
                return Err(RagError::VectorStore(format!(
                    "Query embedding dimension mismatch: expected {}, got {}",
                    expected_dim,
                    query_embedding.len()
                )));
            }
        }

        let mut results: Vec<SearchResult> = self
            .entries
            .iter()
            .map(|(document, embedding)| SearchResult {
                document: document.clone(),
                score: cosine_similarity(query_embedding, embedding),
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        results.truncate(k);
        Ok(results)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn embedding_dimension(&self) -> Option<usize> {
        self.embedding_dimension
    }

    pub fn as_retriever(self, embeddings: Arc<dyn Embeddings>, k: usize) -> VectorStoreRetriever {
        VectorStoreRetriever::new(Arc::new(self), embeddings, k)
    }
}

/// Similarity retriever bound to one session's store
#[derive(Clone)]
pub struct VectorStoreRetriever {
    store: Arc<InMemoryVectorStore>,
    embeddings: Arc<dyn Embeddings>,
    k: usize,
}

impl VectorStoreRetriever {
    pub fn new(store: Arc<InMemoryVectorStore>, embeddings: Arc<dyn Embeddings>, k: usize) -> Self {
        Self { store, embeddings, k }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn store(&self) -> &InMemoryVectorStore {
        &self.store
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<Document>, RagError> {
        Ok(self
            .retrieve_with_scores(query)
            .await?
            .into_iter()
            .map(|result| result.document)
            .collect())
    }

    pub async fn retrieve_with_scores(&self, query: &str) -> Result<Vec<SearchResult>, RagError> {
        let query_embedding = self.embeddings.embed_query(query).await?;
        let results = self.store.similarity_search_by_vector(&query_embedding, self.k)?;
        log::debug!("Retrieved {} chunks for query '{}'", results.len(), query);
        Ok(results)
    }
}

impl std::fmt::Debug for VectorStoreRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStoreRetriever")
            .field("chunks", &self.store.len())
            .field("k", &self.k)
            .finish()
    }
}
