//! Error types shared by every stage of the retrieval pipeline
//!
//! Errors are grouped by the stage that produced them (loading, embedding,
//! indexing, generation) so the HTTP layer can map them to meaningful status
//! codes and callers can tell a missing session apart from an upstream outage.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Document loading failed: {0}")]
    DocumentLoad(String),
    #[error("Embedding request failed: {0}")]
    Embedding(String),
    #[error("Vector store error: {0}")]
    VectorStore(String),
    #[error("LLM interaction failed: {0}")]
    Llm(String),
    #[error("Parsing error: {0}")]
    Parsing(String),
    #[error("Client {0} not found in stores.")]
    SessionNotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RagError {
    /// True when the failure came from a hosted API rather than from us.
    pub fn is_upstream(&self) -> bool {
        matches!(self, RagError::Embedding(_) | RagError::Llm(_))
    }
}

impl From<std::io::Error> for RagError {
    fn from(err: std::io::Error) -> Self {
        RagError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for RagError {
    fn from(err: reqwest::Error) -> Self {
        RagError::Llm(err.to_string())
    }
}
