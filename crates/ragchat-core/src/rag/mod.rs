//! Document ingestion and retrieval
//!
//! Uploaded files are loaded into [`Document`]s, split into overlapping
//! chunks, embedded and indexed in an [`InMemoryVectorStore`]. A
//! [`VectorStoreRetriever`] then answers "which chunks are closest to this
//! question" for a single session.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub mod embeddings;
pub mod loader;
pub mod splitter;
pub mod vector_store;

pub use embeddings::*;
pub use loader::*;
pub use splitter::*;
pub use vector_store::*;

/// A unit of text together with where it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Document {
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The `source` metadata entry, if any
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(Value::as_str)
    }
}
