//! Core library for conversational retrieval over uploaded documents.
//!
//! A client uploads one or more PDFs, the text is split into overlapping chunks,
//! embedded and indexed in a vector store that belongs to that client only. Each
//! subsequent question is normalised, matched against the client's chunks and
//! answered by a hosted chat model that sees both the retrieved passages and the
//! conversation so far.
//!
//! # Architecture Overview
//!
//! - **Configuration**: YAML configuration with environment overrides
//! - **Document ingestion**: PDF text extraction and recursive chunking
//! - **Retrieval**: hosted embeddings and a flat in-memory cosine index
//! - **Sessions**: per-client conversation history and retriever registry
//! - **Generation**: OpenAI-compatible chat completions, batched or streamed
//! - **Pipeline**: the composition of all of the above for one chat turn

pub mod config;
pub mod errors;
pub mod history;
pub mod llm;
pub mod pipeline;
pub mod preprocess;
pub mod prompt;
pub mod rag;
pub mod session;

pub use config::{AppConfig, ConfigLoader, Environment};
pub use errors::RagError;
pub use history::{ChatHistory, ChatMessage, Role};
pub use llm::{ChatModel, ChatOptions, OpenAIChatClient, TokenStream};
pub use pipeline::{IngestSummary, RagPipeline};
pub use preprocess::preprocess_query;
pub use rag::{
    Document, Embeddings, HashEmbeddings, InMemoryVectorStore, OpenAIEmbeddings,
    VectorStoreRetriever,
};
pub use session::{SessionRegistry, SessionSettings};

/// Version of the application, reported by the health endpoint.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
pub mod test_utils;
