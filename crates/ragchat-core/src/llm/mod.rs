//! Chat model abstraction and the OpenAI-compatible provider.
//!
//! A [`ChatModel`] answers a list of messages either in one piece or as a
//! stream of text fragments. Per-call [`ChatOptions`] carry the model name
//! and sampling temperature so each session can use its own settings.

use crate::errors::RagError;
use crate::history::ChatMessage;
use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

pub mod providers;

pub use providers::*;

/// Text fragments produced by a streaming completion
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, RagError>> + Send>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    pub model: String,
    pub temperature: f32,
}

impl ChatOptions {
    pub fn new(model: impl Into<String>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            temperature,
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Complete the conversation in one request.
    async fn generate(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<String, RagError>;

    /// Start a streaming completion. Failures before the first fragment are
    /// returned directly, later ones are yielded by the stream.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<TokenStream, RagError>;
}
