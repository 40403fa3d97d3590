//! Configuration types
//!
//! Every section deserializes with per-field defaults so a partial YAML file
//! (or none at all) yields a working configuration.

use crate::errors::RagError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Root configuration of the application
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    #[serde(default)]
    pub rag: RetrievalConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub ui: UiConfig,
}

/// Mode the application runs in
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Prod,
}

impl Environment {
    pub fn is_dev(&self) -> bool {
        matches!(self, Environment::Dev)
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, Environment::Prod)
    }
}

impl std::str::FromStr for Environment {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEV" => Ok(Environment::Dev),
            "PROD" => Ok(Environment::Prod),
            other => Err(RagError::Config(format!("Unknown environment: {}", other))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Dev => write!(f, "DEV"),
            Environment::Prod => write!(f, "PROD"),
        }
    }
}

/// API credentials for a hosted OpenAI-compatible endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiAuth {
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,
}

impl Default for ApiAuth {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_api_key_env(),
        }
    }
}

impl ApiAuth {
    /// Resolve the key, preferring an inline value over the environment.
    pub fn resolve_key(&self) -> Option<String> {
        self.api_key.clone().filter(|k| !k.is_empty()).or_else(|| {
            self.api_key_env
                .as_ref()
                .and_then(|var| std::env::var(var).ok())
                .filter(|k| !k.is_empty())
        })
    }
}

/// Chat model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_true")]
    pub streaming: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub auth: ApiAuth,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_chat_model(),
            temperature: 0.0,
            streaming: true,
            max_tokens: None,
            timeout_seconds: default_llm_timeout(),
            auth: ApiAuth::default(),
        }
    }
}

/// Embedding model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
    #[serde(default = "default_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub auth: ApiAuth,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            max_batch_size: default_batch_size(),
            timeout_seconds: default_embedding_timeout(),
            auth: ApiAuth::default(),
        }
    }
}

/// Chunking and retrieval parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
        }
    }
}

/// Prompt templates; `{chat_history}`, `{context}` and `{question}` are substituted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default = "default_system_prompt")]
    pub system: String,
    #[serde(default = "default_human_prompt")]
    pub human: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system: default_system_prompt(),
            human: default_human_prompt(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub enable_cors: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cors_origins: Option<Vec<String>>,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default = "default_keepalive")]
    pub sse_keepalive_seconds: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            enable_cors: true,
            cors_origins: None,
            static_dir: default_static_dir(),
            max_upload_bytes: default_max_upload_bytes(),
            sse_keepalive_seconds: default_keepalive(),
        }
    }
}

impl ServerSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A selectable chat profile shown by the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatProfile {
    pub name: String,
    pub markdown_description: String,
}

/// A conversation starter suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Starter {
    pub label: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Metadata served to the chat front-end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiConfig {
    #[serde(default = "default_models")]
    pub models: Vec<String>,
    #[serde(default = "default_profiles")]
    pub profiles: Vec<ChatProfile>,
    #[serde(default = "default_starters")]
    pub starters: Vec<Starter>,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            models: default_models(),
            profiles: default_profiles(),
            starters: default_starters(),
        }
    }
}

impl AppConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), RagError> {
        if self.llm.model.trim().is_empty() {
            return Err(RagError::Config("LLM model cannot be empty".to_string()));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(RagError::Config(format!(
                "LLM temperature must be between 0 and 2, got {}",
                self.llm.temperature
            )));
        }

        if self.embeddings.model.trim().is_empty() {
            return Err(RagError::Config("Embedding model cannot be empty".to_string()));
        }

        if self.embeddings.max_batch_size == 0 {
            return Err(RagError::Config(
                "Embedding batch size must be greater than 0".to_string(),
            ));
        }

        if self.rag.chunk_size == 0 {
            return Err(RagError::Config("Chunk size must be greater than 0".to_string()));
        }

        if self.rag.chunk_overlap >= self.rag.chunk_size {
            return Err(RagError::Config(format!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                self.rag.chunk_overlap, self.rag.chunk_size
            )));
        }

        if self.rag.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than 0".to_string()));
        }

        if self.server.port == 0 {
            return Err(RagError::Config("Server port must be greater than 0".to_string()));
        }

        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_api_key_env() -> Option<String> {
    Some("OPENAI_API_KEY".to_string())
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimension() -> usize {
    1536
}

fn default_batch_size() -> usize {
    100
}

fn default_embedding_timeout() -> u64 {
    30
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_top_k() -> usize {
    4
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

fn default_keepalive() -> u64 {
    15
}


fn default_system_prompt() -> String {
    "You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context and the previous conversation to answer the question. \
If you don't know the answer, just say that you don't know. \
Answer in the same language as the question."
        .to_string()
}

fn default_human_prompt() -> String {
    "#Previous Chat History:\n{chat_history}\n\n#Question:\n{question}\n\n#Context:\n{context}\n\n#Answer:"
        .to_string()
}

fn default_models() -> Vec<String> {
    ["gpt-4o-mini", "gpt-3.5-turbo", "gpt-3.5-turbo-16k", "gpt-4", "gpt-4-32k"]
        .iter()
        .map(|m| m.to_string())
        .collect()
}

fn default_profiles() -> Vec<ChatProfile> {
    vec![
        ChatProfile {
            name: "GPT-3.5".to_string(),
            markdown_description: "The underlying LLM model is **GPT-3.5**.".to_string(),
        },
        ChatProfile {
            name: "GPT-4".to_string(),
            markdown_description: "The underlying LLM model is **GPT-4**.".to_string(),
        },
    ]
}

fn default_starters() -> Vec<Starter> {
    vec![
        Starter {
            label: "Morning routine ideation".to_string(),
            message: "Can you help me create a personalized morning routine that would help increase my productivity throughout the day? Start by asking me about my current habits and what activities energize me in the morning.".to_string(),
            icon: Some("/public/idea.svg".to_string()),
        },
        Starter {
            label: "Explain superconductors".to_string(),
            message: "Explain superconductors like I'm five years old.".to_string(),
            icon: Some("/public/cart.svg".to_string()),
        },
        Starter {
            label: "Python script for daily email reports".to_string(),
            message: "Write a script to automate sending daily email reports in Python, and walk me through how I would set it up.".to_string(),
            icon: Some("/public/drug.svg".to_string()),
        },
        Starter {
            label: "Text inviting friend to wedding".to_string(),
            message: "Write a text asking a friend to be my plus-one at a wedding next month. I want to keep it super short and casual, and offer an out.".to_string(),
            icon: Some("/public/paper_airplane.svg".to_string()),
        },
    ]
}
