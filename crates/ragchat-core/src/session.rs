//! Per-client session state
//!
//! Each client id owns a conversation history, a retriever over the
//! documents it uploaded and its chat settings. State lives in memory for
//! the lifetime of the process; nothing is evicted or persisted.

use crate::config::LlmConfig;
use crate::errors::RagError;
use crate::history::{format_chat_history, ChatHistory, ChatMessage};
use crate::llm::ChatOptions;
use crate::rag::VectorStoreRetriever;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Chat settings a client can change from the settings panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    pub model: String,
    pub temperature: f32,
    pub streaming: bool,
}

impl SessionSettings {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            streaming: config.streaming,
        }
    }

    pub fn chat_options(&self) -> ChatOptions {
        ChatOptions::new(self.model.clone(), self.temperature)
    }

    pub fn validate(&self) -> Result<(), RagError> {
        if self.model.trim().is_empty() {
            return Err(RagError::InvalidInput("Model cannot be empty".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(RagError::InvalidInput(format!(
                "Temperature must be between 0 and 2, got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

/// Registry of histories, retrievers and settings keyed by client id
pub struct SessionRegistry {
    histories: RwLock<HashMap<String, ChatHistory>>,
    retrievers: RwLock<HashMap<String, VectorStoreRetriever>>,
    settings: RwLock<HashMap<String, SessionSettings>>,
    default_settings: SessionSettings,
}

impl SessionRegistry {
    pub fn new(default_settings: SessionSettings) -> Self {
        Self {
            histories: RwLock::new(HashMap::new()),
            retrievers: RwLock::new(HashMap::new()),
            settings: RwLock::new(HashMap::new()),
            default_settings,
        }
    }

    /// Make sure the client has a history, keeping an existing one intact.
    pub async fn ensure_history(&self, client: &str) {
        self.histories
            .write()
            .await
            .entry(client.to_string())
            .or_default();
    }

    pub async fn history(&self, client: &str) -> Option<ChatHistory> {
        self.histories.read().await.get(client).cloned()
    }

    /// Append a message to an existing history.
    ///
    /// Returns false when the client has no history, e.g. because the session
    /// was ended while an answer was still being produced.
    pub async fn push_message(&self, client: &str, message: ChatMessage) -> bool {
        match self.histories.write().await.get_mut(client) {
            Some(history) => {
                history.add_message(message);
                true
            }
            None => false,
        }
    }

    /// Append a message and render the resulting history as prompt text,
    /// both under one write lock.
    pub async fn push_and_format(
        &self,
        client: &str,
        message: ChatMessage,
    ) -> Result<String, RagError> {
        let mut histories = self.histories.write().await;
        let history = histories
            .get_mut(client)
            .ok_or_else(|| RagError::SessionNotFound(client.to_string()))?;

        history.add_message(message);
        Ok(format_chat_history(history.messages()))
    }

    pub async fn get_retriever(&self, client: &str) -> Result<VectorStoreRetriever, RagError> {
        self.retrievers
            .read()
            .await
            .get(client)
            .cloned()
            .ok_or_else(|| RagError::SessionNotFound(client.to_string()))
    }

    /// Register a retriever, replacing any previous one for the client.
    pub async fn insert_retriever(&self, client: &str, retriever: VectorStoreRetriever) {
        let previous = self
            .retrievers
            .write()
            .await
            .insert(client.to_string(), retriever);

        if previous.is_some() {
            log::warn!("Client '{}' already exists in stores. Erasing it.", client);
        }
    }

    /// Settings a client starts with before changing anything
    pub fn default_settings(&self) -> &SessionSettings {
        &self.default_settings
    }

    pub async fn settings(&self, client: &str) -> SessionSettings {
        self.settings
            .read()
            .await
            .get(client)
            .cloned()
            .unwrap_or_else(|| self.default_settings.clone())
    }

    pub async fn update_settings(
        &self,
        client: &str,
        settings: SessionSettings,
    ) -> Result<SessionSettings, RagError> {
        settings.validate()?;
        log::info!("Settings updated for client {}: {:?}", client, settings);
        self.settings
            .write()
            .await
            .insert(client.to_string(), settings.clone());
        Ok(settings)
    }

    /// Drop everything held for the client. Returns false if nothing was known.
    pub async fn remove(&self, client: &str) -> bool {
        let had_history = self.histories.write().await.remove(client).is_some();
        let had_retriever = self.retrievers.write().await.remove(client).is_some();
        self.settings.write().await.remove(client);
        had_history || had_retriever
    }

    pub async fn contains(&self, client: &str) -> bool {
        self.retrievers.read().await.contains_key(client)
    }

    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.retrievers.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(SessionSettings::from_config(&LlmConfig::default()))
    }
}
