use crate::config::LlmConfig;
use crate::errors::RagError;
use crate::history::{ChatMessage, Role};
use crate::llm::{ChatModel, ChatOptions, TokenStream};
use async_stream::stream;
use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;

/// One parsed line of a streamed completion
#[derive(Debug, Clone, PartialEq)]
pub enum StreamLine {
    Content(String),
    Done,
    Skip,
}

/// Interpret one line of an OpenAI server-sent event stream.
pub fn parse_stream_line(line: &str) -> Result<StreamLine, RagError> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        // Blank separators, comments, `event:` and `id:` fields
        return Ok(StreamLine::Skip);
    };

    let data = data.trim_start();
    if data == "[DONE]" {
        return Ok(StreamLine::Done);
    }

    let chunk: Value = serde_json::from_str(data)
        .map_err(|e| RagError::Parsing(format!("Invalid stream chunk: {}", e)))?;

    if let Some(error) = chunk.get("error") {
        let message = error["message"].as_str().unwrap_or("unknown error");
        return Err(RagError::Llm(format!("Stream error: {}", message)));
    }

    match chunk["choices"][0]["delta"]["content"].as_str() {
        Some(content) if !content.is_empty() => Ok(StreamLine::Content(content.to_string())),
        _ => Ok(StreamLine::Skip),
    }
}

#[derive(Debug, Clone)]
pub struct OpenAIChatClient {
    client: Client,
    api_key: Option<String>,
    api_base: String,
    max_tokens: Option<u32>,
    request_timeout: Option<Duration>,
}

impl OpenAIChatClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_base: "https://api.openai.com/v1".to_string(),
            max_tokens: None,
            request_timeout: None,
        }
    }

    /// `timeout_seconds` bounds a whole batched completion. Streams are only
    /// bounded per read, so a long answer that keeps producing tokens is not cut.
    pub fn from_config(config: &LlmConfig) -> Result<Self, RagError> {
        let timeout = Duration::from_secs(config.timeout_seconds);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .read_timeout(timeout)
            .build()
            .map_err(|e| RagError::Llm(format!("Failed to create HTTP client: {}", e)))?;

        let api_key = config.auth.resolve_key();
        if api_key.is_none() {
            log::warn!("No API key configured for chat model {}", config.model);
        }

        Ok(Self {
            client,
            api_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            max_tokens: config.max_tokens,
            request_timeout: Some(timeout),
        })
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    fn build_request_body(&self, messages: &[ChatMessage], options: &ChatOptions, stream: bool) -> Value {
        let mut body = json!({
            "model": options.model,
            "messages": self.format_messages(messages),
            "temperature": options.temperature,
        });

        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = max_tokens.into();
        }

        if stream {
            body["stream"] = true.into();
        }

        body
    }

    fn format_messages(&self, messages: &[ChatMessage]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| {
                json!({
                    "role": self.format_role(&msg.role),
                    "content": msg.content,
                })
            })
            .collect()
    }

    fn format_role(&self, role: &Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response, RagError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| RagError::Config("OpenAI API key not configured".to_string()))?;

        let url = format!("{}/chat/completions", self.api_base);
        log::debug!("OpenAI API request to {} (model {})", url, body["model"]);

        let mut request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(body);

        let streaming = body["stream"].as_bool().unwrap_or(false);
        if let (false, Some(timeout)) = (streaming, self.request_timeout) {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RagError::Llm(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let response_text = response.text().await.unwrap_or_default();
            return Err(RagError::Llm(format!(
                "API request failed with status {}: {}",
                status, response_text
            )));
        }

        Ok(response)
    }

    fn parse_response(&self, response: Value) -> Result<String, RagError> {
        let choices = response["choices"]
            .as_array()
            .ok_or_else(|| RagError::Parsing("No choices in response".to_string()))?;

        let choice = choices
            .first()
            .ok_or_else(|| RagError::Parsing("Empty choices array".to_string()))?;

        choice["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| RagError::Parsing("Response has no message content".to_string()))
    }
}

#[async_trait]
impl ChatModel for OpenAIChatClient {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<String, RagError> {
        let body = self.build_request_body(messages, options, false);
        let response = self.send(&body).await?;

        let response_text = response
            .text()
            .await
            .map_err(|e| RagError::Llm(format!("Failed to read response: {}", e)))?;
        log::debug!("OpenAI API response: {}", response_text);

        let response_json: Value = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Parsing(format!("Invalid JSON response: {}", e)))?;

        self.parse_response(response_json)
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<TokenStream, RagError> {
        let body = self.build_request_body(messages, options, true);
        let response = self.send(&body).await?;

        let bytes = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()));
        let mut lines = StreamReader::new(bytes).lines();

        let stream = stream! {
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        log::debug!("Completion stream closed without [DONE]");
                        break;
                    }
                    Err(e) => {
                        yield Err(RagError::Llm(format!("Failed to read stream: {}", e)));
                        break;
                    }
                };

                match parse_stream_line(&line) {
                    Ok(StreamLine::Content(fragment)) => yield Ok(fragment),
                    Ok(StreamLine::Done) => break,
                    Ok(StreamLine::Skip) => {}
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
