//! One conversational retrieval turn, end to end.
//!
//! ```text
//! question ─▶ preprocess ─▶ retrieve (session store) ─▶ format context
//!                                                         │
//! history + question ─────────────────────────────────────┴─▶ prompt ─▶ chat model
//! ```
//!
//! The normalised question is recorded in the session history before the
//! model is called, and the answer is recorded once it is complete.

use crate::config::{AppConfig, RetrievalConfig};
use crate::errors::RagError;
use crate::history::{ChatHistory, ChatMessage};
use crate::llm::{ChatModel, ChatOptions, OpenAIChatClient, TokenStream};
use crate::preprocess::preprocess_query;
use crate::prompt::{format_docs, PromptTemplate};
use crate::rag::{self, Document, Embeddings, InMemoryVectorStore, OpenAIEmbeddings, TextSplitter};
use crate::session::{SessionRegistry, SessionSettings};
use async_stream::stream;
use futures_util::StreamExt;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Outcome of indexing a set of documents for a client
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestSummary {
    pub session_id: String,
    pub documents: usize,
    pub chunks: usize,
}

pub struct RagPipeline {
    retrieval: RetrievalConfig,
    splitter: TextSplitter,
    prompt: PromptTemplate,
    embeddings: Arc<dyn Embeddings>,
    chat_model: Arc<dyn ChatModel>,
    sessions: Arc<SessionRegistry>,
}

struct PreparedTurn {
    messages: Vec<ChatMessage>,
    options: ChatOptions,
}

impl RagPipeline {
    pub fn new(
        config: &AppConfig,
        embeddings: Arc<dyn Embeddings>,
        chat_model: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            retrieval: config.rag.clone(),
            splitter: TextSplitter::new(config.rag.chunk_size, config.rag.chunk_overlap),
            prompt: PromptTemplate::from_config(&config.prompt),
            embeddings,
            chat_model,
            sessions: Arc::new(SessionRegistry::new(SessionSettings::from_config(&config.llm))),
        }
    }

    /// Build the pipeline with the hosted OpenAI embedding and chat clients.
    pub fn from_config(config: &AppConfig) -> Result<Self, RagError> {
        let embeddings = Arc::new(OpenAIEmbeddings::new(config.embeddings.clone())?);
        let chat_model = Arc::new(OpenAIChatClient::from_config(&config.llm)?);
        Ok(Self::new(config, embeddings, chat_model))
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub async fn load_document(&self, path: impl AsRef<Path>) -> Result<Vec<Document>, RagError> {
        rag::load_document(path).await
    }

    pub async fn load_bytes(&self, file_name: &str, bytes: Vec<u8>) -> Result<Vec<Document>, RagError> {
        rag::load_bytes(file_name, bytes).await
    }

    /// Split, embed and index `documents` as the client's retriever.
    ///
    /// An existing retriever for the client is replaced; its history is kept.
    pub async fn create_session_retriever(
        &self,
        client: &str,
        documents: Vec<Document>,
    ) -> Result<IngestSummary, RagError> {
        log::info!("Creating a new client with ID: {}", client);

        let chunks = self.splitter.split_documents(&documents);
        if chunks.is_empty() {
            return Err(RagError::InvalidInput(
                "The uploaded documents contain no text to index".to_string(),
            ));
        }
        let chunk_count = chunks.len();

        let store = InMemoryVectorStore::from_documents(chunks, self.embeddings.as_ref()).await?;
        let retriever = store.as_retriever(self.embeddings.clone(), self.retrieval.top_k);

        self.sessions.ensure_history(client).await;
        self.sessions.insert_retriever(client, retriever).await;

        Ok(IngestSummary {
            session_id: client.to_string(),
            documents: documents.len(),
            chunks: chunk_count,
        })
    }

    async fn prepare_turn(&self, client: &str, query: &str) -> Result<PreparedTurn, RagError> {
        let retriever = self.sessions.get_retriever(client).await?;

        let question = preprocess_query(query);
        let docs = retriever.retrieve(&question).await?;
        let context = format_docs(&docs);

        let chat_history = self
            .sessions
            .push_and_format(client, ChatMessage::user(question.clone()))
            .await?;

        let messages = self.prompt.format(&chat_history, &context, &question);
        let options = self.sessions.settings(client).await.chat_options();

        Ok(PreparedTurn { messages, options })
    }

    /// Answer `query` for `client` in one piece.
    pub async fn run(&self, client: &str, query: &str) -> Result<String, RagError> {
        let turn = self.prepare_turn(client, query).await?;

        let answer = self.chat_model.generate(&turn.messages, &turn.options).await?;

        if !self
            .sessions
            .push_message(client, ChatMessage::assistant(answer.clone()))
            .await
        {
            log::warn!("Client {} ended before its answer was recorded", client);
        }
        Ok(answer)
    }

    /// Answer `query` for `client` as a stream of fragments.
    ///
    /// The full answer is added to the history once the model stream ends
    /// without error. A failed or abandoned stream leaves only the question.
    pub async fn run_stream(&self, client: &str, query: &str) -> Result<TokenStream, RagError> {
        let turn = self.prepare_turn(client, query).await?;

        let mut tokens = self.chat_model.stream(&turn.messages, &turn.options).await?;
        let sessions = self.sessions.clone();
        let client = client.to_string();

        let stream = stream! {
            let mut complete_answer = String::new();

            while let Some(item) = tokens.next().await {
                match item {
                    Ok(fragment) => {
                        complete_answer.push_str(&fragment);
                        yield Ok(fragment);
                    }
                    Err(e) => {
                        log::error!("Answer stream for client {} failed: {}", client, e);
                        yield Err(e);
                        return;
                    }
                }
            }

            if !sessions
                .push_message(&client, ChatMessage::assistant(complete_answer))
                .await
            {
                log::warn!("Client {} ended before its answer was recorded", client);
            }
        };

        Ok(Box::pin(stream))
    }

    /// Conversation so far; unknown or ended clients are an error.
    pub async fn history(&self, client: &str) -> Result<ChatHistory, RagError> {
        self.ensure_session(client).await?;
        Ok(self.sessions.history(client).await.unwrap_or_default())
    }

    pub async fn end_session(&self, client: &str) -> Result<(), RagError> {
        if self.sessions.remove(client).await {
            log::info!("Client {} removed from stores", client);
            Ok(())
        } else {
            Err(RagError::SessionNotFound(client.to_string()))
        }
    }

    pub async fn settings(&self, client: &str) -> Result<SessionSettings, RagError> {
        self.ensure_session(client).await?;
        Ok(self.sessions.settings(client).await)
    }

    pub async fn update_settings(
        &self,
        client: &str,
        settings: SessionSettings,
    ) -> Result<SessionSettings, RagError> {
        self.ensure_session(client).await?;
        self.sessions.update_settings(client, settings).await
    }

    async fn ensure_session(&self, client: &str) -> Result<(), RagError> {
        if self.sessions.contains(client).await {
            Ok(())
        } else {
            Err(RagError::SessionNotFound(client.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiAuth;
    use crate::history::Role;
    use crate::rag::HashEmbeddings;
    use crate::test_utils::mock_openai_server::{MockOpenAIServer, DEFAULT_REPLY};

    /// Hash embeddings that take a while, so concurrent turns overlap.
    struct SlowEmbeddings(HashEmbeddings);

    #[async_trait::async_trait]
    impl Embeddings for SlowEmbeddings {
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            self.0.embed_documents(texts).await
        }

        fn dimension(&self) -> usize {
            self.0.dimension()
        }
    }

    fn pipeline_for(server: &MockOpenAIServer) -> RagPipeline {
        pipeline_with(server, Arc::new(HashEmbeddings::new(256)))
    }

    fn pipeline_with(server: &MockOpenAIServer, embeddings: Arc<dyn Embeddings>) -> RagPipeline {
        let mut config = AppConfig::default();
        config.rag.chunk_size = 60;
        config.rag.chunk_overlap = 10;
        config.rag.top_k = 2;
        config.llm.api_base = server.base_url();
        config.llm.auth = ApiAuth {
            api_key: Some("sk-test".to_string()),
            api_key_env: None,
        };

        let chat = OpenAIChatClient::from_config(&config.llm).unwrap();
        RagPipeline::new(&config, embeddings, Arc::new(chat))
    }

    fn documents() -> Vec<Document> {
        vec![
            Document::new(
                "Rust guarantees memory safety through ownership.\n\n\
                 The borrow checker validates references at compile time.",
            )
            .with_metadata("source", "rust.pdf"),
            Document::new("Bananas are rich in potassium and grow in tropical climates.")
                .with_metadata("source", "fruit.pdf"),
        ]
    }

    #[tokio::test]
    async fn test_create_session_retriever() {
        let server = MockOpenAIServer::start().await;
        let pipeline = pipeline_for(&server);

        let summary = pipeline
            .create_session_retriever("client-1", documents())
            .await
            .unwrap();

        assert_eq!(summary.session_id, "client-1");
        assert_eq!(summary.documents, 2);
        assert!(summary.chunks >= 3);
        assert!(pipeline.history("client-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_documents_rejected() {
        let server = MockOpenAIServer::start().await;
        let pipeline = pipeline_for(&server);

        let result = pipeline
            .create_session_retriever("client-1", vec![Document::new("   ")])
            .await;
        assert!(matches!(result, Err(RagError::InvalidInput(_))));
        assert!(!pipeline.sessions().contains("client-1").await);
    }

    #[tokio::test]
    async fn test_run_records_history_and_prompt() {
        let server = MockOpenAIServer::start().await;
        let pipeline = pipeline_for(&server);
        pipeline.create_session_retriever("c", documents()).await.unwrap();

        let answer = pipeline.run("c", "what does the BORROW checker do?").await.unwrap();
        assert_eq!(answer, DEFAULT_REPLY);

        let history = pipeline.history("c").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.messages()[0].role, Role::User);
        assert_eq!(history.messages()[0].content, "What does the borrow checker do ?");
        assert_eq!(history.messages()[1].content, DEFAULT_REPLY);

        let request = &server.chat_requests()[0];
        let human = request["messages"][1]["content"].as_str().unwrap();
        assert!(human.contains("User: What does the borrow checker do ?\n"));
        assert!(human.contains("borrow checker validates references"));
        assert_eq!(request["model"], "gpt-4o-mini");
        assert_eq!(request["temperature"], 0.0);
    }

    #[tokio::test]
    async fn test_second_turn_sees_first() {
        let server = MockOpenAIServer::start().await;
        let pipeline = pipeline_for(&server);
        pipeline.create_session_retriever("c", documents()).await.unwrap();

        pipeline.run("c", "first question").await.unwrap();
        server.set_reply("Second answer.");
        pipeline.run("c", "second question").await.unwrap();

        let requests = server.chat_requests();
        let human = requests[1]["messages"][1]["content"].as_str().unwrap();
        assert!(human.contains(&format!(
            "User: First question ?\nAssistant: {}\nUser: Second question ?\n",
            DEFAULT_REPLY
        )));
        assert_eq!(pipeline.history("c").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_unknown_client() {
        let server = MockOpenAIServer::start().await;
        let pipeline = pipeline_for(&server);

        let err = pipeline.run("nobody", "hello").await.unwrap_err();
        assert!(matches!(err, RagError::SessionNotFound(ref c) if c == "nobody"));
        assert!(pipeline.run_stream("nobody", "hello").await.is_err());
        assert!(pipeline.history("nobody").await.is_err());
        assert!(pipeline.end_session("nobody").await.is_err());
        assert!(server.chat_requests().is_empty());
    }

    #[tokio::test]
    async fn test_run_stream_updates_history_after_completion() {
        let server = MockOpenAIServer::start().await;
        let pipeline = pipeline_for(&server);
        pipeline.create_session_retriever("c", documents()).await.unwrap();

        let stream = pipeline.run_stream("c", "tell me about ownership").await.unwrap();
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
        assert_eq!(fragments.concat(), DEFAULT_REPLY);

        let history = pipeline.history("c").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.messages()[1].content, DEFAULT_REPLY);
    }

    #[tokio::test]
    async fn test_failed_stream_keeps_only_question() {
        let server = MockOpenAIServer::start().await;
        server.break_streams(true);
        let pipeline = pipeline_for(&server);
        pipeline.create_session_retriever("c", documents()).await.unwrap();

        let results: Vec<Result<String, RagError>> = pipeline
            .run_stream("c", "tell me about ownership")
            .await
            .unwrap()
            .collect()
            .await;
        assert!(results.last().unwrap().is_err());

        let history = pipeline.history("c").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history.messages()[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_model_failure_keeps_question() {
        let server = MockOpenAIServer::start().await;
        let pipeline = pipeline_for(&server);
        pipeline.create_session_retriever("c", documents()).await.unwrap();

        server.fail_next_requests(1);
        let err = pipeline.run("c", "hello").await.unwrap_err();
        assert!(err.is_upstream());
        assert_eq!(pipeline.history("c").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_settings_flow_into_requests() {
        let server = MockOpenAIServer::start().await;
        let pipeline = pipeline_for(&server);
        pipeline.create_session_retriever("c", documents()).await.unwrap();

        let mut settings = pipeline.settings("c").await.unwrap();
        settings.model = "gpt-4".to_string();
        settings.temperature = 1.5;
        pipeline.update_settings("c", settings).await.unwrap();

        pipeline.run("c", "hi").await.unwrap();
        let request = &server.chat_requests()[0];
        assert_eq!(request["model"], "gpt-4");
        assert_eq!(request["temperature"], 1.5);
    }

    #[tokio::test]
    async fn test_reupload_keeps_history() {
        let server = MockOpenAIServer::start().await;
        let pipeline = pipeline_for(&server);
        pipeline.create_session_retriever("c", documents()).await.unwrap();
        pipeline.run("c", "hi").await.unwrap();

        pipeline
            .create_session_retriever("c", vec![Document::new("A brand new document.")])
            .await
            .unwrap();
        assert_eq!(pipeline.history("c").await.unwrap().len(), 2);

        pipeline.end_session("c").await.unwrap();
        assert!(pipeline.history("c").await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_turns_keep_every_message() {
        let server = MockOpenAIServer::start().await;
        let pipeline = pipeline_with(&server, Arc::new(SlowEmbeddings(HashEmbeddings::new(256))));
        pipeline.create_session_retriever("c", documents()).await.unwrap();

        let (first, second) = tokio::join!(pipeline.run("c", "first"), pipeline.run("c", "second"));
        first.unwrap();
        second.unwrap();

        let history = pipeline.history("c").await.unwrap();
        assert_eq!(history.len(), 4);
        let questions: Vec<&str> = history
            .messages()
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect();
        assert!(questions.contains(&"First ?"));
        assert!(questions.contains(&"Second ?"));
    }

    #[tokio::test]
    async fn test_ended_session_stays_ended_after_stream() {
        let server = MockOpenAIServer::start().await;
        let pipeline = pipeline_for(&server);
        pipeline.create_session_retriever("c", documents()).await.unwrap();

        let stream = pipeline.run_stream("c", "tell me about ownership").await.unwrap();
        pipeline.end_session("c").await.unwrap();

        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
        assert_eq!(fragments.concat(), DEFAULT_REPLY);

        assert!(matches!(
            pipeline.history("c").await,
            Err(RagError::SessionNotFound(_))
        ));
        assert!(pipeline.sessions().history("c").await.is_none());
    }
}
