//! End-to-end pipeline tests with offline embeddings and a scripted chat model.

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use ragchat_core::{
    AppConfig, ChatMessage, ChatModel, ChatOptions, HashEmbeddings, RagError, RagPipeline, Role,
    TokenStream,
};
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Answers with the first retrieved line of context and records every prompt.
#[derive(Default)]
struct EchoContextModel {
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl EchoContextModel {
    fn answer(messages: &[ChatMessage]) -> String {
        let human = &messages[1].content;
        let context = human.split("#Context:\n").nth(1).unwrap_or_default();
        context.lines().next().unwrap_or_default().to_string()
    }
}

#[async_trait]
impl ChatModel for EchoContextModel {
    async fn generate(&self, messages: &[ChatMessage], _: &ChatOptions) -> Result<String, RagError> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        Ok(Self::answer(messages))
    }

    async fn stream(&self, messages: &[ChatMessage], _: &ChatOptions) -> Result<TokenStream, RagError> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        let words: Vec<Result<String, RagError>> = Self::answer(messages)
            .split_inclusive(' ')
            .map(|w| Ok(w.to_string()))
            .collect();
        Ok(Box::pin(stream::iter(words)))
    }
}

fn write_notes() -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    write!(
        file,
        "The lighthouse keeper lights the lamp at dusk.\n\n\
         Ferries leave the harbour every hour on the hour.\n\n\
         The museum is closed on Mondays."
    )
    .unwrap();
    file
}

fn pipeline(model: Arc<EchoContextModel>) -> RagPipeline {
    let mut config = AppConfig::default();
    config.rag.chunk_size = 60;
    config.rag.chunk_overlap = 0;
    config.rag.top_k = 1;
    RagPipeline::new(&config, Arc::new(HashEmbeddings::new(512)), model)
}

#[tokio::test]
async fn test_upload_then_ask() {
    let model = Arc::new(EchoContextModel::default());
    let pipeline = pipeline(model.clone());
    let notes = write_notes();

    let documents = pipeline.load_document(notes.path()).await.unwrap();
    let summary = pipeline
        .create_session_retriever("visitor", documents)
        .await
        .unwrap();
    assert_eq!(summary.chunks, 3);

    let answer = pipeline.run("visitor", "when do the ferries leave?").await.unwrap();
    assert_eq!(answer, "Ferries leave the harbour every hour on the hour.");

    let prompts = model.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0][0].role, Role::System);
    assert!(prompts[0][1].content.contains("When do the ferries leave ?"));
}

#[tokio::test]
async fn test_streamed_answer_lands_in_history() {
    let model = Arc::new(EchoContextModel::default());
    let pipeline = pipeline(model);
    let documents = pipeline
        .load_bytes("notes.txt", b"The museum is closed on Mondays.".to_vec())
        .await
        .unwrap();
    pipeline.create_session_retriever("visitor", documents).await.unwrap();

    let fragments: Vec<String> = pipeline
        .run_stream("visitor", "is the museum open on monday")
        .await
        .unwrap()
        .map(|f| f.unwrap())
        .collect()
        .await;
    assert_eq!(fragments.concat(), "The museum is closed on Mondays.");

    let history = pipeline.history("visitor").await.unwrap();
    let roles: Vec<Role> = history.messages().iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant]);
    assert_eq!(history.messages()[1].content, "The museum is closed on Mondays.");
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let model = Arc::new(EchoContextModel::default());
    let pipeline = pipeline(model);

    let harbour = pipeline
        .load_bytes("a.txt", b"Ferries leave the harbour every hour.".to_vec())
        .await
        .unwrap();
    let museum = pipeline
        .load_bytes("b.txt", b"The museum is closed on Mondays.".to_vec())
        .await
        .unwrap();
    pipeline.create_session_retriever("a", harbour).await.unwrap();
    pipeline.create_session_retriever("b", museum).await.unwrap();

    let answer = pipeline.run("b", "when do ferries leave").await.unwrap();
    assert_eq!(answer, "The museum is closed on Mondays.");
    assert!(pipeline.history("a").await.unwrap().is_empty());
}
