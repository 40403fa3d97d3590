//! Server-Sent Events for streamed answers.
//!
//! A streamed answer is a sequence of `token` events followed by exactly one
//! `done` or `error` event.

use axum::response::sse::{Event as AxumEvent, KeepAlive};
use axum::response::{IntoResponse, Response, Sse};
use futures_util::{Stream, StreamExt};
use pin_project_lite::pin_project;
use ragchat_core::TokenStream;
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use crate::error::{Result, ServerError};

/// One step of a streamed answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChatEvent {
    Token { content: String },
    Done { answer: String },
    Error { error: String },
}

impl ChatEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ChatEvent::Token { .. } => "token",
            ChatEvent::Done { .. } => "done",
            ChatEvent::Error { .. } => "error",
        }
    }
}

/// Turn model fragments into chat events, closing with `done` or `error`.
pub fn chat_events(mut tokens: TokenStream) -> impl Stream<Item = ChatEvent> + Send {
    async_stream::stream! {
        let mut answer = String::new();

        while let Some(item) = tokens.next().await {
            match item {
                Ok(content) => {
                    answer.push_str(&content);
                    yield ChatEvent::Token { content };
                }
                Err(e) => {
                    yield ChatEvent::Error { error: e.to_string() };
                    return;
                }
            }
        }

        yield ChatEvent::Done { answer };
    }
}

/// An SSE event that can be sent to clients.
#[derive(Debug, Clone)]
pub struct SseEvent {
    /// Event type (optional)
    pub event_type: Option<String>,
    /// Event data
    pub data: String,
    /// Event ID (optional)
    pub id: Option<String>,
}

impl SseEvent {
    /// Create a new SSE event with event type and data.
    pub fn with_type(event_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event_type: Some(event_type.into()),
            data: data.into(),
            id: None,
        }
    }

    /// Set the event ID.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn from_chat_event(event: &ChatEvent) -> Result<Self> {
        let data = serde_json::to_string(event).map_err(ServerError::Json)?;
        Ok(Self::with_type(event.event_type(), data))
    }
}

impl From<SseEvent> for AxumEvent {
    fn from(event: SseEvent) -> Self {
        let mut axum_event = AxumEvent::default().data(event.data);

        if let Some(event_type) = event.event_type {
            axum_event = axum_event.event(event_type);
        }

        if let Some(id) = event.id {
            axum_event = axum_event.id(id);
        }

        axum_event
    }
}

pin_project! {
    /// A stream wrapper that converts chat events to SSE events.
    pub struct SseStream<S> {
        #[pin]
        inner: S,
        sequence: u64,
    }
}

impl<S> SseStream<S> {
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            sequence: 0,
        }
    }
}

impl<S> Stream for SseStream<S>
where
    S: Stream<Item = ChatEvent>,
{
    type Item = std::result::Result<AxumEvent, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(event)) => {
                *this.sequence += 1;
                let sse_event = match SseEvent::from_chat_event(&event) {
                    Ok(sse_event) => sse_event,
                    Err(e) => {
                        log::error!("Failed to convert chat event to SSE: {}", e);
                        SseEvent::with_type(
                            "error",
                            json!({"error": format!("Failed to serialize event: {}", e)}).to_string(),
                        )
                    }
                };
                Poll::Ready(Some(Ok(sse_event.with_id(this.sequence.to_string()).into())))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Create an SSE response with custom keep-alive settings.
pub fn create_sse_response_with_keepalive<S>(
    stream: S,
    keepalive_interval: Duration,
    keepalive_text: impl Into<String>,
) -> Response
where
    S: Stream<Item = ChatEvent> + Send + 'static,
{
    let sse_stream = SseStream::new(stream);

    Sse::new(sse_stream)
        .keep_alive(
            KeepAlive::new()
                .interval(keepalive_interval)
                .text(keepalive_text.into()),
        )
        .into_response()
}
