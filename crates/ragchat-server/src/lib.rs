//! HTTP front door for session-scoped document chat.
//!
//! A client uploads documents to open a session, then posts questions to it
//! and receives answers either as JSON or as a Server-Sent Events stream of
//! tokens. Chat metadata (profiles, starters, settings panel) is served for
//! the browser front-end, along with static assets under `/public`.

pub mod error;
pub mod sse;
pub mod ui;

pub use error::{Result, ServerError};
pub use sse::{ChatEvent, SseEvent, SseStream};

use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::{middleware, Router};
use ragchat_core::config::{ServerSettings, UiConfig};
use ragchat_core::{Document, RagPipeline, SessionSettings};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Configuration for the chat server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address, `host:port`
    pub bind_addr: String,
    /// Enable CORS
    pub enable_cors: bool,
    /// CORS allowed origins (if None, allows any origin)
    pub cors_origins: Option<Vec<String>>,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
    /// Enable request logging
    pub enable_logging: bool,
    /// Keep-alive interval for SSE connections
    pub sse_keepalive_interval: Duration,
    /// Directory served under `/public`
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_settings(&ServerSettings::default())
    }
}

impl ServerConfig {
    /// Create a new server configuration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            bind_addr: settings.bind_address(),
            enable_cors: settings.enable_cors,
            cors_origins: settings.cors_origins.clone(),
            max_body_size: settings.max_upload_bytes,
            enable_logging: true,
            sse_keepalive_interval: Duration::from_secs(settings.sse_keepalive_seconds),
            static_dir: settings.static_dir.clone(),
        }
    }

    /// Set the bind address.
    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// Set allowed CORS origins.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Set maximum request body size.
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = dir.into();
        self
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RagPipeline>,
    pub config: ServerConfig,
    pub ui: Arc<UiConfig>,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub content: String,
    #[serde(default)]
    pub stream: Option<bool>,
}

/// Partial update of a session's chat settings.
#[derive(Debug, Default, Deserialize)]
pub struct SettingsUpdate {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub streaming: Option<bool>,
}

impl SettingsUpdate {
    fn apply(self, mut settings: SessionSettings) -> SessionSettings {
        if let Some(model) = self.model {
            settings.model = model;
        }
        if let Some(temperature) = self.temperature {
            settings.temperature = temperature;
        }
        if let Some(streaming) = self.streaming {
            settings.streaming = streaming;
        }
        settings
    }
}

fn upload_error(context: &str, err: MultipartError) -> ServerError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::PayloadTooLarge(err.body_text())
    } else {
        ServerError::invalid_request(format!("{}: {}", context, err))
    }
}

/// Load every uploaded file of a multipart body.
async fn read_uploads(pipeline: &RagPipeline, mut multipart: Multipart) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    let mut files = 0;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| upload_error("Malformed multipart body", e))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            log::debug!("Ignoring multipart field without file name: {:?}", field.name());
            continue;
        };

        let bytes = field
            .bytes()
            .await
            .map_err(|e| upload_error(&format!("Failed to read upload {}", file_name), e))?;

        log::info!("Received upload {} ({} bytes)", file_name, bytes.len());
        documents.extend(pipeline.load_bytes(&file_name, bytes.to_vec()).await?);
        files += 1;
    }

    if files == 0 {
        return Err(ServerError::missing_field("file"));
    }

    Ok(documents)
}

/// Handler for the /sessions POST endpoint.
async fn create_session_handler(
    State(app_state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let documents = read_uploads(&app_state.pipeline, multipart).await?;

    let client = uuid::Uuid::new_v4().to_string();
    let summary = app_state
        .pipeline
        .create_session_retriever(&client, documents)
        .await?;

    log::info!(
        "Session {} ready with {} chunks from {} documents",
        client,
        summary.chunks,
        summary.documents
    );
    Ok((StatusCode::CREATED, Json(summary)))
}

/// Handler for the /sessions/{id}/documents PUT endpoint.
async fn replace_documents_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<String>,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    // Only existing sessions may be re-indexed.
    app_state.pipeline.settings(&session_id).await?;

    let documents = read_uploads(&app_state.pipeline, multipart).await?;
    let summary = app_state
        .pipeline
        .create_session_retriever(&session_id, documents)
        .await?;

    Ok(Json(summary))
}

/// Handler for the /sessions/{id}/messages POST endpoint.
async fn message_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<MessageRequest>,
) -> Result<Response> {
    let settings = app_state.pipeline.settings(&session_id).await?;
    let streaming = request.stream.unwrap_or(settings.streaming);

    log::info!(
        "Received message for session {} (streaming: {})",
        session_id,
        streaming
    );

    if streaming {
        let tokens = app_state
            .pipeline
            .run_stream(&session_id, &request.content)
            .await?;

        return Ok(sse::create_sse_response_with_keepalive(
            sse::chat_events(tokens),
            app_state.config.sse_keepalive_interval,
            "keep-alive",
        ));
    }

    let answer = app_state
        .pipeline
        .run(&session_id, &request.content)
        .await?;

    Ok(Json(json!({
        "session_id": session_id,
        "answer": answer,
        "timestamp": chrono::Utc::now()
    }))
    .into_response())
}

/// Handler for the /sessions/{id}/history GET endpoint.
async fn history_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let history = app_state.pipeline.history(&session_id).await?;

    Ok(Json(json!({
        "session_id": session_id,
        "messages": history,
    })))
}

/// Handler for the /sessions/{id}/settings GET endpoint.
async fn settings_get_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSettings>> {
    Ok(Json(app_state.pipeline.settings(&session_id).await?))
}

/// Handler for the /sessions/{id}/settings PUT endpoint.
async fn settings_update_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<String>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<SessionSettings>> {
    let current = app_state.pipeline.settings(&session_id).await?;
    let updated = app_state
        .pipeline
        .update_settings(&session_id, update.apply(current))
        .await?;

    Ok(Json(updated))
}

/// Handler for the /sessions/{id} DELETE endpoint.
async fn delete_session_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    app_state.pipeline.end_session(&session_id).await?;

    Ok(Json(json!({
        "status": "deleted",
        "session_id": session_id,
        "timestamp": chrono::Utc::now()
    })))
}

async fn profiles_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!(app_state.ui.profiles))
}

async fn starters_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!(app_state.ui.starters))
}

async fn chat_settings_handler(State(app_state): State<AppState>) -> Json<Vec<ui::SettingsWidget>> {
    let defaults = app_state.pipeline.sessions().default_settings();
    Json(ui::settings_widgets(&app_state.ui, defaults))
}

/// The chat HTTP server.
pub struct AppServer {
    pipeline: Arc<RagPipeline>,
    config: ServerConfig,
    ui: Arc<UiConfig>,
}

impl AppServer {
    pub fn new(pipeline: Arc<RagPipeline>, config: ServerConfig, ui: UiConfig) -> Self {
        Self {
            pipeline,
            config,
            ui: Arc::new(ui),
        }
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the Axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            pipeline: self.pipeline.clone(),
            config: self.config.clone(),
            ui: self.ui.clone(),
        };

        let mut router = Router::new()
            .route(
                "/health",
                get(|| async {
                    Json(HealthResponse {
                        status: "ok".to_string(),
                        version: ragchat_core::version().to_string(),
                        timestamp: chrono::Utc::now(),
                    })
                }),
            )
            // Sessions
            .route("/sessions", axum::routing::post(create_session_handler))
            .route("/sessions/{id}", axum::routing::delete(delete_session_handler))
            .route(
                "/sessions/{id}/documents",
                axum::routing::put(replace_documents_handler),
            )
            .route("/sessions/{id}/messages", axum::routing::post(message_handler))
            .route("/sessions/{id}/history", get(history_handler))
            .route(
                "/sessions/{id}/settings",
                get(settings_get_handler).put(settings_update_handler),
            )
            // Front-end metadata
            .route("/chat/profiles", get(profiles_handler))
            .route("/chat/starters", get(starters_handler))
            .route("/chat/settings", get(chat_settings_handler))
            .nest_service("/public", ServeDir::new(&self.config.static_dir))
            .layer(DefaultBodyLimit::max(self.config.max_body_size))
            .with_state(state);

        if self.config.enable_logging {
            router = router.layer(middleware::from_fn(
                |request: axum::http::Request<axum::body::Body>, next: axum::middleware::Next| async {
                    let request_id = uuid::Uuid::new_v4().to_string();
                    let method = request.method().clone();
                    let uri = request.uri().clone();
                    let quiet = uri.path() == "/health";

                    if quiet {
                        log::debug!("Request {} {} {}", request_id, method, uri);
                    } else {
                        log::info!("Request {} {} {}", request_id, method, uri);
                    }

                    let start = std::time::Instant::now();
                    let response = next.run(request).await;
                    let duration = start.elapsed();

                    if quiet {
                        log::debug!("Response {} {} in {:?}", request_id, response.status(), duration);
                    } else {
                        log::info!("Response {} {} in {:?}", request_id, response.status(), duration);
                    }

                    response
                },
            ));
        }

        router = router.layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            let cors_layer = if let Some(ref origins) = self.config.cors_origins {
                let origins: std::result::Result<Vec<_>, _> =
                    origins.iter().map(|s| s.parse()).collect();
                match origins {
                    Ok(origins) => CorsLayer::new()
                        .allow_origin(origins)
                        .allow_methods(Any)
                        .allow_headers(Any),
                    Err(_) => {
                        log::warn!("Invalid CORS origin in configuration, allowing any origin");
                        CorsLayer::permissive()
                    }
                }
            } else {
                CorsLayer::permissive()
            };
            router = router.layer(cors_layer);
        }

        router
    }

    async fn bind(&self) -> Result<TcpListener> {
        TcpListener::bind(&self.config.bind_addr).await.map_err(|e| {
            ServerError::config_error(format!(
                "Failed to bind to {}: {}",
                self.config.bind_addr, e
            ))
        })
    }

    fn log_endpoints(&self, addr: &str) {
        log::info!("Health check: http://{}/health", addr);
        log::info!("Upload documents: POST http://{}/sessions", addr);
        log::info!("Ask questions: POST http://{}/sessions/{{id}}/messages", addr);
        log::info!("Static files: http://{}/public", addr);
    }

    /// Start the server with graceful shutdown support.
    ///
    /// The server will shut down when the provided shutdown signal is received.
    pub async fn serve_with_shutdown<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = self.bind().await?;
        let addr = listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| self.config.bind_addr.clone());

        log::info!("Chat server starting on {}", addr);
        self.log_endpoints(&addr);

        let router = self.build_router();
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)))?;

        log::info!("Chat server shut down gracefully");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            log::info!("Received SIGTERM, shutting down...");
        },
    }
}
