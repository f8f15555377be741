//! HTTP server for the knee telemetry pipeline.
//!
//! This module provides an HTTP server that:
//! - Classifies readings on demand via POST /predict
//! - Classifies and persists readings via POST /record
//! - Serves windowed history and statistics via GET /history and /assessment
//! - Answers questions grounded in recent readings via POST /chatbot
//!
//! # Architecture
//!
//! ```text
//! Wearable ──→ POST /record ──→ [features] ──→ [classifier] ──→ store
//!                                                                 │
//! App ──→ GET /assessment, POST /chatbot ──→ window query ←───────┘
//!                                                │
//!                                      [summary | digest] ──→ text generator
//! ```

use crate::classifier::{Classifier, DenseModel, InferenceError};
use crate::config::{Config, StoreBackend};
use crate::core::{
    build_features, ingestion_time, summarize, FeatureError, Reading, RecentWindow, WindowSummary,
};
use crate::dialogue::{ChatError, DialogueComposer};
use crate::generation::GeminiClient;
use crate::store::{StoreError, TelemetryStore};
use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub host: IpAddr,
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self { host, port }
    }

    /// Bind to localhost only
    pub fn local(port: u16) -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }
}

/// Shared server state
pub struct ServerState {
    /// Motion classifier
    classifier: Classifier,
    /// Reading store
    store: TelemetryStore,
    /// Prompt construction for the assistant
    dialogue: DialogueComposer,
    /// Text-generation client
    generator: GeminiClient,
}

impl ServerState {
    /// Create new server state
    pub fn new(
        classifier: Classifier,
        store: TelemetryStore,
        dialogue: DialogueComposer,
        generator: GeminiClient,
    ) -> Self {
        Self {
            classifier,
            store,
            dialogue,
            generator,
        }
    }

    /// Build every component from configuration.
    ///
    /// The model must load; a store that cannot be opened degrades to an
    /// offline store so the service still answers /predict and /health.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        config.validate()?;

        let model = DenseModel::load(&config.model_path).with_context(|| {
            format!("failed to load model from {}", config.model_path.display())
        })?;
        let classifier = Classifier::new(Box::new(model));
        tracing::info!(labels = ?classifier.labels(), "Model loaded");

        let window = RecentWindow::days(config.window_days);
        let store = open_store(config, window);

        let dialogue = DialogueComposer::new(store.clone(), config.digest_limit, config.timezone()?);
        let generator = GeminiClient::new(config.generation.resolve())?;

        Ok(Self::new(classifier, store, dialogue, generator))
    }
}

fn open_store(config: &Config, window: RecentWindow) -> TelemetryStore {
    match config.store {
        StoreBackend::Memory => {
            TelemetryStore::new(Arc::new(crate::store::MemoryRepository::new()), window)
        }
        #[cfg(feature = "sqlite")]
        StoreBackend::Sqlite => {
            match crate::store::SqliteRepository::open(&config.database_path) {
                Ok(repo) => {
                    tracing::info!("Telemetry store: {}", config.database_path.display());
                    TelemetryStore::new(Arc::new(repo), window)
                }
                Err(e) => {
                    tracing::warn!("Telemetry store unavailable: {e:#}");
                    TelemetryStore::new(
                        Arc::new(crate::store::OfflineRepository::new(format!("{e:#}"))),
                        window,
                    )
                }
            }
        }
        #[cfg(not(feature = "sqlite"))]
        StoreBackend::Sqlite => {
            tracing::warn!("sqlite feature not enabled; telemetry store unavailable");
            TelemetryStore::new(
                Arc::new(crate::store::OfflineRepository::new("sqlite support not compiled in")),
                window,
            )
        }
    }
}

/// Prediction response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction_class: String,
}

/// Response from record endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordResponse {
    pub status: String,
    pub prediction_class: String,
}

/// Chat request body
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub user_id: Option<String>,
    pub message: Option<String>,
}

/// Chat response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

/// `?user_id=` query string
#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: Option<String>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
        }),
    )
}

fn body_error(e: JsonRejection) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "INVALID_BODY", e.body_text())
}

fn feature_error(e: FeatureError) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string())
}

fn inference_error(e: InferenceError) -> ApiError {
    tracing::warn!("Inference failed: {}", e);
    api_error(StatusCode::BAD_REQUEST, "INFERENCE_ERROR", e.to_string())
}

fn store_error(e: StoreError) -> ApiError {
    tracing::error!("Store error: {}", e);
    match e {
        StoreError::Unavailable(_) => api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "STORE_UNAVAILABLE",
            "Telemetry store is unavailable",
        ),
        StoreError::Query(_) => api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "STORE_ERROR",
            "Telemetry store query failed",
        ),
    }
}

fn required_user_id(user_id: Option<String>) -> Result<String, ApiError> {
    user_id.filter(|id| !id.is_empty()).ok_or_else(|| {
        api_error(
            StatusCode::BAD_REQUEST,
            "MISSING_USER_ID",
            "user_id is required",
        )
    })
}

/// `user_id` of a reading body. Null counts as absent.
fn body_user_id(raw: &Value) -> Result<String, ApiError> {
    match raw.get("user_id") {
        None | Some(Value::Null) => required_user_id(None),
        Some(Value::String(id)) => required_user_id(Some(id.clone())),
        Some(_) => Err(api_error(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            "user_id must be a string",
        )),
    }
}

/// GET /
async fn index() -> &'static str {
    "Backend is running!"
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /predict
async fn predict(
    State(state): State<Arc<ServerState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let Json(raw) = body.map_err(body_error)?;
    let features = build_features(&raw).map_err(feature_error)?;
    let prediction_class = state.classifier.classify(&features).map_err(inference_error)?;

    Ok(Json(PredictResponse { prediction_class }))
}

/// POST /record
///
/// Classifies the reading and persists it with a server timestamp. Nothing is
/// stored unless classification succeeded.
async fn record(
    State(state): State<Arc<ServerState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<RecordResponse>, ApiError> {
    let Json(raw) = body.map_err(body_error)?;
    let user_id = body_user_id(&raw)?;

    let features = build_features(&raw).map_err(feature_error)?;
    let prediction_class = state.classifier.classify(&features).map_err(inference_error)?;

    let reading = Reading::new(user_id, &features, ingestion_time(), prediction_class.clone());
    state.store.append(reading).await.map_err(store_error)?;

    Ok(Json(RecordResponse {
        status: "saved".to_string(),
        prediction_class,
    }))
}

/// GET /history?user_id=
async fn history(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<Reading>>, ApiError> {
    let user_id = required_user_id(query.user_id)?;
    let readings = state
        .store
        .query_window(&user_id, Utc::now())
        .await
        .map_err(store_error)?;

    Ok(Json(readings))
}

/// GET /assessment?user_id=
async fn assessment(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<WindowSummary>, ApiError> {
    let user_id = required_user_id(query.user_id)?;
    let readings = state
        .store
        .query_window(&user_id, Utc::now())
        .await
        .map_err(store_error)?;

    let summary = summarize(&readings)
        .map_err(|_| api_error(StatusCode::NOT_FOUND, "NO_DATA", "No data found"))?;
    Ok(Json(summary))
}

/// POST /chatbot
async fn chatbot(
    State(state): State<Arc<ServerState>>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = body.map_err(body_error)?;
    let (Some(user_id), Some(message)) = (
        request.user_id.filter(|s| !s.is_empty()),
        request.message.filter(|s| !s.is_empty()),
    ) else {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "MISSING_FIELDS",
            "user_id and message are required",
        ));
    };

    let response = state
        .dialogue
        .reply(&state.generator, &user_id, &message, Utc::now())
        .await
        .map_err(|e| match e {
            ChatError::Store(e) => store_error(e),
            ChatError::Upstream(e) if e.is_timeout() => api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "UPSTREAM_TIMEOUT",
                "The assistant took too long to respond",
            ),
            ChatError::Upstream(_) => api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "UPSTREAM_ERROR",
                "The assistant could not generate a response",
            ),
        })?;

    Ok(Json(ChatResponse { response }))
}

/// Build the application router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/record", post(record))
        .route("/history", get(history))
        .route("/assessment", get(assessment))
        .route("/chatbot", post(chatbot))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    state: ServerState,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(Arc::new(state));

    let addr = SocketAddr::new(config.host, config.port);
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Knee telemetry server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
