//! HairGator HTTP API
//!
//! Axum server exposing the chat turn plus a few read-only helpers.
//!
//! Each endpoint has a thin axum handler that delegates to an inner function
//! returning `(StatusCode, serde_json::Value)`, so the logic is testable
//! without going through the router.
//!
//! Endpoints:
//! - POST /chat               — one designer turn
//! - GET  /                   — service banner
//! - GET  /health             — backend and data status
//! - GET  /version            — server version info
//! - GET  /styles/search      — keyword lookup over the style table
//! - GET  /parameters/:name   — allowed values for one recipe parameter

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use hairgator_core::context::{PROFESSIONAL_KEYWORDS, QUESTION_PATTERNS};
use hairgator_core::prompts::{parameter_info, PARAMETER_COUNT};
use hairgator_core::{CompletionBackend, HairgatorConfig, VisionBackend};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;

use crate::subsystems::chat::{self, ChatError, ChatRequest};
use crate::subsystems::conversation::ConversationManager;
use crate::subsystems::styles::{StyleTable, MAX_SEARCH_LIMIT};

pub const SERVICE_NAME: &str = "HAIRGATOR Professional Chat";

/// Shared state for all HTTP handlers
pub struct HttpState {
    pub config: HairgatorConfig,
    pub styles: StyleTable,
    pub conversations: ConversationManager,
    pub vision: Option<Box<dyn VisionBackend>>,
    pub completion: Option<Box<dyn CompletionBackend>>,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    let cors = state.config.http.cors;
    let router = Router::new()
        .route("/", get(root_handler))
        .route("/chat", post(chat_handler))
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/styles/search", get(style_search_handler))
        .route("/parameters/:name", get(parameter_handler))
        .with_state(state);

    if cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<HttpState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("HairGator HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct StyleSearchParams {
    pub query: Option<String>,
    pub limit: Option<usize>,
}

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }

    fn into_value(self) -> serde_json::Value {
        serde_json::json!({
            "error": self.error,
            "status": self.status,
        })
    }
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

/// Inner chat — runs one turn; validation failures map to 422.
pub async fn chat_inner(state: &HttpState, req: ChatRequest) -> (StatusCode, serde_json::Value) {
    match chat::process_chat(state, req).await {
        Ok(response) => match serde_json::to_value(&response) {
            Ok(body) => (StatusCode::OK, body),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new(e.to_string()).into_value(),
            ),
        },
        Err(ChatError::Validation(msg)) => {
            tracing::info!(error = %msg, "Chat request rejected");
            (StatusCode::UNPROCESSABLE_ENTITY, ErrorResponse::new(msg).into_value())
        }
    }
}

/// Inner root — service banner (pure apart from reading state).
pub fn root_inner(state: &HttpState) -> serde_json::Value {
    serde_json::json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "features": [
            "42 formula + 56 parameter recipes",
            "hair photo analysis",
            "style table lookup",
            "follow-up explanations",
            "conversation history",
        ],
        "status": {
            "conversation_store": state.conversations.backend_name(),
            "completion": state.completion.is_some(),
            "vision": state.vision.is_some(),
            "styles_loaded": state.styles.len(),
        },
    })
}

/// Inner health — reports which backends are live and what data is loaded.
pub fn health_inner(state: &HttpState) -> (StatusCode, serde_json::Value) {
    (
        StatusCode::OK,
        serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now(),
            "services": {
                "conversation_store": state.conversations.backend_name(),
                "completion": state.completion.as_deref().map(|c| c.name()).unwrap_or("fallback"),
                "vision": state.vision.as_deref().map(|v| v.name()).unwrap_or("disabled"),
            },
            "data": {
                "rag_styles": state.styles.len(),
                "total_parameters": PARAMETER_COUNT,
                "professional_keywords": PROFESSIONAL_KEYWORDS.len(),
                "question_patterns": QUESTION_PATTERNS.len(),
            },
        }),
    )
}

/// Inner version — returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "hairgator/1",
    })
}

/// Inner style search — validates the query and clamps the limit.
///
/// A missing `limit` falls back to `default_limit` (`styles.search_limit`).
pub fn style_search_inner(
    styles: &StyleTable,
    default_limit: usize,
    params: StyleSearchParams,
) -> (StatusCode, serde_json::Value) {
    let query = match params.query {
        Some(q) if !q.trim().is_empty() => q.trim().to_string(),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("query parameter is required").into_value(),
            );
        }
    };

    let limit = params
        .limit
        .unwrap_or(default_limit)
        .clamp(1, MAX_SEARCH_LIMIT);
    let results = styles.search(&query, limit);

    (
        StatusCode::OK,
        serde_json::json!({
            "query": query,
            "count": results.len(),
            "results": results,
        }),
    )
}

/// Inner parameter lookup — 404 for names outside the vocabulary.
pub fn parameter_inner(name: &str) -> (StatusCode, serde_json::Value) {
    match parameter_info(name) {
        Some((parameter, values)) => (
            StatusCode::OK,
            serde_json::json!({
                "parameter": parameter,
                "values": values,
            }),
        ),
        None => (
            StatusCode::NOT_FOUND,
            ErrorResponse::new(format!("unknown parameter: {}", name)).into_value(),
        ),
    }
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn chat_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<ChatRequest>,
) -> impl IntoResponse {
    let (status, body) = chat_inner(&state, req).await;
    (status, Json(body))
}

pub async fn root_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(root_inner(&state)))
}

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state);
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn style_search_handler(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<StyleSearchParams>,
) -> impl IntoResponse {
    let (status, body) = style_search_inner(&state.styles, state.config.styles.search_limit, params);
    (status, Json(body))
}

pub async fn parameter_handler(Path(name): Path<String>) -> impl IntoResponse {
    let (status, body) = parameter_inner(&name);
    (status, Json(body))
}

// ============================================================================
// Unit Tests — call inner functions directly
// ============================================================================
