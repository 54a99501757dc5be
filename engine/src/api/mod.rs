//! HTTP API
//!
//! Axum router exposing the chat pipeline as a server-sent event stream,
//! plus model listing, status and conversation history.
//!
//! Caller identity is resolved upstream (auth proxy or session layer) and
//! arrives as an opaque header; requests without it run without memory.

use crate::db::ConversationRepository;
use crate::gateway::ChatPipeline;
use crate::llm::LLMProvider;
use anyhow::{Context, Result};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use axum::routing::{get, post, put};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

pub mod error;
pub mod handlers;

pub use error::{ApiError, ErrorBody};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub pipeline: ChatPipeline,
    pub provider: Arc<dyn LLMProvider>,
    pub conversations: Option<Arc<ConversationRepository>>,
    pub identity_header: HeaderName,
    pub keep_alive: Option<Duration>,
    pub synthesis_label: String,
}

impl AppState {
    /// Owner identity from the configured header, if present and non-blank
    pub fn owner(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get(&self.identity_header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}

/// Parse the identity header name from config, falling back to `x-owner-id`
pub fn identity_header(name: &str) -> HeaderName {
    HeaderName::from_bytes(name.trim().to_ascii_lowercase().as_bytes()).unwrap_or_else(|_| {
        warn!("Invalid identity header '{}', using x-owner-id", name);
        HeaderName::from_static("x-owner-id")
    })
}

fn cors_layer(origins: &[String], identity: &HeaderName) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
            .allow_headers([
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                header::ACCEPT,
                identity.clone(),
            ]),
    )
}

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    let cors = cors_layer(cors_origins, &state.identity_header);

    let router = Router::new()
        .route("/api/chat", post(handlers::chat))
        .route("/api/models", get(handlers::models))
        .route("/api/status", get(handlers::status))
        .route("/api/conversations", get(handlers::conversations))
        .route("/api/conversations/:id/title", put(handlers::set_title))
        .with_state(state);

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve(
    router: Router,
    bind: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;

    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")?;

    Ok(())
}
