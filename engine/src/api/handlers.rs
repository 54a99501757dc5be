//! HTTP request handlers

use super::error::ApiError;
use super::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use sdk::errors::GatewayError;
use sdk::types::{ChatRequest, StreamEvent};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

const DEFAULT_HISTORY_LIMIT: i64 = 20;
const MAX_HISTORY_LIMIT: i64 = 200;

fn sse_event(event: StreamEvent) -> Result<Event, Infallible> {
    Ok(match serde_json::to_string(&event) {
        Ok(json) => Event::default().data(json),
        Err(e) => Event::default().comment(format!("unserializable event: {}", e)),
    })
}

/// POST /api/chat - fan out and stream events.
pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body.map_err(|e| GatewayError::InvalidRequest(e.body_text()))?;
    let owner = state.owner(&headers);

    let rx = state.pipeline.run(request, owner)?;
    let stream = UnboundedReceiverStream::new(rx).map(sse_event);

    let mut sse = Sse::new(stream);
    if let Some(interval) = state.keep_alive {
        sse = sse.keep_alive(KeepAlive::new().interval(interval));
    }

    let mut response = sse.into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response_headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    Ok(response)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
    pub max_selection: usize,
    pub synthesis_model: String,
}

/// GET /api/models - backend registry for model selectors.
pub async fn models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let models = state
        .pipeline
        .registry()
        .entries()
        .iter()
        .map(|entry| ModelInfo {
            id: entry.id.clone(),
            label: entry.label.clone(),
        })
        .collect();

    Json(ModelsResponse {
        models,
        max_selection: state.pipeline.max_backends(),
        synthesis_model: state.synthesis_label.clone(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub commit: String,
    pub built_at: String,
    pub provider: String,
    pub provider_healthy: bool,
    pub backends: usize,
    pub memory_enabled: bool,
}

/// GET /api/status - version and provider health.
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: env!("GIT_COMMIT_HASH").to_string(),
        built_at: env!("BUILD_TIMESTAMP").to_string(),
        provider: state.provider.name().to_string(),
        provider_healthy: state.provider.check_health().await,
        backends: state.pipeline.registry().len(),
        memory_enabled: state.pipeline.memory_enabled(),
    })
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// GET /api/conversations - the caller's stored turns, newest first.
pub async fn conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Response, ApiError> {
    let owner = state.owner(&headers).ok_or(GatewayError::OwnerRequired)?;
    let repo = state.conversations.as_ref().ok_or_else(ApiError::store_disabled)?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let turns = repo.history(&owner, limit).await?;

    Ok(Json(serde_json::json!({ "conversations": turns })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct TitleRequest {
    pub title: String,
}

/// PUT /api/conversations/:id/title - set a display title.
pub async fn set_title(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Result<Json<TitleRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let owner = state.owner(&headers).ok_or(GatewayError::OwnerRequired)?;
    let repo = state.conversations.as_ref().ok_or_else(ApiError::store_disabled)?;
    let Json(body) = body.map_err(|e| GatewayError::InvalidRequest(e.body_text()))?;

    let title = body.title.trim();
    if title.is_empty() {
        return Err(GatewayError::InvalidRequest("title cannot be empty".to_string()).into());
    }

    if !repo.set_title(&owner, id, title).await? {
        return Err(GatewayError::NotFound(format!("conversation {}", id)).into());
    }

    Ok(Json(serde_json::json!({ "id": id, "title": title })).into_response())
}
