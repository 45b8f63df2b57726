//! Chat endpoints: streamed turns over SSE plus history access.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{error, info};

use oikos_tool_runtime::Role;

use super::{api_error, ApiError, CurrentUser};
use crate::state::AppState;

pub const MAX_MESSAGE_CHARS: usize = 5000;
const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub message: String,
}

/// Run one chat turn and stream its events as `data: <json>` lines.
pub async fn chat_send(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<SendRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.message.trim().is_empty() {
        return Err(api_error(StatusCode::UNPROCESSABLE_ENTITY, "message must not be empty"));
    }
    if req.message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("message must be at most {MAX_MESSAGE_CHARS} characters"),
        ));
    }
    info!(user_id, chars = req.message.len(), "chat turn requested");

    let rx = state.agent.stream_chat(user_id, req.message);
    let events = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|_| r#"{"type":"done"}"#.to_string());
        Ok::<_, Infallible>(Event::default().data(data))
    });

    // Keep reverse proxies from buffering the stream.
    Ok(([("x-accel-buffering", "no")], Sse::new(events)))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub id: u64,
    pub role: Role,
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub messages: Vec<HistoryEntry>,
}

/// The user's most recent messages, oldest first.
pub async fn chat_history(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let stored = state.agent.history(user_id, limit).await.map_err(|e| {
        error!(user_id, error = %e, "failed to load chat history");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to load chat history")
    })?;

    let messages = stored
        .into_iter()
        .map(|m| HistoryEntry {
            id: m.id,
            role: m.message.role,
            content: m.message.content,
            created_at: m.created_at,
        })
        .collect();
    Ok(Json(HistoryResponse { messages }))
}

#[derive(Debug, Serialize)]
pub struct ClearHistoryResponse {
    pub success: bool,
    pub message: &'static str,
    pub deleted_count: usize,
}

pub async fn chat_clear_history(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<ClearHistoryResponse>, ApiError> {
    let deleted_count = state.agent.clear_history(user_id).await.map_err(|e| {
        error!(user_id, error = %e, "failed to clear chat history");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to clear chat history")
    })?;
    Ok(Json(ClearHistoryResponse {
        success: true,
        message: "Chat history cleared",
        deleted_count,
    }))
}
