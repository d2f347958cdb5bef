use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::identity::AuthenticatedUser;
use crate::models::{MarkReadRequest, MessageListResponse, MessageResponse, SendMessageRequest, UserId};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

pub async fn send_message(
    State(state): State<AppState>,
    AuthenticatedUser(sender): AuthenticatedUser,
    Json(req): Json<SendMessageRequest>,
) -> AppResult<Json<MessageResponse>> {
    Ok(Json(state.messages.send_message(sender, req).await?))
}

pub async fn message_history(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(contact_id): Path<i64>,
    Query(params): Query<HistoryParams>,
) -> AppResult<Json<MessageListResponse>> {
    let list = state
        .messages
        .get_messages_by_contact(user, UserId(contact_id), params.limit, params.offset)
        .await?;
    Ok(Json(list))
}

pub async fn last_message(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(contact_id): Path<i64>,
) -> AppResult<Json<MessageResponse>> {
    let message = state
        .messages
        .get_last_message(user, UserId(contact_id))
        .await?;
    Ok(Json(message))
}

/// Body is optional; omitting it (or the id list) marks the whole
/// conversation read.
pub async fn mark_read(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(contact_id): Path<i64>,
    body: Option<Json<MarkReadRequest>>,
) -> AppResult<StatusCode> {
    let message_ids = body.map(|Json(b)| b.message_ids).unwrap_or_default();
    state
        .messages
        .mark_messages_as_read(user, UserId(contact_id), message_ids)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unread_count(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> AppResult<Json<serde_json::Value>> {
    let unread = state.messages.get_unread_count(user).await?;
    Ok(Json(serde_json::json!({ "unread": unread })))
}
