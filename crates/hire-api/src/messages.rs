use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use hire_chat::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MessageDraft};
use hire_types::api::{Claims, SendMessageRequest};
use serde::Deserialize;
use tracing::debug;

use crate::AppState;
use crate::error::{blocking, status_of};
use crate::middleware::BundleId;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    /// Cursor from the previous page. Empty for the newest page.
    #[serde(default)]
    pub next: String,
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Deserialize)]
pub struct NewMessagesQuery {
    pub after: String,
}

pub async fn list_messages(
    State(state): State<AppState>,
    BundleId(bundle_id): BundleId,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let limit = query.count.min(MAX_PAGE_SIZE);
    let page = blocking(move || {
        state
            .chat
            .list_messages(&bundle_id, &claims.sub, &chat_id, &query.next, limit)
    })
    .await?;

    Ok(Json(page))
}

pub async fn fetch_new_messages(
    State(state): State<AppState>,
    BundleId(bundle_id): BundleId,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
    Query(query): Query<NewMessagesQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let messages = blocking(move || {
        state
            .chat
            .fetch_new_messages(&bundle_id, &claims.sub, &chat_id, &query.after)
    })
    .await?;

    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    BundleId(bundle_id): BundleId,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let draft = MessageDraft::try_from(req).map_err(|e| {
        debug!(chat_id = %chat_id, "rejected draft: {}", e);
        status_of(&e)
    })?;

    let message = blocking(move || {
        state
            .chat
            .send_message(&bundle_id, &claims.sub, &chat_id, draft)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn unsend_message(
    State(state): State<AppState>,
    BundleId(bundle_id): BundleId,
    Extension(claims): Extension<Claims>,
    Path(message_id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    blocking(move || {
        state
            .chat
            .unsend_message(&bundle_id, &claims.sub, &message_id)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_message(
    State(state): State<AppState>,
    BundleId(bundle_id): BundleId,
    Extension(claims): Extension<Claims>,
    Path(message_id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    blocking(move || {
        state
            .chat
            .delete_message(&bundle_id, &claims.sub, &message_id)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
