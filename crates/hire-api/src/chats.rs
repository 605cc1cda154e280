use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use hire_chat::{ConversationFilter, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use hire_types::api::{AnnotateRequest, Claims, OpenChatRequest, OpenChatResponse, PinRequest};
use hire_types::models::Annotation;
use serde::Deserialize;

use crate::AppState;
use crate::error::blocking;
use crate::middleware::BundleId;

#[derive(Debug, Deserialize)]
pub struct ChatListQuery {
    /// Cursor from the previous page. Empty for the first page.
    #[serde(default)]
    pub next: String,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub status: Annotation,
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default = "default_true")]
    pub include_never_received: bool,
}

fn default_count() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_true() -> bool {
    true
}

pub async fn open_chat(
    State(state): State<AppState>,
    BundleId(bundle_id): BundleId,
    Extension(claims): Extension<Claims>,
    Json(req): Json<OpenChatRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let chat_id = blocking(move || {
        state.chat.open_or_create(
            &bundle_id,
            &claims.sub,
            &req.receiver_id,
            req.post_id.as_deref(),
            req.resume.as_ref(),
        )
    })
    .await?;

    Ok(Json(OpenChatResponse { chat_id }))
}

pub async fn list_chats(
    State(state): State<AppState>,
    BundleId(bundle_id): BundleId,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ChatListQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let filter = ConversationFilter {
        annotation: query.status,
        unread_only: query.unread_only,
        include_never_received: query.include_never_received,
    };
    let limit = query.count.min(MAX_PAGE_SIZE);

    let page = blocking(move || {
        state
            .chat
            .list_conversations(&bundle_id, &claims.sub, &query.next, limit, &filter)
    })
    .await?;

    Ok(Json(page))
}

pub async fn get_chat(
    State(state): State<AppState>,
    BundleId(bundle_id): BundleId,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let chat = blocking(move || state.chat.get(&bundle_id, &claims.sub, &chat_id)).await?;
    Ok(Json(chat))
}

pub async fn read_chat(
    State(state): State<AppState>,
    BundleId(bundle_id): BundleId,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    blocking(move || state.chat.mark_read(&bundle_id, &claims.sub, &chat_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn annotate_chat(
    State(state): State<AppState>,
    BundleId(bundle_id): BundleId,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
    Json(req): Json<AnnotateRequest>,
) -> Result<StatusCode, StatusCode> {
    blocking(move || {
        state
            .chat
            .annotate(&bundle_id, &claims.sub, &chat_id, req.status)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn pin_chat(
    State(state): State<AppState>,
    BundleId(bundle_id): BundleId,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
    Json(req): Json<PinRequest>,
) -> Result<StatusCode, StatusCode> {
    blocking(move || state.chat.pin(&bundle_id, &claims.sub, &chat_id, req.is_pinned)).await?;
    Ok(StatusCode::NO_CONTENT)
}
