//! HTTP adapter over [`hire_chat::ChatService`]. Handlers only decode requests,
//! run the service call off the async runtime, and map failures to status codes.

pub mod chats;
pub mod error;
pub mod messages;
pub mod middleware;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};
use hire_chat::ChatService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub chat: ChatService,
    pub jwt_secret: String,
}

/// Every chat route, behind bearer authentication.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chats", post(chats::open_chat).get(chats::list_chats))
        .route("/chats/{chat_id}", get(chats::get_chat))
        .route("/chats/{chat_id}/read", post(chats::read_chat))
        .route("/chats/{chat_id}/annotation", put(chats::annotate_chat))
        .route("/chats/{chat_id}/pin", put(chats::pin_chat))
        .route(
            "/chats/{chat_id}/messages",
            get(messages::list_messages).post(messages::send_message),
        )
        .route("/chats/{chat_id}/messages/new", get(messages::fetch_new_messages))
        .route("/messages/{message_id}/unsend", post(messages::unsend_message))
        .route("/messages/{message_id}", axum::routing::delete(messages::delete_message))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state)
}
