use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Annotation, DisplayStatus, Media, MessageKind, ResumeAttachment};

// -- JWT Claims --

/// Bearer token claims. `sub` is the actor id the orchestrator acts on behalf of.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenChatRequest {
    pub receiver_id: String,
    pub post_id: Option<String>,
    /// Résumé content handed off when applying to `post_id` through this chat.
    pub resume: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct OpenChatResponse {
    pub chat_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnnotateRequest {
    pub status: Annotation,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PinRequest {
    pub is_pinned: bool,
}

/// One participant's view of a conversation.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationView {
    pub chat_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub unread_count: i64,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub status: Annotation,
    pub is_pinned: bool,
    pub never_received: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_message: Option<MessageView>,
    pub post_id: Option<String>,
    pub resume_snapshot: Option<ResumeAttachment>,
}

#[derive(Debug, Serialize)]
pub struct ConversationPage {
    pub chats: Vec<ConversationView>,
    /// Empty when there is no further page.
    pub next: String,
}

// -- Messages --

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub body: Option<String>,
    pub media_ids: Option<Vec<String>>,
    pub file_ids: Option<Vec<String>>,
    pub reply_to_message_id: Option<String>,
}

/// A message as displayed to one viewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageView {
    pub message_id: String,
    pub chat_id: String,
    pub created_at: DateTime<Utc>,
    pub status: DisplayStatus,
    pub is_mine: bool,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub sender_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Box<MessageView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub medias: Vec<Media>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessagePage {
    pub messages: Vec<MessageView>,
    /// Empty when there is no further page.
    pub next: String,
}
