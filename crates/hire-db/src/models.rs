//! Database row types. These map directly to SQLite rows and are distinct from
//! the displayed shapes in hire-types.

use chrono::{DateTime, Utc};
use hire_types::models::{Annotation, ControlFlag, MessageKind, MessageStatus, ResumeStatus};

#[derive(Debug, Clone)]
pub struct AppRow {
    pub id: String,
    pub name: String,
    pub bundle_id: String,
}

/// A stored message exactly as persisted. Status is the raw accumulated flag set.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub kind: MessageKind,
    pub body: Option<String>,
    pub media_ids: Vec<String>,
    pub reply_to_id: Option<String>,
    pub sender_id: String,
    pub created_at: DateTime<Utc>,
    pub status: MessageStatus,
    pub reference_id: Option<String>,
}

/// Insert parameters for one message.
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub conversation_id: &'a str,
    pub sender_id: &'a str,
    pub receiver_id: &'a str,
    pub kind: MessageKind,
    pub body: Option<&'a str>,
    pub media_ids: &'a [String],
    pub reply_to_id: Option<&'a str>,
    pub reference_id: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

/// One participant's thread joined with the shared conversation envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRow {
    pub conversation_id: String,
    pub owner_id: String,
    pub counterpart_id: String,
    pub app_id: String,
    pub post_id: Option<String>,
    pub last_message_id: Option<String>,
    pub unread_count: i64,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub annotation: Annotation,
    pub control_flag: ControlFlag,
    pub is_pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Filters for a participant's conversation list.
#[derive(Debug, Clone)]
pub struct ChatQuery {
    /// Restrict to this annotation. `None` applies no annotation filter.
    pub annotation: Option<Annotation>,
    pub unread_only: bool,
    pub include_never_received: bool,
}

impl Default for ChatQuery {
    fn default() -> Self {
        Self {
            annotation: None,
            unread_only: false,
            include_never_received: true,
        }
    }
}

/// A row's place in the conversation list, which is ordered by these fields in
/// turn, all descending: conversations without a post first, then pinned ones,
/// then most recently updated, with the id breaking ties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPosition {
    pub unanchored: bool,
    pub pinned: bool,
    pub updated_at: DateTime<Utc>,
    pub conversation_id: String,
}

impl ChatPosition {
    pub fn of(row: &ChatRow) -> Self {
        Self {
            unanchored: row.post_id.is_none(),
            pinned: row.is_pinned,
            updated_at: row.updated_at,
            conversation_id: row.conversation_id.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResumeRelationRow {
    pub id: String,
    pub app_id: String,
    pub user_id: String,
    pub snapshot_id: String,
    pub conversation_id: String,
    pub post_id: String,
    pub is_read: bool,
    pub status: ResumeStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ResumeSnapshotRow {
    pub id: String,
    pub app_id: String,
    pub user_id: String,
    pub content: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
