//! Per-viewer projection of stored messages.
//!
//! A stored message carries a raw status flag set. What a participant sees is
//! derived from it in this order:
//!
//! 1. deleted by the sender and viewed by the sender: hidden
//! 2. deleted by the receiver and viewed by the receiver: hidden
//! 3. unsent: listed, with kind, body, media and reference cleared
//! 4. otherwise shown as normal
//!
//! Replies are projected one level deep. A reply target that would be hidden or
//! redacted is shown as an `UNAVAILABLE` stub instead of being dropped, so the
//! back-reference still resolves.

use hire_db::models::MessageRow;
use hire_types::api::MessageView;
use hire_types::models::{DisplayStatus, MessageKind, MessageStatus};

/// Project `row` for `viewer_id`. `None` means the row is hidden from this viewer.
///
/// Media are left empty; they are resolved separately by the caller.
pub fn project(row: &MessageRow, viewer_id: &str) -> Option<MessageView> {
    if row.status.is_deleted_for(&row.sender_id, viewer_id) {
        return None;
    }
    if row.status.contains(MessageStatus::UNSENT) {
        return Some(redacted(row, viewer_id, DisplayStatus::Unsent));
    }
    Some(shown(row, viewer_id))
}

/// Project a reply target. Never hidden: anything not plainly visible becomes a stub.
pub fn project_reply(row: &MessageRow, viewer_id: &str) -> MessageView {
    match project(row, viewer_id) {
        Some(view) if view.status == DisplayStatus::Normal => view,
        _ => redacted(row, viewer_id, DisplayStatus::Unavailable),
    }
}

/// Project the last message of a conversation summary. Unsent messages are
/// left out of the summary along with hidden ones.
pub fn project_last(row: &MessageRow, viewer_id: &str) -> Option<MessageView> {
    project(row, viewer_id).filter(|view| view.status == DisplayStatus::Normal)
}

fn shown(row: &MessageRow, viewer_id: &str) -> MessageView {
    let body = if row.kind.has_body() {
        Some(row.body.clone().unwrap_or_default())
    } else {
        None
    };
    let reference_id = if row.kind.has_reference() {
        row.reference_id.clone()
    } else {
        None
    };

    MessageView {
        message_id: row.id.clone(),
        chat_id: row.conversation_id.clone(),
        created_at: row.created_at,
        status: DisplayStatus::Normal,
        is_mine: row.sender_id == viewer_id,
        kind: row.kind,
        sender_id: row.sender_id.clone(),
        reply_to: None,
        body,
        medias: vec![],
        reference_id,
    }
}

fn redacted(row: &MessageRow, viewer_id: &str, status: DisplayStatus) -> MessageView {
    MessageView {
        message_id: row.id.clone(),
        chat_id: row.conversation_id.clone(),
        created_at: row.created_at,
        status,
        is_mine: row.sender_id == viewer_id,
        kind: MessageKind::Empty,
        sender_id: row.sender_id.clone(),
        reply_to: None,
        body: None,
        medias: vec![],
        reference_id: None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    const A: &str = "alice";
    const B: &str = "bob";

    fn row(kind: MessageKind, status: MessageStatus) -> MessageRow {
        MessageRow {
            id: "m-1".into(),
            conversation_id: "c-1".into(),
            kind,
            body: kind.has_body().then(|| "hi".to_string()),
            media_ids: if kind.has_media() { vec!["img-1".into()] } else { vec![] },
            reply_to_id: None,
            sender_id: A.into(),
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            status,
            reference_id: kind.has_reference().then(|| "post-1".to_string()),
        }
    }

    #[test]
    fn normal_message_is_visible_to_both() {
        let msg = row(MessageKind::Text, MessageStatus::NORMAL);

        let mine = project(&msg, A).unwrap();
        assert!(mine.is_mine);
        assert_eq!(mine.status, DisplayStatus::Normal);
        assert_eq!(mine.body.as_deref(), Some("hi"));

        let theirs = project(&msg, B).unwrap();
        assert!(!theirs.is_mine);
        assert_eq!(theirs.body.as_deref(), Some("hi"));
    }

    #[test]
    fn text_without_stored_body_shows_empty_string() {
        let mut msg = row(MessageKind::Text, MessageStatus::NORMAL);
        msg.body = None;
        assert_eq!(project(&msg, B).unwrap().body.as_deref(), Some(""));
    }

    #[test]
    fn deletion_hides_only_the_deleting_side() {
        let by_sender = row(MessageKind::Text, MessageStatus::DELETED_BY_SENDER);
        assert!(project(&by_sender, A).is_none());
        assert!(project(&by_sender, B).is_some());

        let by_receiver = row(MessageKind::Text, MessageStatus::DELETED_BY_RECEIVER);
        assert!(project(&by_receiver, A).is_some());
        assert!(project(&by_receiver, B).is_none());
    }

    #[test]
    fn unsent_is_redacted_for_both() {
        let msg = row(MessageKind::Post, MessageStatus::UNSENT);
        for viewer in [A, B] {
            let view = project(&msg, viewer).unwrap();
            assert_eq!(view.status, DisplayStatus::Unsent);
            assert_eq!(view.kind, MessageKind::Empty);
            assert!(view.body.is_none());
            assert!(view.reference_id.is_none());
        }
    }

    #[test]
    fn deletion_wins_over_unsent() {
        let msg = row(
            MessageKind::Text,
            MessageStatus::UNSENT | MessageStatus::DELETED_BY_SENDER,
        );
        assert!(project(&msg, A).is_none());
        assert_eq!(project(&msg, B).unwrap().status, DisplayStatus::Unsent);
    }

    #[test]
    fn reply_targets_degrade_to_stub() {
        let visible = row(MessageKind::Text, MessageStatus::NORMAL);
        assert_eq!(project_reply(&visible, B).status, DisplayStatus::Normal);

        for status in [
            MessageStatus::UNSENT,
            MessageStatus::DELETED_BY_RECEIVER,
            MessageStatus::UNAVAILABLE,
        ] {
            let stub = project_reply(&row(MessageKind::Text, status), B);
            assert_eq!(stub.status, DisplayStatus::Unavailable);
            assert_eq!(stub.kind, MessageKind::Empty);
            assert!(stub.body.is_none());
            assert_eq!(stub.message_id, "m-1");
        }
    }

    #[test]
    fn last_message_skips_unsent() {
        assert!(project_last(&row(MessageKind::Text, MessageStatus::UNSENT), B).is_none());
        assert!(project_last(&row(MessageKind::Text, MessageStatus::NORMAL), B).is_some());
    }

    #[test]
    fn reference_only_on_reference_kinds() {
        let mut msg = row(MessageKind::Text, MessageStatus::NORMAL);
        msg.reference_id = Some("stray".into());
        assert!(project(&msg, A).unwrap().reference_id.is_none());
        assert_eq!(
            project(&row(MessageKind::Meetup, MessageStatus::NORMAL), A)
                .unwrap()
                .reference_id
                .as_deref(),
            Some("post-1")
        );
    }
}
