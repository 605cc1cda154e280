use chrono::{DateTime, Utc};
use hire_types::models::{ControlFlag, MessageKind, MessageStatus};
use rusqlite::{Connection, Row, Transaction, TransactionBehavior, params};
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::models::{MessageRow, NewMessage};
use crate::{Database, bad_value, to_micros, ts_at};

const MESSAGE_COLUMNS: &str = "id, conversation_id, kind, body, media_ids, reply_to_id, \
                               sender_id, created_at, status, reference_id";

impl Database {
    // -- Messages --

    /// Insert a message, point the conversation at it, and bump the receiver's
    /// unread count, all in one transaction. Returns the new message id.
    ///
    /// The stored `created_at` is nudged forward when needed so it is strictly
    /// later than every earlier message of the conversation.
    ///
    /// Tables are touched in the fixed order message, conversation, thread.
    pub fn add_message(&self, msg: &NewMessage<'_>) -> Result<String> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let (message_id, at) = insert_message(&tx, msg)?;
            touch_conversation(&tx, msg.conversation_id, msg.receiver_id, &message_id, at, 1)?;
            tx.commit()?;
            debug!(message_id = %message_id, conversation_id = msg.conversation_id, "message stored");
            Ok(message_id)
        })
    }

    /// Insert several messages from one sender in one transaction, in order.
    /// The receiver's unread count grows by the number of messages and the
    /// conversation points at the last one. Returns the ids in input order.
    pub fn add_messages(&self, msgs: &[NewMessage<'_>]) -> Result<Vec<String>> {
        let Some(first) = msgs.first() else {
            return Ok(vec![]);
        };
        if msgs.iter().any(|m| {
            m.conversation_id != first.conversation_id
                || m.sender_id != first.sender_id
                || m.receiver_id != first.receiver_id
        }) {
            return Err(StoreError::Conflict(
                "batched messages must share conversation, sender and receiver".into(),
            ));
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut ids = Vec::with_capacity(msgs.len());
            let mut last_at = 0;
            for msg in msgs {
                let (id, at) = insert_message(&tx, msg)?;
                ids.push(id);
                last_at = at;
            }
            let last_id = ids.last().map(String::as_str).unwrap_or_default();
            touch_conversation(
                &tx,
                first.conversation_id,
                first.receiver_id,
                last_id,
                last_at,
                ids.len() as i64,
            )?;
            tx.commit()?;
            debug!(conversation_id = first.conversation_id, count = ids.len(), "messages stored");
            Ok(ids)
        })
    }

    /// Like [`add_message`](Self::add_message), but a no-op returning `None` when
    /// the conversation already holds a message of the same kind pointing at the
    /// same reference. The check and the insert share one transaction.
    pub fn add_reference_message(&self, msg: &NewMessage<'_>) -> Result<Option<String>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let exists: bool = tx.query_row(
                "SELECT EXISTS (SELECT 1 FROM messages \
                 WHERE conversation_id = ?1 AND kind = ?2 AND reference_id IS ?3)",
                params![msg.conversation_id, msg.kind.as_i64(), msg.reference_id],
                |row| row.get(0),
            )?;
            if exists {
                tx.commit()?;
                return Ok(None);
            }

            let (message_id, at) = insert_message(&tx, msg)?;
            touch_conversation(&tx, msg.conversation_id, msg.receiver_id, &message_id, at, 1)?;
            tx.commit()?;
            debug!(message_id = %message_id, conversation_id = msg.conversation_id, "reference message stored");
            Ok(Some(message_id))
        })
    }

    pub fn get_message(&self, id: &str) -> Result<MessageRow> {
        self.with_conn(|conn| query_message(conn, id))
            .map_err(|e| e.context("message", id))
    }

    /// Batch-fetch messages by id. Unknown ids are skipped.
    pub fn get_messages_by_ids(&self, ids: &[String]) -> Result<Vec<MessageRow>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT {} FROM messages WHERE id IN ({})",
                MESSAGE_COLUMNS,
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(ids), message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Messages strictly older than the `(before, before_id)` position, newest first.
    ///
    /// Without `before_id` the position is the timestamp alone. With it, rows
    /// sharing that timestamp are split by id so equal timestamps never drop rows
    /// between pages.
    pub fn list_messages(
        &self,
        conversation_id: &str,
        before: DateTime<Utc>,
        before_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<MessageRow>> {
        let ts = to_micros(before);
        self.with_conn(|conn| {
            let rows = match before_id {
                Some(id) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {} FROM messages \
                         WHERE conversation_id = ?1 AND (created_at < ?2 OR (created_at = ?2 AND id < ?3)) \
                         ORDER BY created_at DESC, id DESC \
                         LIMIT ?4",
                        MESSAGE_COLUMNS
                    ))?;
                    let rows = stmt
                        .query_map(params![conversation_id, ts, id, limit], message_from_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    rows
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {} FROM messages \
                         WHERE conversation_id = ?1 AND created_at < ?2 \
                         ORDER BY created_at DESC, id DESC \
                         LIMIT ?3",
                        MESSAGE_COLUMNS
                    ))?;
                    let rows = stmt
                        .query_map(params![conversation_id, ts, limit], message_from_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    rows
                }
            };
            Ok(rows)
        })
    }

    /// Every message newer than the `(after, after_id)` position, newest first.
    pub fn list_messages_after(
        &self,
        conversation_id: &str,
        after: DateTime<Utc>,
        after_id: &str,
    ) -> Result<Vec<MessageRow>> {
        let ts = to_micros(after);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM messages \
                 WHERE conversation_id = ?1 AND (created_at > ?2 OR (created_at = ?2 AND id > ?3)) \
                 ORDER BY created_at DESC, id DESC",
                MESSAGE_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![conversation_id, ts, after_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// OR `flags` into the message status, but only while the status is still
    /// exactly `expected`. Returns false when the precondition no longer held.
    pub fn set_message_status_if(
        &self,
        id: &str,
        expected: MessageStatus,
        flags: MessageStatus,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE messages SET status = status | ?1 WHERE id = ?2 AND status = ?3",
                params![flags.bits(), id, expected.bits()],
            )?;
            Ok(n == 1)
        })
    }

    /// OR `flags` into the message status unconditionally and return the result.
    /// Bits are never cleared, so repeating the call changes nothing.
    pub fn add_message_status(&self, id: &str, flags: MessageStatus) -> Result<MessageStatus> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE messages SET status = status | ?1 WHERE id = ?2",
                params![flags.bits(), id],
            )?;
            if n == 0 {
                return Err(StoreError::NotFound(format!("message {}", id)));
            }
            Ok(query_message(conn, id)?.status)
        })
    }
}

/// Insert one message row and return its id and stored timestamp in micros.
fn insert_message(tx: &Transaction<'_>, msg: &NewMessage<'_>) -> Result<(String, i64)> {
    let message_id = Uuid::new_v4().to_string();
    let media_ids = serde_json::to_string(msg.media_ids)
        .map_err(|e| StoreError::Corrupt(format!("media ids: {}", e)))?;

    // Creation time is the ordering key, so keep it strictly increasing per conversation.
    let latest: Option<i64> = tx.query_row(
        "SELECT MAX(created_at) FROM messages WHERE conversation_id = ?1",
        [msg.conversation_id],
        |row| row.get(0),
    )?;
    let at = match latest {
        Some(latest) => to_micros(msg.created_at).max(latest + 1),
        None => to_micros(msg.created_at),
    };

    tx.execute(
        "INSERT INTO messages (id, conversation_id, kind, body, media_ids, reply_to_id, \
                               sender_id, created_at, status, reference_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            message_id,
            msg.conversation_id,
            msg.kind.as_i64(),
            msg.body,
            media_ids,
            msg.reply_to_id,
            msg.sender_id,
            at,
            MessageStatus::NORMAL.bits(),
            msg.reference_id,
        ],
    )
    .inspect_err(|e| error!(conversation_id = msg.conversation_id, "insert message failed: {}", e))?;

    Ok((message_id, at))
}

/// Point the conversation at `last_id` and add `count` to the receiver's unread count.
fn touch_conversation(
    tx: &Transaction<'_>,
    conversation_id: &str,
    receiver_id: &str,
    last_id: &str,
    at: i64,
    count: i64,
) -> Result<()> {
    let touched = tx.execute(
        "UPDATE conversations SET updated_at = ?1, last_message_id = ?2 WHERE id = ?3",
        params![at, last_id, conversation_id],
    )?;
    if touched == 0 {
        return Err(StoreError::NotFound(format!("conversation {}", conversation_id)));
    }

    // Only the counterpart's row is touched; the sender's own counter is theirs alone.
    let bumped = tx.execute(
        "UPDATE threads SET unread_count = unread_count + ?1, control_flag = control_flag & ~?2 \
         WHERE conversation_id = ?3 AND owner_id = ?4",
        params![count, ControlFlag::NEVER_RECEIVED.bits(), conversation_id, receiver_id],
    )?;
    if bumped == 0 {
        return Err(StoreError::NotFound(format!(
            "thread {} for {}",
            conversation_id, receiver_id
        )));
    }
    Ok(())
}

fn query_message(conn: &Connection, id: &str) -> Result<MessageRow> {
    let row = conn.query_row(
        &format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS),
        [id],
        message_from_row,
    )?;
    Ok(row)
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    let kind: i64 = row.get(2)?;
    let media_ids: String = row.get(4)?;
    let status: i64 = row.get(8)?;

    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        kind: MessageKind::from_i64(kind)
            .ok_or_else(|| bad_value(2, format!("message kind {}", kind)))?,
        body: row.get(3)?,
        media_ids: serde_json::from_str(&media_ids)
            .map_err(|e| bad_value(4, format!("media ids {:?}: {}", media_ids, e)))?,
        reply_to_id: row.get(5)?,
        sender_id: row.get(6)?,
        created_at: ts_at(row, 7)?,
        status: MessageStatus::from_bits(status)
            .ok_or_else(|| bad_value(8, format!("message status {}", status)))?,
        reference_id: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn base() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn setup() -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let (chat_id, _) = db
            .get_or_create_chat("app", "alice", "bob", None, base())
            .unwrap();
        (db, chat_id)
    }

    fn text<'a>(chat_id: &'a str, body: &'a str, at: DateTime<Utc>) -> NewMessage<'a> {
        NewMessage {
            conversation_id: chat_id,
            sender_id: "alice",
            receiver_id: "bob",
            kind: MessageKind::Text,
            body: Some(body),
            media_ids: &[],
            reply_to_id: None,
            reference_id: None,
            created_at: at,
        }
    }

    #[test]
    fn add_message_updates_envelope_and_receiver_thread() {
        let (db, chat_id) = setup();
        let at = base() + Duration::seconds(5);
        let id = db.add_message(&text(&chat_id, "hi", at)).unwrap();

        let stored = db.get_message(&id).unwrap();
        assert_eq!(stored.kind, MessageKind::Text);
        assert_eq!(stored.body.as_deref(), Some("hi"));
        assert_eq!(stored.status, MessageStatus::NORMAL);
        assert_eq!(stored.created_at, at);

        let bob = db.get_chat("app", &chat_id, "bob").unwrap();
        assert_eq!(bob.unread_count, 1);
        assert!(!bob.control_flag.intersects(ControlFlag::NEVER_RECEIVED));
        assert_eq!(bob.last_message_id.as_deref(), Some(id.as_str()));
        assert_eq!(bob.updated_at, at);

        let alice = db.get_chat("app", &chat_id, "alice").unwrap();
        assert_eq!(alice.unread_count, 0);
        assert!(alice.control_flag.intersects(ControlFlag::NEVER_RECEIVED));
    }

    #[test]
    fn add_message_to_unknown_conversation_leaves_nothing_behind() {
        let (db, _) = setup();
        let err = db.add_message(&text("missing", "hi", base())).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_) | StoreError::NotFound(_)));

        let count: i64 = db
            .with_conn(|c| Ok(c.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn media_ids_round_trip() {
        let (db, chat_id) = setup();
        let media = vec!["m1".to_string(), "m2".to_string()];
        let id = db
            .add_message(&NewMessage {
                kind: MessageKind::Image,
                body: None,
                media_ids: &media,
                ..text(&chat_id, "", base())
            })
            .unwrap();
        assert_eq!(db.get_message(&id).unwrap().media_ids, media);
    }

    #[test]
    fn missing_message_is_not_found_with_id() {
        let (db, _) = setup();
        let err = db.get_message("nope").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(ref s) if s.contains("nope")));
    }

    #[test]
    fn same_instant_sends_still_page_cleanly() {
        let (db, chat_id) = setup();
        let at = base() + Duration::seconds(1);
        for body in ["a", "b", "c"] {
            db.add_message(&text(&chat_id, body, at)).unwrap();
        }

        let all = db.list_messages(&chat_id, at + Duration::seconds(2), None, 10).unwrap();
        let bodies: Vec<_> = all.iter().filter_map(|m| m.body.as_deref()).collect();
        assert_eq!(bodies, vec!["c", "b", "a"]);
        assert!(all.windows(2).all(|w| w[0].created_at > w[1].created_at));
        assert_eq!(all[2].created_at, at);

        let first = db.list_messages(&chat_id, at + Duration::seconds(2), None, 2).unwrap();
        assert_eq!(first.len(), 2);
        let last = &first[1];
        let rest = db
            .list_messages(&chat_id, last.created_at, Some(&last.id), 10)
            .unwrap();
        assert_eq!(rest.len(), 1);

        let mut seen: Vec<_> = first.iter().chain(rest.iter()).map(|m| m.id.clone()).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn list_messages_after_returns_newer_rows_only() {
        let (db, chat_id) = setup();
        let first = db.add_message(&text(&chat_id, "1", base() + Duration::seconds(1))).unwrap();
        db.add_message(&text(&chat_id, "2", base() + Duration::seconds(2))).unwrap();
        db.add_message(&text(&chat_id, "3", base() + Duration::seconds(3))).unwrap();

        let anchor = db.get_message(&first).unwrap();
        let newer = db
            .list_messages_after(&chat_id, anchor.created_at, &anchor.id)
            .unwrap();
        let bodies: Vec<_> = newer.iter().filter_map(|m| m.body.as_deref()).collect();
        assert_eq!(bodies, vec!["3", "2"]);
    }

    #[test]
    fn status_bits_only_accumulate() {
        let (db, chat_id) = setup();
        let id = db.add_message(&text(&chat_id, "hi", base())).unwrap();

        assert!(db
            .set_message_status_if(&id, MessageStatus::NORMAL, MessageStatus::UNSENT)
            .unwrap());
        // Precondition no longer holds
        assert!(!db
            .set_message_status_if(&id, MessageStatus::NORMAL, MessageStatus::UNSENT)
            .unwrap());

        let s = db.add_message_status(&id, MessageStatus::DELETED_BY_RECEIVER).unwrap();
        assert_eq!(s, MessageStatus::UNSENT | MessageStatus::DELETED_BY_RECEIVER);
        let again = db.add_message_status(&id, MessageStatus::DELETED_BY_RECEIVER).unwrap();
        assert_eq!(again, s);
    }

    #[test]
    fn batch_fetch_skips_unknown_ids() {
        let (db, chat_id) = setup();
        let id = db.add_message(&text(&chat_id, "hi", base())).unwrap();
        let rows = db
            .get_messages_by_ids(&[id.clone(), "ghost".to_string()])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id);
        assert!(db.get_messages_by_ids(&[]).unwrap().is_empty());
    }

    #[test]
    fn batch_insert_counts_every_message_once() {
        let (db, chat_id) = setup();
        let at = base() + Duration::seconds(1);
        let batch = [text(&chat_id, "one", at), text(&chat_id, "two", at), text(&chat_id, "three", at)];
        let ids = db.add_messages(&batch).unwrap();
        assert_eq!(ids.len(), 3);

        let bob = db.get_chat("app", &chat_id, "bob").unwrap();
        assert_eq!(bob.unread_count, 3);
        assert_eq!(bob.last_message_id.as_deref(), Some(ids[2].as_str()));

        let listed = db.list_messages(&chat_id, at + Duration::seconds(5), None, 10).unwrap();
        let bodies: Vec<_> = listed.iter().filter_map(|m| m.body.as_deref()).collect();
        assert_eq!(bodies, vec!["three", "two", "one"]);

        assert!(db.add_messages(&[]).unwrap().is_empty());
    }

    #[test]
    fn batch_insert_is_all_or_nothing() {
        let (db, chat_id) = setup();
        let mixed = [text(&chat_id, "ok", base()), text("missing", "lost", base())];
        assert!(matches!(db.add_messages(&mixed), Err(StoreError::Conflict(_))));

        let orphaned = [text("missing", "a", base()), text("missing", "b", base())];
        assert!(db.add_messages(&orphaned).is_err());

        let count: i64 = db
            .with_conn(|c| Ok(c.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(db.get_chat("app", &chat_id, "bob").unwrap().unread_count, 0);
    }

    #[test]
    fn reference_message_is_written_once() {
        let (db, chat_id) = setup();
        let post = NewMessage {
            kind: MessageKind::Post,
            body: None,
            reference_id: Some("post-1"),
            ..text(&chat_id, "", base())
        };

        let first = db.add_reference_message(&post).unwrap();
        assert!(first.is_some());
        assert!(db.add_reference_message(&post).unwrap().is_none());

        let other = NewMessage { reference_id: Some("post-2"), ..post.clone() };
        assert!(db.add_reference_message(&other).unwrap().is_some());
        assert_eq!(db.get_chat("app", &chat_id, "bob").unwrap().unread_count, 2);
    }
}
