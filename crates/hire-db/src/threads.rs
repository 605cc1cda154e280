use chrono::{DateTime, Utc};
use hire_types::models::{Annotation, ControlFlag};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, TransactionBehavior, params};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::models::{ChatPosition, ChatQuery, ChatRow};
use crate::{Database, bad_value, opt_ts_at, to_micros, ts_at};

const CHAT_COLUMNS: &str = "t.conversation_id, t.owner_id, t.counterpart_id, c.app_id, c.post_id, \
                            c.last_message_id, t.unread_count, t.last_seen_at, t.annotation, \
                            t.control_flag, t.is_pinned, c.created_at, c.updated_at";

impl Database {
    // -- Conversations --

    /// Look up the conversation between two participants (optionally anchored to a
    /// post) or create it with both thread rows. The lookup and the inserts share
    /// one IMMEDIATE transaction, so concurrent callers serialize on the write
    /// lock and the loser of a race sees the winner's row.
    ///
    /// Returns the conversation id and whether it was created by this call.
    pub fn get_or_create_chat(
        &self,
        app_id: &str,
        sender_id: &str,
        receiver_id: &str,
        post_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(String, bool)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT t.conversation_id FROM threads t \
                     JOIN conversations c ON c.id = t.conversation_id \
                     WHERE c.app_id = ?1 AND t.owner_id = ?2 AND t.counterpart_id = ?3 AND c.post_id IS ?4",
                    params![app_id, sender_id, receiver_id, post_id],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(id) = existing {
                tx.commit()?;
                return Ok((id, false));
            }

            let chat_id = Uuid::new_v4().to_string();
            let now = to_micros(at);

            tx.execute(
                "INSERT INTO conversations (id, app_id, post_id, pair_key, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![chat_id, app_id, post_id, pair_key(sender_id, receiver_id), now],
            )
            .inspect_err(|e| {
                error!(app_id, sender_id, receiver_id, "insert conversation failed: {}", e)
            })?;

            let insert_thread = "INSERT INTO threads (conversation_id, owner_id, counterpart_id, unread_count, control_flag) \
                                 VALUES (?1, ?2, ?3, 0, ?4)";
            let never = ControlFlag::NEVER_RECEIVED.bits();
            tx.execute(insert_thread, params![chat_id, sender_id, receiver_id, never])?;
            tx.execute(insert_thread, params![chat_id, receiver_id, sender_id, never])?;

            tx.commit()?;
            info!(chat_id = %chat_id, app_id, sender_id, receiver_id, "conversation created");
            Ok((chat_id, true))
        })
    }

    /// The owner's thread row joined with its conversation, scoped to a tenant.
    pub fn get_chat(&self, app_id: &str, chat_id: &str, owner_id: &str) -> Result<ChatRow> {
        self.with_conn(|conn| {
            let row = conn.query_row(
                &format!(
                    "SELECT {} FROM threads t JOIN conversations c ON c.id = t.conversation_id \
                     WHERE c.id = ?1 AND c.app_id = ?2 AND t.owner_id = ?3",
                    CHAT_COLUMNS
                ),
                params![chat_id, app_id, owner_id],
                chat_from_row,
            )?;
            Ok(row)
        })
        .map_err(|e| e.context("chat", chat_id))
    }

    /// The owner's conversations that come strictly after `after` in list
    /// order (see [`ChatPosition`]), or from the top when `after` is `None`.
    ///
    /// Deleted annotations and threads that are blocked or hidden are never listed.
    pub fn list_chats(
        &self,
        app_id: &str,
        owner_id: &str,
        after: Option<&ChatPosition>,
        limit: u32,
        query: &ChatQuery,
    ) -> Result<Vec<ChatRow>> {
        let mut conditions = vec![
            "c.app_id = ?".to_string(),
            "t.owner_id = ?".to_string(),
            "t.annotation != ?".to_string(),
            "(t.control_flag & ?) = 0".to_string(),
        ];
        let mut values: Vec<Value> = vec![
            app_id.to_string().into(),
            owner_id.to_string().into(),
            Annotation::Deleted.as_i64().into(),
            i64::from((ControlFlag::BLOCKED | ControlFlag::HIDDEN_BY_ADMIN).bits()).into(),
        ];

        if let Some(pos) = after {
            let unanchored = i64::from(pos.unanchored);
            let pinned = i64::from(pos.pinned);
            let ts = to_micros(pos.updated_at);
            conditions.push(
                "((c.post_id IS NULL) < ? \
                  OR ((c.post_id IS NULL) = ? AND t.is_pinned < ?) \
                  OR ((c.post_id IS NULL) = ? AND t.is_pinned = ? \
                      AND (c.updated_at < ? OR (c.updated_at = ? AND c.id < ?))))"
                    .to_string(),
            );
            values.extend([
                unanchored.into(),
                unanchored.into(),
                pinned.into(),
                unanchored.into(),
                pinned.into(),
                ts.into(),
                ts.into(),
                pos.conversation_id.clone().into(),
            ]);
        }
        if let Some(annotation) = query.annotation {
            conditions.push("t.annotation = ?".to_string());
            values.push(annotation.as_i64().into());
        }
        if query.unread_only {
            conditions.push("t.unread_count > 0".to_string());
        }
        if !query.include_never_received {
            conditions.push("(t.control_flag & ?) = 0".to_string());
            values.push(i64::from(ControlFlag::NEVER_RECEIVED.bits()).into());
        }
        values.push(i64::from(limit).into());

        let sql = format!(
            "SELECT {} FROM threads t JOIN conversations c ON c.id = t.conversation_id \
             WHERE {} \
             ORDER BY (c.post_id IS NULL) DESC, t.is_pinned DESC, c.updated_at DESC, c.id DESC \
             LIMIT ?",
            CHAT_COLUMNS,
            conditions.join(" AND ")
        );

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(values), chat_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Threads --

    /// Zero the owner's unread count and stamp their read watermark. Only the
    /// owner's own row is touched.
    pub fn read_chat(&self, chat_id: &str, owner_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.update_own_thread(
            chat_id,
            owner_id,
            "unread_count = 0, last_seen_at = ?1",
            to_micros(at).into(),
        )
    }

    pub fn annotate_chat(&self, chat_id: &str, owner_id: &str, annotation: Annotation) -> Result<()> {
        self.update_own_thread(chat_id, owner_id, "annotation = ?1", annotation.as_i64().into())
    }

    pub fn pin_chat(&self, chat_id: &str, owner_id: &str, is_pinned: bool) -> Result<()> {
        self.update_own_thread(chat_id, owner_id, "is_pinned = ?1", i64::from(is_pinned).into())
    }

    fn update_own_thread(&self, chat_id: &str, owner_id: &str, set: &str, value: Value) -> Result<()> {
        self.with_conn(|conn| {
            let n = conn.execute(
                &format!(
                    "UPDATE threads SET {} WHERE conversation_id = ?2 AND owner_id = ?3",
                    set
                ),
                params![value, chat_id, owner_id],
            )?;
            if n == 0 {
                return Err(StoreError::NotFound(format!("chat {} for {}", chat_id, owner_id)));
            }
            Ok(())
        })
    }
}

/// Direction-free key for a participant pair.
fn pair_key(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{}\u{1f}{}", lo, hi)
}

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<ChatRow> {
    let annotation: i64 = row.get(8)?;
    let control_flag: i64 = row.get(9)?;

    Ok(ChatRow {
        conversation_id: row.get(0)?,
        owner_id: row.get(1)?,
        counterpart_id: row.get(2)?,
        app_id: row.get(3)?,
        post_id: row.get(4)?,
        last_message_id: row.get(5)?,
        unread_count: row.get(6)?,
        last_seen_at: opt_ts_at(row, 7)?,
        annotation: Annotation::from_i64(annotation)
            .ok_or_else(|| bad_value(8, format!("annotation {}", annotation)))?,
        control_flag: ControlFlag::from_bits(control_flag)
            .ok_or_else(|| bad_value(9, format!("control flag {}", control_flag)))?,
        is_pinned: row.get::<_, i64>(10)? != 0,
        created_at: ts_at(row, 11)?,
        updated_at: ts_at(row, 12)?,
    })
}
