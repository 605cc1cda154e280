use chrono::{DateTime, Utc};
use hire_types::models::ResumeStatus;
use rusqlite::{OptionalExtension, Row, TransactionBehavior, params};
use tracing::info;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::models::{ResumeRelationRow, ResumeSnapshotRow};
use crate::{Database, bad_value, to_micros, ts_at};

const RELATION_COLUMNS: &str =
    "id, app_id, user_id, snapshot_id, conversation_id, post_id, is_read, status, created_at";

impl Database {
    // -- Résumé hand-off --

    /// Freeze `content` into a new snapshot and relate it to the conversation and
    /// post it was submitted through, in one transaction.
    #[allow(clippy::too_many_arguments)]
    pub fn attach_resume(
        &self,
        app_id: &str,
        user_id: &str,
        chat_id: &str,
        post_id: &str,
        content: &serde_json::Value,
        status: ResumeStatus,
        at: DateTime<Utc>,
    ) -> Result<ResumeRelationRow> {
        let snapshot_id = Uuid::new_v4().to_string();
        let relation_id = Uuid::new_v4().to_string();
        let now = to_micros(at);

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            tx.execute(
                "INSERT INTO resume_snapshots (id, app_id, user_id, content, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![snapshot_id, app_id, user_id, content.to_string(), now],
            )?;
            tx.execute(
                "INSERT INTO resume_relations (id, app_id, user_id, snapshot_id, conversation_id, post_id, is_read, status, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8)",
                params![relation_id, app_id, user_id, snapshot_id, chat_id, post_id, status.as_i64(), now],
            )?;

            tx.commit()?;
            info!(chat_id, snapshot_id = %snapshot_id, post_id, "resume attached");
            Ok(ResumeRelationRow {
                id: relation_id,
                app_id: app_id.to_string(),
                user_id: user_id.to_string(),
                snapshot_id,
                conversation_id: chat_id.to_string(),
                post_id: post_id.to_string(),
                is_read: false,
                status,
                created_at: at,
            })
        })
    }

    pub fn get_resume_relation_by_chat(&self, chat_id: &str) -> Result<Option<ResumeRelationRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM resume_relations WHERE conversation_id = ?1",
                        RELATION_COLUMNS
                    ),
                    [chat_id],
                    relation_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_resume_snapshot(&self, snapshot_id: &str) -> Result<ResumeSnapshotRow> {
        self.with_conn(|conn| {
            let (id, app_id, user_id, content, created_at) = conn.query_row(
                "SELECT id, app_id, user_id, content, created_at FROM resume_snapshots WHERE id = ?1",
                [snapshot_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        ts_at(row, 4)?,
                    ))
                },
            )?;
            let content = serde_json::from_str(&content)
                .map_err(|e| StoreError::Corrupt(format!("snapshot {} content: {}", id, e)))?;
            Ok(ResumeSnapshotRow {
                id,
                app_id,
                user_id,
                content,
                created_at,
            })
        })
        .map_err(|e| e.context("resume snapshot", snapshot_id))
    }
}

fn relation_from_row(row: &Row<'_>) -> rusqlite::Result<ResumeRelationRow> {
    let status: i64 = row.get(7)?;
    Ok(ResumeRelationRow {
        id: row.get(0)?,
        app_id: row.get(1)?,
        user_id: row.get(2)?,
        snapshot_id: row.get(3)?,
        conversation_id: row.get(4)?,
        post_id: row.get(5)?,
        is_read: row.get::<_, i64>(6)? != 0,
        status: ResumeStatus::from_i64(status)
            .ok_or_else(|| bad_value(7, format!("resume status {}", status)))?,
        created_at: ts_at(row, 8)?,
    })
}
