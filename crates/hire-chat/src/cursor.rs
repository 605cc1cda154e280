//! Page cursors.
//!
//! A message cursor names a position `(timestamp, id)` in a newest-first
//! listing; the next page holds rows strictly older than it. Encoded as
//! `"<unix micros>:<id>"`. A bare `"<unix micros>"` is accepted and compares on
//! the timestamp alone.
//!
//! The conversation list is grouped before it is ordered by time, so its
//! cursor also carries the two group bits: `"<unanchored><pinned>:<unix micros>:<id>"`,
//! for example `"10:1700000000000000:c-1"`.

use chrono::{DateTime, TimeDelta, Utc};
use hire_db::models::ChatPosition;

use crate::error::{ChatError, Result};

/// Seconds added to "now" when no cursor is given, so a row written in the
/// same instant as the query is still on the first page.
pub const CURSOR_LOOKAHEAD_SECS: i64 = 2;

/// Page size used when a caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 50;
/// Largest page a caller may ask for.
pub const MAX_PAGE_SIZE: u32 = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub before: DateTime<Utc>,
    pub before_id: Option<String>,
}

impl Cursor {
    /// Decode a client cursor. An empty string starts from `now + CURSOR_LOOKAHEAD_SECS`.
    pub fn parse(raw: &str, now: DateTime<Utc>) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self {
                before: now + TimeDelta::seconds(CURSOR_LOOKAHEAD_SECS),
                before_id: None,
            });
        }

        let (ts, id) = match raw.split_once(':') {
            Some((ts, id)) if !id.is_empty() => (ts, Some(id.to_string())),
            Some(_) => return Err(invalid(raw)),
            None => (raw, None),
        };
        let micros: i64 = ts.parse().map_err(|_| invalid(raw))?;
        let before = hire_db::from_micros(micros).ok_or_else(|| invalid(raw))?;

        Ok(Self {
            before,
            before_id: id,
        })
    }

    pub fn encode(at: DateTime<Utc>, id: &str) -> String {
        format!("{}:{}", hire_db::to_micros(at), id)
    }
}

/// Decode a conversation-list cursor. An empty string starts from the top.
pub fn parse_chat_cursor(raw: &str) -> Result<Option<ChatPosition>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    let mut parts = raw.splitn(3, ':');
    let (Some(groups), Some(ts), Some(id)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid(raw));
    };
    let bit = |c: u8| match c {
        b'0' => Ok(false),
        b'1' => Ok(true),
        _ => Err(invalid(raw)),
    };
    let [unanchored, pinned] = groups.as_bytes() else {
        return Err(invalid(raw));
    };
    if id.is_empty() {
        return Err(invalid(raw));
    }
    let micros: i64 = ts.parse().map_err(|_| invalid(raw))?;

    Ok(Some(ChatPosition {
        unanchored: bit(*unanchored)?,
        pinned: bit(*pinned)?,
        updated_at: hire_db::from_micros(micros).ok_or_else(|| invalid(raw))?,
        conversation_id: id.to_string(),
    }))
}

pub fn encode_chat_cursor(pos: &ChatPosition) -> String {
    format!(
        "{}{}:{}:{}",
        u8::from(pos.unanchored),
        u8::from(pos.pinned),
        hire_db::to_micros(pos.updated_at),
        pos.conversation_id
    )
}

fn invalid(raw: &str) -> ChatError {
    ChatError::InvalidArgument(format!("malformed cursor {:?}", raw))
}

/// Cut a `limit + 1` lookahead fetch down to one page.
///
/// Returns the page and the cursor for the next one, encoded from the last row
/// kept. The cursor is empty when the fetch did not overflow, meaning there is
/// no further page.
pub fn split_page<T, F>(mut rows: Vec<T>, limit: usize, encode: F) -> (Vec<T>, String)
where
    F: Fn(&T) -> String,
{
    if rows.len() <= limit || limit == 0 {
        return (rows, String::new());
    }
    rows.truncate(limit);
    let next = rows.last().map(encode).unwrap_or_default();
    (rows, next)
}
