use hire_types::models::{Media, MediaKind};
use rusqlite::{OptionalExtension, params};
use tracing::warn;

use crate::error::Result;
use crate::{Database, bad_value, opt_ts_at, to_micros};

impl Database {
    // -- Media --

    pub fn create_media(&self, media: &Media) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO media (id, url, preview_url, placeholder, kind, redirect_url, title, size, expired_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    media.id,
                    media.url,
                    media.preview_url,
                    media.placeholder,
                    media.kind.as_i64(),
                    media.redirect_url,
                    media.title,
                    media.size,
                    media.expired_at.map(to_micros),
                ],
            )?;
            Ok(())
        })
    }

    /// Resolve media ids in the given order. Missing or unreadable ids are
    /// skipped rather than failing the whole lookup.
    pub fn get_media(&self, ids: &[String]) -> Result<Vec<Media>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, url, preview_url, placeholder, kind, redirect_url, title, size, expired_at \
                 FROM media WHERE id = ?1",
            )?;

            let mut found = Vec::with_capacity(ids.len());
            for id in ids {
                let media = stmt
                    .query_row([id], |row| {
                        let kind: i64 = row.get(4)?;
                        Ok(Media {
                            id: row.get(0)?,
                            url: row.get(1)?,
                            preview_url: row.get(2)?,
                            placeholder: row.get(3)?,
                            kind: MediaKind::from_i64(kind)
                                .ok_or_else(|| bad_value(4, format!("media kind {}", kind)))?,
                            redirect_url: row.get(5)?,
                            title: row.get(6)?,
                            size: row.get(7)?,
                            expired_at: opt_ts_at(row, 8)?,
                        })
                    })
                    .optional();

                match media {
                    Ok(Some(m)) => found.push(m),
                    Ok(None) => warn!(media_id = %id, "media not found, skipping"),
                    Err(e) => warn!(media_id = %id, "media lookup failed, skipping: {}", e),
                }
            }
            Ok(found)
        })
    }
}
