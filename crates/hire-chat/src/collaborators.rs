//! Services the orchestrator consumes but does not own, and their SQLite-backed
//! implementations over [`Database`].

use chrono::Utc;
use hire_db::Database;
use hire_types::models::{Media, ResumeStatus};
use tracing::warn;

use crate::error::{ChatError, Result};

/// Maps an app bundle id to the tenant that scopes every conversation.
pub trait TenantResolver: Send + Sync {
    fn resolve(&self, bundle_id: &str) -> Result<String>;
}

/// Resolves media ids to displayable records. Unknown ids are skipped.
pub trait MediaFetcher: Send + Sync {
    fn fetch(&self, ids: &[String]) -> Result<Vec<Media>>;
}

/// Résumé snapshots submitted through a post-anchored conversation.
pub trait ResumeHandoff: Send + Sync {
    /// Snapshot `content` for `chat_id` and return the snapshot id.
    fn attach(
        &self,
        tenant_id: &str,
        actor_id: &str,
        chat_id: &str,
        post_id: &str,
        content: &serde_json::Value,
    ) -> Result<String>;

    fn relation(&self, chat_id: &str) -> Result<Option<ResumeLink>>;

    fn fetch_snapshot(&self, snapshot_id: &str) -> Result<serde_json::Value>;
}

/// What a conversation knows about its attached résumé.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeLink {
    pub snapshot_id: String,
    pub is_read: bool,
    pub status: ResumeStatus,
}

impl TenantResolver for Database {
    fn resolve(&self, bundle_id: &str) -> Result<String> {
        let app = self.get_app_by_bundle_id(bundle_id).map_err(|e| {
            warn!(bundle_id, "tenant lookup failed: {}", e);
            ChatError::from(e)
        })?;
        Ok(app.id)
    }
}

impl MediaFetcher for Database {
    fn fetch(&self, ids: &[String]) -> Result<Vec<Media>> {
        Ok(self.get_media(ids)?)
    }
}

impl ResumeHandoff for Database {
    fn attach(
        &self,
        tenant_id: &str,
        actor_id: &str,
        chat_id: &str,
        post_id: &str,
        content: &serde_json::Value,
    ) -> Result<String> {
        let relation = self.attach_resume(
            tenant_id,
            actor_id,
            chat_id,
            post_id,
            content,
            ResumeStatus::Unlocked,
            Utc::now(),
        )?;
        Ok(relation.snapshot_id)
    }

    fn relation(&self, chat_id: &str) -> Result<Option<ResumeLink>> {
        let relation = self.get_resume_relation_by_chat(chat_id)?;
        Ok(relation.map(|r| ResumeLink {
            snapshot_id: r.snapshot_id,
            is_read: r.is_read,
            status: r.status,
        }))
    }

    fn fetch_snapshot(&self, snapshot_id: &str) -> Result<serde_json::Value> {
        Ok(self.get_resume_snapshot(snapshot_id)?.content)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn tenant_resolution_uses_bundle_id() {
        let db = Database::open_in_memory().unwrap();
        db.create_app("app-1", "Jobs", "com.example.jobs").unwrap();

        assert_eq!(TenantResolver::resolve(&db, "com.example.jobs").unwrap(), "app-1");
        assert!(matches!(
            TenantResolver::resolve(&db, "com.example.other"),
            Err(ChatError::NotFound(ref s)) if s.contains("com.example.other")
        ));
    }

    #[test]
    fn resume_round_trips_through_the_store() {
        let db = Database::open_in_memory().unwrap();
        let (chat_id, _) = db
            .get_or_create_chat("app-1", "seeker", "recruiter", Some("post-1"), Utc::now())
            .unwrap();
        assert!(db.relation(&chat_id).unwrap().is_none());

        let content = json!({ "headline": "Rust engineer" });
        let snapshot_id = db
            .attach("app-1", "seeker", &chat_id, "post-1", &content)
            .unwrap();

        let link = db.relation(&chat_id).unwrap().unwrap();
        assert_eq!(link.snapshot_id, snapshot_id);
        assert_eq!(link.status, ResumeStatus::Unlocked);
        assert_eq!(db.fetch_snapshot(&snapshot_id).unwrap(), content);
    }
}
