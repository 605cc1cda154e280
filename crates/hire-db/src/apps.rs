use rusqlite::params;

use crate::Database;
use crate::error::Result;
use crate::models::AppRow;

impl Database {
    // -- Tenants --

    /// Register a tenant. Re-registering an existing bundle id is a no-op.
    pub fn create_app(&self, id: &str, name: &str, bundle_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO apps (id, name, bundle_id) VALUES (?1, ?2, ?3)",
                params![id, name, bundle_id],
            )?;
            Ok(())
        })
    }

    pub fn get_app_by_bundle_id(&self, bundle_id: &str) -> Result<AppRow> {
        self.with_conn(|conn| {
            let row = conn.query_row(
                "SELECT id, name, bundle_id FROM apps WHERE bundle_id = ?1",
                [bundle_id],
                |row| {
                    Ok(AppRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        bundle_id: row.get(2)?,
                    })
                },
            )?;
            Ok(row)
        })
        .map_err(|e| e.context("app", bundle_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreError;

    #[test]
    fn resolves_registered_bundle_only() {
        let db = Database::open_in_memory().unwrap();
        db.create_app("app-1", "Hire", "com.example.hire").unwrap();
        db.create_app("app-1", "Hire", "com.example.hire").unwrap();

        assert_eq!(db.get_app_by_bundle_id("com.example.hire").unwrap().id, "app-1");
        let err = db.get_app_by_bundle_id("com.example.other").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(ref s) if s.contains("com.example.other")));
    }
}
