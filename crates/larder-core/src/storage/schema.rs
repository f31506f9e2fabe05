//! SQLite schema for the local store
//!
//! Records are keyed by their local id. Tombstoned rows stay in place
//! forever; the `(owner_id, sync_state)` indexes serve the pending queries
//! the reconciler issues on every run.

use rusqlite::{Connection, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL,
            name TEXT NOT NULL,
            access_token TEXT,
            token_expiry INTEGER,
            is_logged_in INTEGER NOT NULL DEFAULT 0,
            last_sync_at INTEGER
        );

        CREATE TABLE IF NOT EXISTS locations (
            local_id TEXT PRIMARY KEY,
            remote_id TEXT,
            name TEXT NOT NULL,
            description TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            sync_state TEXT NOT NULL,
            last_modified INTEGER NOT NULL,
            tombstoned INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS storage_items (
            local_id TEXT PRIMARY KEY,
            remote_id TEXT,
            name TEXT NOT NULL,
            brand TEXT NOT NULL,
            size TEXT NOT NULL,
            nutritional_info TEXT NOT NULL,
            date_purchased TEXT NOT NULL,
            expiration_date TEXT NOT NULL,
            ingredients TEXT NOT NULL,
            other_info TEXT NOT NULL,
            location_local_id TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            sync_state TEXT NOT NULL,
            last_modified INTEGER NOT NULL,
            tombstoned INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (location_local_id) REFERENCES locations(local_id)
        );

        -- Pending / active queries per owner
        CREATE INDEX IF NOT EXISTS idx_locations_owner_state ON locations(owner_id, sync_state);
        CREATE INDEX IF NOT EXISTS idx_items_owner_state ON storage_items(owner_id, sync_state);

        -- Lookup by server id
        CREATE INDEX IF NOT EXISTS idx_locations_owner_remote ON locations(owner_id, remote_id);
        CREATE INDEX IF NOT EXISTS idx_items_owner_remote ON storage_items(owner_id, remote_id);

        -- Items in a location
        CREATE INDEX IF NOT EXISTS idx_items_location ON storage_items(location_local_id);
        "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if schema needs initialization or migration
pub fn needs_init(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    match get_schema_version(conn) {
        Ok(Some(v)) => v < SCHEMA_VERSION,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"users".to_string()));
        assert!(tables.contains(&"locations".to_string()));
        assert!(tables.contains(&"storage_items".to_string()));
    }

    #[test]
    fn test_schema_version() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(needs_init(&conn));

        init_schema(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
        assert!(!needs_init(&conn));
    }

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn test_indexes_exist() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let indexes: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(indexes.contains(&"idx_locations_owner_state".to_string()));
        assert!(indexes.contains(&"idx_items_owner_remote".to_string()));
        assert!(indexes.contains(&"idx_items_location".to_string()));
    }
}
