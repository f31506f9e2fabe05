//! SQLite-backed local store
//!
//! A single connection guarded by a mutex. Every trait call takes the lock
//! for the duration of one statement (or one small transaction), so
//! concurrent readers see individual records either before or after a
//! write, never half-written.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Params, Row};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::error::{StorageError, StorageResult};
use super::schema::{init_schema, needs_init};
use super::{LocalStore, UserStore};
use crate::config::Config;
use crate::models::{Location, StorageItem, SyncState, User};

const LOCATIONS: &str = "locations";
const ITEMS: &str = "storage_items";

const LOCATION_COLUMNS: &str =
    "local_id, remote_id, name, description, owner_id, sync_state, last_modified, tombstoned";

const ITEM_COLUMNS: &str = "local_id, remote_id, name, brand, size, nutritional_info, \
     date_purchased, expiration_date, ingredients, other_info, location_local_id, owner_id, \
     sync_state, last_modified, tombstoned";

const USER_COLUMNS: &str =
    "id, email, name, access_token, token_expiry, is_logged_in, last_sync_at";

/// Record counts for one user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    /// Active (non-tombstoned) locations
    pub locations: i64,
    /// Active (non-tombstoned) items
    pub items: i64,
    /// Locations waiting to be pushed, tombstones included
    pub pending_locations: i64,
    /// Items waiting to be pushed, tombstones included
    pub pending_items: i64,
}

/// Local store backed by a SQLite database
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at the configured location
    pub fn open(config: &Config) -> StorageResult<Self> {
        Self::open_path(&config.sqlite_path())
    }

    /// Open or create the database at a specific path
    pub fn open_path(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::from_io(e, parent.to_path_buf()))?;
            }
        }

        debug!("Opening local store at {:?}", path);
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        if needs_init(&conn) {
            init_schema(&conn)?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    // ==================== Item Queries ====================

    /// Active items in one location
    pub fn list_items_in_location(
        &self,
        owner_id: &str,
        location_local_id: Uuid,
    ) -> StorageResult<Vec<StorageItem>> {
        let conn = self.lock()?;
        query_items(
            &conn,
            &format!(
                "SELECT {} FROM {} WHERE owner_id = ?1 AND location_local_id = ?2 AND tombstoned = 0 \
                 ORDER BY name, local_id",
                ITEM_COLUMNS, ITEMS
            ),
            params![owner_id, location_local_id.to_string()],
        )
    }

    /// Active items with the name of their location filled in
    pub fn list_active_items_with_location_names(
        &self,
        owner_id: &str,
    ) -> StorageResult<Vec<StorageItem>> {
        let conn = self.lock()?;
        let columns = ITEM_COLUMNS
            .split(", ")
            .map(|c| format!("i.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {}, l.name FROM {} i LEFT JOIN {} l ON l.local_id = i.location_local_id \
             WHERE i.owner_id = ?1 AND i.tombstoned = 0 ORDER BY i.name, i.local_id",
            columns, ITEMS, LOCATIONS
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![owner_id], |row| {
            Ok((ItemRow::from_row(row)?, row.get::<_, Option<String>>(15)?))
        })?;

        let mut items = Vec::new();
        for row in rows {
            let (item_row, location_name) = row?;
            let mut item = item_row.hydrate()?;
            item.location_name = location_name;
            items.push(item);
        }
        Ok(items)
    }

    /// Record and pending counts for a user
    pub fn counts(&self, owner_id: &str) -> StorageResult<StoreCounts> {
        let conn = self.lock()?;
        let count = |sql: String| -> StorageResult<i64> {
            Ok(conn.query_row(&sql, params![owner_id], |row| row.get(0))?)
        };

        Ok(StoreCounts {
            locations: count(format!(
                "SELECT COUNT(*) FROM {} WHERE owner_id = ?1 AND tombstoned = 0",
                LOCATIONS
            ))?,
            items: count(format!(
                "SELECT COUNT(*) FROM {} WHERE owner_id = ?1 AND tombstoned = 0",
                ITEMS
            ))?,
            pending_locations: count(format!(
                "SELECT COUNT(*) FROM {} WHERE owner_id = ?1 AND sync_state = 'pending'",
                LOCATIONS
            ))?,
            pending_items: count(format!(
                "SELECT COUNT(*) FROM {} WHERE owner_id = ?1 AND sync_state = 'pending'",
                ITEMS
            ))?,
        })
    }

    // ==================== User Queries ====================

    /// Look up a user by id, logged in or not
    pub fn get_user(&self, id: &str) -> StorageResult<Option<User>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                params![id],
                UserRow::from_row,
            )
            .optional()?;
        Ok(row.map(UserRow::hydrate))
    }
}

impl LocalStore<Location> for SqliteStore {
    fn list_active(&self, owner_id: &str) -> StorageResult<Vec<Location>> {
        let conn = self.lock()?;
        query_locations(
            &conn,
            &format!(
                "SELECT {} FROM {} WHERE owner_id = ?1 AND tombstoned = 0 ORDER BY name, local_id",
                LOCATION_COLUMNS, LOCATIONS
            ),
            params![owner_id],
        )
    }

    fn list_pending(&self, owner_id: &str) -> StorageResult<Vec<Location>> {
        let conn = self.lock()?;
        query_locations(
            &conn,
            &format!(
                "SELECT {} FROM {} WHERE owner_id = ?1 AND sync_state = 'pending' ORDER BY rowid",
                LOCATION_COLUMNS, LOCATIONS
            ),
            params![owner_id],
        )
    }

    fn get(&self, local_id: Uuid) -> StorageResult<Option<Location>> {
        let conn = self.lock()?;
        let mut found = query_locations(
            &conn,
            &format!(
                "SELECT {} FROM {} WHERE local_id = ?1",
                LOCATION_COLUMNS, LOCATIONS
            ),
            params![local_id.to_string()],
        )?;
        Ok(found.pop())
    }

    fn upsert(&self, location: &mut Location, state: SyncState) -> StorageResult<()> {
        let conn = self.lock()?;

        if let Some(stored) = stored_remote_id(&conn, LOCATIONS, location.local_id)? {
            location.remote_id = Some(stored);
        }
        location.sync_state = state;
        location.last_modified = Utc::now();

        conn.execute(
            r#"
            INSERT INTO locations (local_id, remote_id, name, description, owner_id,
                                   sync_state, last_modified, tombstoned)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(local_id) DO UPDATE SET
                remote_id = excluded.remote_id,
                name = excluded.name,
                description = excluded.description,
                owner_id = excluded.owner_id,
                sync_state = excluded.sync_state,
                last_modified = excluded.last_modified,
                tombstoned = excluded.tombstoned
            "#,
            params![
                location.local_id.to_string(),
                location.remote_id(),
                location.name,
                location.description,
                location.owner_id,
                location.sync_state.as_str(),
                location.last_modified.timestamp_millis(),
                location.tombstoned,
            ],
        )?;

        Ok(())
    }

    fn mark_synced(&self, local_id: Uuid, remote_id: Option<&str>) -> StorageResult<bool> {
        let conn = self.lock()?;
        mark_synced_in(&conn, LOCATIONS, local_id, remote_id)
    }

    fn mark_deleted_locally(&self, local_id: Uuid) -> StorageResult<bool> {
        let conn = self.lock()?;
        mark_deleted_in(&conn, LOCATIONS, local_id)
    }
}

impl LocalStore<StorageItem> for SqliteStore {
    fn list_active(&self, owner_id: &str) -> StorageResult<Vec<StorageItem>> {
        let conn = self.lock()?;
        query_items(
            &conn,
            &format!(
                "SELECT {} FROM {} WHERE owner_id = ?1 AND tombstoned = 0 ORDER BY name, local_id",
                ITEM_COLUMNS, ITEMS
            ),
            params![owner_id],
        )
    }

    fn list_pending(&self, owner_id: &str) -> StorageResult<Vec<StorageItem>> {
        let conn = self.lock()?;
        query_items(
            &conn,
            &format!(
                "SELECT {} FROM {} WHERE owner_id = ?1 AND sync_state = 'pending' ORDER BY rowid",
                ITEM_COLUMNS, ITEMS
            ),
            params![owner_id],
        )
    }

    fn get(&self, local_id: Uuid) -> StorageResult<Option<StorageItem>> {
        let conn = self.lock()?;
        let mut found = query_items(
            &conn,
            &format!("SELECT {} FROM {} WHERE local_id = ?1", ITEM_COLUMNS, ITEMS),
            params![local_id.to_string()],
        )?;
        Ok(found.pop())
    }

    fn upsert(&self, item: &mut StorageItem, state: SyncState) -> StorageResult<()> {
        let conn = self.lock()?;

        let location_owner: Option<String> = conn
            .query_row(
                "SELECT owner_id FROM locations WHERE local_id = ?1",
                params![item.location_local_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if location_owner.as_deref() != Some(item.owner_id.as_str()) {
            return Err(StorageError::InvalidReference {
                item: item.local_id,
                location: item.location_local_id,
            });
        }

        if let Some(stored) = stored_remote_id(&conn, ITEMS, item.local_id)? {
            item.remote_id = Some(stored);
        }
        item.sync_state = state;
        item.last_modified = Utc::now();

        conn.execute(
            r#"
            INSERT INTO storage_items (local_id, remote_id, name, brand, size, nutritional_info,
                                       date_purchased, expiration_date, ingredients, other_info,
                                       location_local_id, owner_id, sync_state, last_modified,
                                       tombstoned)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(local_id) DO UPDATE SET
                remote_id = excluded.remote_id,
                name = excluded.name,
                brand = excluded.brand,
                size = excluded.size,
                nutritional_info = excluded.nutritional_info,
                date_purchased = excluded.date_purchased,
                expiration_date = excluded.expiration_date,
                ingredients = excluded.ingredients,
                other_info = excluded.other_info,
                location_local_id = excluded.location_local_id,
                owner_id = excluded.owner_id,
                sync_state = excluded.sync_state,
                last_modified = excluded.last_modified,
                tombstoned = excluded.tombstoned
            "#,
            params![
                item.local_id.to_string(),
                item.remote_id(),
                item.name,
                item.brand,
                item.size,
                item.nutritional_info,
                item.date_purchased,
                item.expiration_date,
                item.ingredients,
                item.other_info,
                item.location_local_id.to_string(),
                item.owner_id,
                item.sync_state.as_str(),
                item.last_modified.timestamp_millis(),
                item.tombstoned,
            ],
        )?;

        Ok(())
    }

    fn mark_synced(&self, local_id: Uuid, remote_id: Option<&str>) -> StorageResult<bool> {
        let conn = self.lock()?;
        mark_synced_in(&conn, ITEMS, local_id, remote_id)
    }

    fn mark_deleted_locally(&self, local_id: Uuid) -> StorageResult<bool> {
        let conn = self.lock()?;
        mark_deleted_in(&conn, ITEMS, local_id)
    }
}

impl UserStore for SqliteStore {
    fn current_user(&self) -> StorageResult<Option<User>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM users WHERE is_logged_in = 1 ORDER BY rowid LIMIT 1",
                    USER_COLUMNS
                ),
                [],
                UserRow::from_row,
            )
            .optional()?;
        Ok(row.map(UserRow::hydrate))
    }

    fn save_user(&self, user: &User) -> StorageResult<()> {
        let conn = self.lock()?;
        write_user(&conn, user, user.is_logged_in)
    }

    fn log_in(&self, user: &User) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("UPDATE users SET is_logged_in = 0", [])?;
        write_user(&tx, user, true)?;
        tx.commit()?;
        Ok(())
    }

    fn log_out(&self) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute("UPDATE users SET is_logged_in = 0", [])?;
        Ok(())
    }

    fn update_last_sync(&self, user_id: &str, at: DateTime<Utc>) -> StorageResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE users SET last_sync_at = ?2 WHERE id = ?1",
            params![user_id, at.timestamp_millis()],
        )?;
        Ok(changed > 0)
    }
}

// ==================== Row Helpers ====================

struct LocationRow {
    local_id: String,
    remote_id: Option<String>,
    name: String,
    description: String,
    owner_id: String,
    sync_state: String,
    last_modified: i64,
    tombstoned: bool,
}

impl LocationRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            local_id: row.get(0)?,
            remote_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            owner_id: row.get(4)?,
            sync_state: row.get(5)?,
            last_modified: row.get(6)?,
            tombstoned: row.get(7)?,
        })
    }

    fn hydrate(self) -> StorageResult<Location> {
        Ok(Location {
            local_id: parse_uuid(LOCATIONS, &self.local_id)?,
            remote_id: self.remote_id.filter(|s| !s.is_empty()),
            name: self.name,
            description: self.description,
            owner_id: self.owner_id,
            sync_state: parse_state(LOCATIONS, &self.sync_state)?,
            last_modified: from_millis(self.last_modified),
            tombstoned: self.tombstoned,
        })
    }
}

struct ItemRow {
    local_id: String,
    remote_id: Option<String>,
    name: String,
    brand: String,
    size: String,
    nutritional_info: String,
    date_purchased: String,
    expiration_date: String,
    ingredients: String,
    other_info: String,
    location_local_id: String,
    owner_id: String,
    sync_state: String,
    last_modified: i64,
    tombstoned: bool,
}

impl ItemRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            local_id: row.get(0)?,
            remote_id: row.get(1)?,
            name: row.get(2)?,
            brand: row.get(3)?,
            size: row.get(4)?,
            nutritional_info: row.get(5)?,
            date_purchased: row.get(6)?,
            expiration_date: row.get(7)?,
            ingredients: row.get(8)?,
            other_info: row.get(9)?,
            location_local_id: row.get(10)?,
            owner_id: row.get(11)?,
            sync_state: row.get(12)?,
            last_modified: row.get(13)?,
            tombstoned: row.get(14)?,
        })
    }

    fn hydrate(self) -> StorageResult<StorageItem> {
        Ok(StorageItem {
            local_id: parse_uuid(ITEMS, &self.local_id)?,
            remote_id: self.remote_id.filter(|s| !s.is_empty()),
            name: self.name,
            brand: self.brand,
            size: self.size,
            nutritional_info: self.nutritional_info,
            date_purchased: self.date_purchased,
            expiration_date: self.expiration_date,
            ingredients: self.ingredients,
            other_info: self.other_info,
            location_local_id: parse_uuid(ITEMS, &self.location_local_id)?,
            owner_id: self.owner_id,
            sync_state: parse_state(ITEMS, &self.sync_state)?,
            last_modified: from_millis(self.last_modified),
            tombstoned: self.tombstoned,
            location_name: None,
        })
    }
}

struct UserRow {
    id: String,
    email: String,
    name: String,
    access_token: Option<String>,
    token_expiry: Option<i64>,
    is_logged_in: bool,
    last_sync_at: Option<i64>,
}

impl UserRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            access_token: row.get(3)?,
            token_expiry: row.get(4)?,
            is_logged_in: row.get(5)?,
            last_sync_at: row.get(6)?,
        })
    }

    fn hydrate(self) -> User {
        User {
            id: self.id,
            email: self.email,
            name: self.name,
            access_token: self.access_token,
            token_expiry: self.token_expiry.map(from_millis),
            is_logged_in: self.is_logged_in,
            last_sync_at: self.last_sync_at.map(from_millis),
        }
    }
}

fn query_locations<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> StorageResult<Vec<Location>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, LocationRow::from_row)?;

    let mut locations = Vec::new();
    for row in rows {
        locations.push(row?.hydrate()?);
    }
    Ok(locations)
}

fn query_items<P: Params>(conn: &Connection, sql: &str, params: P) -> StorageResult<Vec<StorageItem>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, ItemRow::from_row)?;

    let mut items = Vec::new();
    for row in rows {
        items.push(row?.hydrate()?);
    }
    Ok(items)
}

fn write_user(conn: &Connection, user: &User, logged_in: bool) -> StorageResult<()> {
    conn.execute(
        r#"
        INSERT INTO users (id, email, name, access_token, token_expiry, is_logged_in, last_sync_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(id) DO UPDATE SET
            email = excluded.email,
            name = excluded.name,
            access_token = excluded.access_token,
            token_expiry = excluded.token_expiry,
            is_logged_in = excluded.is_logged_in,
            last_sync_at = COALESCE(excluded.last_sync_at, users.last_sync_at)
        "#,
        params![
            user.id,
            user.email,
            user.name,
            user.access_token,
            user.token_expiry.map(|t| t.timestamp_millis()),
            logged_in,
            user.last_sync_at.map(|t| t.timestamp_millis()),
        ],
    )?;
    Ok(())
}

/// The non-empty remote id already stored for a record
fn stored_remote_id(
    conn: &Connection,
    table: &'static str,
    local_id: Uuid,
) -> StorageResult<Option<String>> {
    let stored: Option<Option<String>> = conn
        .query_row(
            &format!("SELECT remote_id FROM {} WHERE local_id = ?1", table),
            params![local_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(stored.flatten().filter(|s| !s.is_empty()))
}

fn mark_synced_in(
    conn: &Connection,
    table: &'static str,
    local_id: Uuid,
    remote_id: Option<&str>,
) -> StorageResult<bool> {
    let remote_id = remote_id.filter(|s| !s.is_empty());
    let changed = conn.execute(
        &format!(
            "UPDATE {} SET sync_state = 'synced', \
             remote_id = CASE WHEN remote_id IS NULL OR remote_id = '' THEN ?2 ELSE remote_id END \
             WHERE local_id = ?1",
            table
        ),
        params![local_id.to_string(), remote_id],
    )?;
    Ok(changed > 0)
}

fn mark_deleted_in(conn: &Connection, table: &'static str, local_id: Uuid) -> StorageResult<bool> {
    let changed = conn.execute(
        &format!(
            "UPDATE {} SET tombstoned = 1, sync_state = 'pending', last_modified = ?2 \
             WHERE local_id = ?1",
            table
        ),
        params![local_id.to_string(), Utc::now().timestamp_millis()],
    )?;
    Ok(changed > 0)
}

fn parse_uuid(table: &'static str, value: &str) -> StorageResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| StorageError::corrupt(table, format!("invalid id '{}': {}", value, e)))
}

fn parse_state(table: &'static str, value: &str) -> StorageResult<SyncState> {
    value
        .parse::<SyncState>()
        .map_err(|e| StorageError::corrupt(table, e))
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}
