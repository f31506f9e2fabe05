//! Storage layer
//!
//! The local store is the system of record while offline. The reconciler
//! only sees it through the [`LocalStore`] and [`UserStore`] traits;
//! [`SqliteStore`] is the concrete implementation.
//!
//! ## Contract
//!
//! - Records are keyed by local id and never hard-deleted.
//! - Absence is always explicit (`Option` / `bool` results), never a
//!   default value.
//! - A record's remote id, once assigned, is never cleared by a write.

pub mod error;
pub mod schema;
mod sqlite;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{SyncState, User};

pub use error::{StorageError, StorageResult};
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
pub use sqlite::{SqliteStore, StoreCounts};

/// Keyed persistence for one entity kind
pub trait LocalStore<R>: Send + Sync {
    /// Non-tombstoned records owned by `owner_id`, ordered by name
    fn list_active(&self, owner_id: &str) -> StorageResult<Vec<R>>;

    /// Records with `SyncState::Pending`, tombstones included, in store order
    fn list_pending(&self, owner_id: &str) -> StorageResult<Vec<R>>;

    /// Look up a record by local id, tombstoned or not
    fn get(&self, local_id: Uuid) -> StorageResult<Option<R>>;

    /// Insert or fully replace a record
    ///
    /// Refreshes `last_modified`, sets `sync_state` to `state` and keeps any
    /// remote id already stored; `record` is updated to match what was
    /// written.
    fn upsert(&self, record: &mut R, state: SyncState) -> StorageResult<()>;

    /// Mark a record synced, assigning `remote_id` if it has none yet
    ///
    /// Idempotent. Returns `false` if no such record exists.
    fn mark_synced(&self, local_id: Uuid, remote_id: Option<&str>) -> StorageResult<bool>;

    /// Soft-delete a record: tombstone it and mark it pending
    ///
    /// Returns `false` if no such record exists.
    fn mark_deleted_locally(&self, local_id: Uuid) -> StorageResult<bool>;
}

/// Users known to this device and their sync bookkeeping
pub trait UserStore: Send + Sync {
    /// The logged-in user, if any
    fn current_user(&self) -> StorageResult<Option<User>>;

    /// Insert or replace a user record as-is
    fn save_user(&self, user: &User) -> StorageResult<()>;

    /// Save `user` as the only logged-in user
    fn log_in(&self, user: &User) -> StorageResult<()>;

    /// Log every user out
    fn log_out(&self) -> StorageResult<()>;

    /// Record a completed sync run; returns `false` for an unknown user
    fn update_last_sync(&self, user_id: &str, at: DateTime<Utc>) -> StorageResult<bool>;
}
