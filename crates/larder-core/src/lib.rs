//! Larder Core Library
//!
//! This crate provides the core functionality for Larder, an offline-first
//! inventory tracker for storage locations and the items kept in them.
//!
//! # Architecture
//!
//! - **SQLite**: Local system of record; every edit lands here first
//! - **Remote service**: REST API reconciled against on demand
//!
//! Records carry a sync state (`Pending` / `Synced`) and a tombstone flag.
//! A sync run downloads remote records, keeps local edits on conflict and
//! then uploads whatever is still pending.
//!
//! # Quick Start
//!
//! ```text
//! let store = Arc::new(SqliteStore::open(&config)?);
//! let remote = Arc::new(HttpRemoteClient::from_config(&config)?);
//!
//! let mut pantry = Location::new(&user.id, "Pantry");
//! LocalStore::<Location>::upsert(&*store, &mut pantry, SyncState::Pending)?;
//!
//! let outcome = SyncOrchestrator::new(store, remote).run_sync(&user.id).await;
//! ```
//!
//! # Modules
//!
//! - `models`: Locations, items and users
//! - `storage`: Local store traits and the SQLite implementation
//! - `remote`: Remote service traits, HTTP client and in-memory double
//! - `sync`: Reconciler and orchestrator
//! - `config`: Application configuration

pub mod config;
pub mod models;
pub mod remote;
pub mod storage;
pub mod sync;

pub use config::Config;
pub use models::{EntityKind, Location, StorageItem, SyncState, User};
pub use remote::{BearerToken, HttpRemoteClient, InMemoryRemote};
pub use storage::{LocalStore, SqliteStore, StorageError, UserStore};
pub use sync::{CancelToken, SyncError, SyncOrchestrator, SyncOutcome, SyncStatus};
