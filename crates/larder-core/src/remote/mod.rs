//! Remote inventory service client
//!
//! The reconciler talks to the server through [`RemoteApi`] (connectivity)
//! and one [`RemoteCollection`] per record kind. [`HttpRemoteClient`] is the
//! production implementation; [`InMemoryRemote`] backs the tests.
//!
//! ## REST surface
//!
//! | Path                      | Method | Purpose      |
//! |---------------------------|--------|--------------|
//! | `/`                       | GET    | probe        |
//! | `/{kind}`                 | GET    | list all     |
//! | `/{kind}/{id}`            | GET    | fetch one    |
//! | `/{kind}/add`             | POST   | create       |
//! | `/{kind}/{id}/edit`       | POST   | update       |
//! | `/{kind}/{id}/delete`     | POST   | delete       |
//!
//! where `{kind}` is `locations` or `items`.

use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub mod http;
pub mod memory;
mod models;

pub use http::HttpRemoteClient;
pub use memory::InMemoryRemote;
pub use models::{ItemPayload, LocationPayload, RemoteItem, RemoteLocation};

use crate::sync::SyncError;

/// Result type for remote calls; every failure is a transport error
pub type RemoteResult<T> = Result<T, SyncError>;

/// A non-empty bearer credential
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Returns `None` for an empty or blank token
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

/// A record as stored on the server
pub trait RemoteRecord: Clone + Send + Sync + DeserializeOwned + 'static {
    /// Body sent on create and update
    type Payload: Serialize + Send + Sync;

    /// Path segment of the collection (`locations`, `items`)
    const COLLECTION: &'static str;

    /// Server-assigned identifier
    fn remote_id(&self) -> &str;
}

/// Connectivity to the remote service
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Whether the service answers at all; never fails, never authenticates
    async fn probe(&self) -> bool;
}

/// CRUD operations on one remote collection
#[async_trait]
pub trait RemoteCollection<R: RemoteRecord>: RemoteApi {
    /// Every record visible to the token's identity
    async fn list_all(&self, token: &BearerToken) -> RemoteResult<Vec<R>>;

    /// One record, or `None` if the server does not know the id
    async fn fetch(&self, token: &BearerToken, remote_id: &str) -> RemoteResult<Option<R>>;

    async fn create(&self, token: &BearerToken, payload: &R::Payload) -> RemoteResult<R>;

    async fn update(
        &self,
        token: &BearerToken,
        remote_id: &str,
        payload: &R::Payload,
    ) -> RemoteResult<R>;

    /// Best-effort delete; `Ok(false)` when the server refused
    async fn delete(&self, token: &BearerToken, remote_id: &str) -> RemoteResult<bool>;
}
