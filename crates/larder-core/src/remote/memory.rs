//! In-memory remote service
//!
//! Implements the remote contract against plain vectors, with call
//! accounting and failure injection, so reconciliation can be exercised
//! without a server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{
    BearerToken, ItemPayload, LocationPayload, RemoteApi, RemoteCollection, RemoteItem,
    RemoteLocation, RemoteRecord, RemoteResult,
};
use crate::sync::SyncError;

/// Kind of remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Probe,
    List,
    Fetch,
    Create,
    Update,
    Delete,
}

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCall {
    /// Collection path, empty for the probe
    pub collection: &'static str,
    pub operation: Operation,
    pub remote_id: Option<String>,
}

type CallHook = Box<dyn Fn(&RemoteCall) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
struct FailureRule {
    /// Matching calls to let through first
    skip: usize,
    /// Matching calls to fail after that
    times: usize,
}

/// Remote service double
pub struct InMemoryRemote {
    reachable: AtomicBool,
    refuse_deletes: AtomicBool,
    user_id: String,
    next_id: AtomicU64,
    latency: Mutex<Option<Duration>>,
    locations: Mutex<Vec<RemoteLocation>>,
    items: Mutex<Vec<RemoteItem>>,
    failures: Mutex<HashMap<(&'static str, Operation), FailureRule>>,
    calls: Mutex<Vec<RemoteCall>>,
    hook: Mutex<Option<CallHook>>,
}

/// Records the in-memory service knows how to store
pub trait MemoryRecord: RemoteRecord {
    /// Build the stored record the server would return for a create or update
    fn from_payload(id: String, user_id: &str, payload: &Self::Payload) -> Self;

    fn table(remote: &InMemoryRemote) -> &Mutex<Vec<Self>>;
}

impl MemoryRecord for RemoteLocation {
    fn from_payload(id: String, user_id: &str, payload: &LocationPayload) -> Self {
        RemoteLocation {
            id,
            name: payload.name.clone(),
            description: payload.description.clone(),
            user_id: user_id.to_string(),
        }
    }

    fn table(remote: &InMemoryRemote) -> &Mutex<Vec<Self>> {
        &remote.locations
    }
}

impl MemoryRecord for RemoteItem {
    fn from_payload(id: String, user_id: &str, payload: &ItemPayload) -> Self {
        RemoteItem {
            id,
            name: payload.name.clone(),
            brand: payload.brand.clone(),
            size: payload.size.clone(),
            nutritional_info: payload.nutritional_info.clone(),
            date_purchased: payload.date_purchased.clone(),
            expiration_date: payload.expiration_date.clone(),
            ingredients: payload.ingredients.clone(),
            other_info: payload.other_info.clone(),
            location_id: payload.location_id.clone(),
            user_id: user_id.to_string(),
        }
    }

    fn table(remote: &InMemoryRemote) -> &Mutex<Vec<Self>> {
        &remote.items
    }
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemote {
    /// Create an empty, reachable service
    pub fn new() -> Self {
        Self::with_user("")
    }

    /// Create a service that stamps `user_id` on created records
    pub fn with_user(user_id: impl Into<String>) -> Self {
        Self {
            reachable: AtomicBool::new(true),
            refuse_deletes: AtomicBool::new(false),
            user_id: user_id.into(),
            next_id: AtomicU64::new(1),
            latency: Mutex::new(None),
            locations: Mutex::new(Vec::new()),
            items: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            hook: Mutex::new(None),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make deletes answer `Ok(false)` instead of removing the record
    pub fn set_refuse_deletes(&self, refuse: bool) {
        self.refuse_deletes.store(refuse, Ordering::SeqCst);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *guard(&self.latency) = Some(latency);
    }

    /// Fail the next `times` calls of `operation` on `collection`
    pub fn fail_on(&self, collection: &'static str, operation: Operation, times: usize) {
        guard(&self.failures).insert((collection, operation), FailureRule { skip: 0, times });
    }

    /// Fail only the `nth` (1-based) upcoming call of `operation` on `collection`
    pub fn fail_nth(&self, collection: &'static str, operation: Operation, nth: usize) {
        guard(&self.failures).insert(
            (collection, operation),
            FailureRule {
                skip: nth.saturating_sub(1),
                times: 1,
            },
        );
    }

    /// Run `hook` after every call is recorded
    pub fn on_call(&self, hook: impl Fn(&RemoteCall) + Send + Sync + 'static) {
        *guard(&self.hook) = Some(Box::new(hook));
    }

    /// Store a record as if another client had created it
    pub fn seed<R: MemoryRecord>(&self, record: R) {
        guard(R::table(self)).push(record);
    }

    /// Edit a stored record in place; returns `false` for an unknown id
    pub fn edit<R: MemoryRecord>(&self, remote_id: &str, f: impl FnOnce(&mut R)) -> bool {
        let mut table = guard(R::table(self));
        match table.iter_mut().find(|r| r.remote_id() == remote_id) {
            Some(record) => {
                f(record);
                true
            }
            None => false,
        }
    }

    /// Snapshot of a collection in creation order
    pub fn records<R: MemoryRecord>(&self) -> Vec<R> {
        guard(R::table(self)).clone()
    }

    /// Every call so far
    pub fn calls(&self) -> Vec<RemoteCall> {
        guard(&self.calls).clone()
    }

    /// Number of calls of `operation` on `collection`
    pub fn count(&self, collection: &str, operation: Operation) -> usize {
        guard(&self.calls)
            .iter()
            .filter(|c| c.collection == collection && c.operation == operation)
            .count()
    }

    /// Number of calls that would have modified the server
    pub fn write_count(&self) -> usize {
        guard(&self.calls)
            .iter()
            .filter(|c| {
                matches!(
                    c.operation,
                    Operation::Create | Operation::Update | Operation::Delete
                )
            })
            .count()
    }

    pub fn clear_calls(&self) {
        guard(&self.calls).clear();
    }

    async fn enter(
        &self,
        collection: &'static str,
        operation: Operation,
        remote_id: Option<&str>,
    ) -> RemoteResult<()> {
        let latency = *guard(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let call = RemoteCall {
            collection,
            operation,
            remote_id: remote_id.map(str::to_string),
        };
        guard(&self.calls).push(call.clone());
        if let Some(hook) = guard(&self.hook).as_ref() {
            hook(&call);
        }

        if !self.reachable.load(Ordering::SeqCst) {
            return Err(SyncError::transport("connection refused"));
        }

        let mut failures = guard(&self.failures);
        if let Some(rule) = failures.get_mut(&(collection, operation)) {
            if rule.skip > 0 {
                rule.skip -= 1;
            } else if rule.times > 0 {
                rule.times -= 1;
                return Err(SyncError::transport(format!(
                    "injected failure on {:?} {}",
                    operation, collection
                )));
            }
        }
        Ok(())
    }

    fn next_id(&self, collection: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", collection, n)
    }
}

#[async_trait]
impl RemoteApi for InMemoryRemote {
    async fn probe(&self) -> bool {
        self.enter("", Operation::Probe, None).await.is_ok()
    }
}

#[async_trait]
impl<R: MemoryRecord> RemoteCollection<R> for InMemoryRemote {
    async fn list_all(&self, _token: &BearerToken) -> RemoteResult<Vec<R>> {
        self.enter(R::COLLECTION, Operation::List, None).await?;
        Ok(self.records())
    }

    async fn fetch(&self, _token: &BearerToken, remote_id: &str) -> RemoteResult<Option<R>> {
        self.enter(R::COLLECTION, Operation::Fetch, Some(remote_id))
            .await?;
        Ok(guard(R::table(self))
            .iter()
            .find(|r| r.remote_id() == remote_id)
            .cloned())
    }

    async fn create(&self, _token: &BearerToken, payload: &R::Payload) -> RemoteResult<R> {
        self.enter(R::COLLECTION, Operation::Create, None).await?;
        let record = R::from_payload(self.next_id(R::COLLECTION), &self.user_id, payload);
        guard(R::table(self)).push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        _token: &BearerToken,
        remote_id: &str,
        payload: &R::Payload,
    ) -> RemoteResult<R> {
        self.enter(R::COLLECTION, Operation::Update, Some(remote_id))
            .await?;
        let record = R::from_payload(remote_id.to_string(), &self.user_id, payload);
        let mut table = guard(R::table(self));
        // Unknown ids are stored as given
        match table.iter_mut().find(|r| r.remote_id() == remote_id) {
            Some(existing) => *existing = record.clone(),
            None => table.push(record.clone()),
        }
        Ok(record)
    }

    async fn delete(&self, _token: &BearerToken, remote_id: &str) -> RemoteResult<bool> {
        self.enter(R::COLLECTION, Operation::Delete, Some(remote_id))
            .await?;
        if self.refuse_deletes.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let mut table = guard(R::table(self));
        let before = table.len();
        table.retain(|r| r.remote_id() != remote_id);
        Ok(table.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> BearerToken {
        BearerToken::new("t").unwrap()
    }

    fn payload(name: &str) -> LocationPayload {
        LocationPayload {
            name: name.to_string(),
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_unique_ids() {
        let remote = InMemoryRemote::with_user("u1");
        let first = RemoteCollection::<RemoteLocation>::create(&remote, &token(), &payload("A"))
            .await
            .unwrap();
        let second = RemoteCollection::<RemoteLocation>::create(&remote, &token(), &payload("B"))
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.user_id, "u1");
        assert_eq!(remote.records::<RemoteLocation>().len(), 2);
        assert_eq!(remote.count("locations", Operation::Create), 2);
    }

    #[tokio::test]
    async fn test_unreachable() {
        let remote = InMemoryRemote::new();
        remote.set_reachable(false);

        assert!(!remote.probe().await);
        let result = RemoteCollection::<RemoteItem>::list_all(&remote, &token()).await;
        assert!(matches!(result, Err(SyncError::Transport { .. })));
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed() {
        let remote = InMemoryRemote::new();
        remote.fail_on("locations", Operation::Create, 1);

        let failed = RemoteCollection::<RemoteLocation>::create(&remote, &token(), &payload("A")).await;
        assert!(failed.is_err());
        let retried = RemoteCollection::<RemoteLocation>::create(&remote, &token(), &payload("A")).await;
        assert!(retried.is_ok());
        assert_eq!(remote.records::<RemoteLocation>().len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let remote = InMemoryRemote::new();
        let created = RemoteCollection::<RemoteLocation>::create(&remote, &token(), &payload("A"))
            .await
            .unwrap();

        let updated =
            RemoteCollection::<RemoteLocation>::update(&remote, &token(), &created.id, &payload("B"))
                .await
                .unwrap();
        assert_eq!(updated.name, "B");

        let unknown =
            RemoteCollection::<RemoteLocation>::update(&remote, &token(), "elsewhere", &payload("C"))
                .await
                .unwrap();
        assert_eq!(unknown.id, "elsewhere");
        assert_eq!(remote.records::<RemoteLocation>().len(), 2);
        assert!(RemoteCollection::<RemoteLocation>::delete(&remote, &token(), "elsewhere")
            .await
            .unwrap());

        assert!(RemoteCollection::<RemoteLocation>::delete(&remote, &token(), &created.id)
            .await
            .unwrap());
        assert!(!RemoteCollection::<RemoteLocation>::delete(&remote, &token(), &created.id)
            .await
            .unwrap());
        assert!(remote.records::<RemoteLocation>().is_empty());
    }

    #[tokio::test]
    async fn test_refused_delete_keeps_record() {
        let remote = InMemoryRemote::new();
        remote.seed(RemoteLocation {
            id: "l1".into(),
            ..Default::default()
        });
        remote.set_refuse_deletes(true);

        assert!(!RemoteCollection::<RemoteLocation>::delete(&remote, &token(), "l1")
            .await
            .unwrap());
        assert_eq!(remote.records::<RemoteLocation>().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_and_edit() {
        let remote = InMemoryRemote::new();
        remote.seed(RemoteItem {
            id: "i1".into(),
            name: "Rice".into(),
            ..Default::default()
        });

        assert!(remote.edit::<RemoteItem>("i1", |item| item.brand = "Acme".into()));
        let fetched = RemoteCollection::<RemoteItem>::fetch(&remote, &token(), "i1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.brand, "Acme");
        assert!(RemoteCollection::<RemoteItem>::fetch(&remote, &token(), "nope")
            .await
            .unwrap()
            .is_none());
    }
}
