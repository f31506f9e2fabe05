//! Two-phase reconciliation of one entity kind
//!
//! ## Phase A: download and merge
//!
//! The full remote collection is listed and matched against local records
//! by remote id. Unknown remote records become local shadows marked
//! `Synced`. A match whose local copy is pending is a conflict and local
//! wins: the local fields stay and the record is marked `Synced`. Pending
//! tombstones are left for phase B so the delete still reaches the server.
//!
//! ## Phase B: upload
//!
//! Every pending record is pushed in store order. A transport failure on
//! create or update aborts the rest of the phase; records already marked
//! synced stay synced.

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::{SyncError, SyncResult};
use super::record::SyncRecord;
use super::state::CancelToken;
use crate::models::{Location, StorageItem, SyncState};
use crate::remote::{
    BearerToken, ItemPayload, LocationPayload, RemoteCollection, RemoteItem, RemoteLocation,
    RemoteRecord,
};
use crate::storage::{LocalStore, StorageResult};

/// Upload payload for the remote record type of `R`
pub type PayloadOf<R> = <<R as SyncRecord>::Remote as RemoteRecord>::Payload;

/// Whether a pending record can be pushed in this pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness<P> {
    Ready(P),
    /// Retried on the next run
    Deferred(&'static str),
}

/// Per-kind mapping between local and remote records
pub trait ReconcileStrategy<R: SyncRecord> {
    /// Build a local shadow for an unmatched remote record
    ///
    /// `None` skips the remote record for this pass.
    fn shadow(&self, remote: &R::Remote, owner_id: &str) -> Option<R>;

    /// Build the upload payload for a pending, non-tombstoned record
    fn payload(&self, local: &R) -> StorageResult<Readiness<PayloadOf<R>>>;
}

/// Locations have no foreign keys
#[derive(Debug, Clone, Copy, Default)]
pub struct LocationStrategy;

impl ReconcileStrategy<Location> for LocationStrategy {
    fn shadow(&self, remote: &RemoteLocation, owner_id: &str) -> Option<Location> {
        let mut location = Location::new(owner_id, remote.name.clone());
        location.remote_id = Some(remote.id.clone());
        location.description = remote.description.clone();
        location.sync_state = SyncState::Synced;
        location.last_modified = Utc::now();
        Some(location)
    }

    fn payload(&self, local: &Location) -> StorageResult<Readiness<LocationPayload>> {
        Ok(Readiness::Ready(LocationPayload {
            name: local.name.clone(),
            description: local.description.clone(),
        }))
    }
}

/// Items resolve their location through remote ids in both directions
pub struct ItemStrategy<'a, S> {
    store: &'a S,
    /// Remote location id to local location id
    locations: HashMap<String, Uuid>,
}

impl<'a, S: LocalStore<Location>> ItemStrategy<'a, S> {
    /// Index the owner's active locations by remote id
    ///
    /// Build this after locations have been reconciled so locations
    /// discovered or pushed in the same run resolve.
    pub fn build(store: &'a S, owner_id: &str) -> StorageResult<Self> {
        let locations = LocalStore::<Location>::list_active(store, owner_id)?
            .into_iter()
            .filter_map(|l| l.remote_id().map(|id| (id.to_string(), l.local_id)))
            .collect();
        Ok(Self { store, locations })
    }

    /// Local location id for a remote location id
    pub fn resolve(&self, remote_location_id: &str) -> Option<Uuid> {
        self.locations.get(remote_location_id).copied()
    }
}

impl<S: LocalStore<Location>> ReconcileStrategy<StorageItem> for ItemStrategy<'_, S> {
    fn shadow(&self, remote: &RemoteItem, owner_id: &str) -> Option<StorageItem> {
        let location_local_id = self.resolve(&remote.location_id)?;

        let mut item = StorageItem::new(owner_id, location_local_id, remote.name.clone());
        item.remote_id = Some(remote.id.clone());
        item.brand = remote.brand.clone();
        item.size = remote.size.clone();
        item.nutritional_info = remote.nutritional_info.clone();
        item.date_purchased = remote.date_purchased.clone();
        item.expiration_date = remote.expiration_date.clone();
        item.ingredients = remote.ingredients.clone();
        item.other_info = remote.other_info.clone();
        item.sync_state = SyncState::Synced;
        Some(item)
    }

    fn payload(&self, local: &StorageItem) -> StorageResult<Readiness<ItemPayload>> {
        let location = LocalStore::<Location>::get(self.store, local.location_local_id)?;
        let Some(location) = location else {
            return Ok(Readiness::Deferred("location missing"));
        };
        let Some(location_id) = location.remote_id() else {
            return Ok(Readiness::Deferred("location not yet pushed"));
        };

        Ok(Readiness::Ready(ItemPayload {
            name: local.name.clone(),
            brand: local.brand.clone(),
            size: local.size.clone(),
            nutritional_info: local.nutritional_info.clone(),
            date_purchased: local.date_purchased.clone(),
            expiration_date: local.expiration_date.clone(),
            ingredients: local.ingredients.clone(),
            other_info: local.other_info.clone(),
            location_id: location_id.to_string(),
        }))
    }
}

/// Upload and download counts for one kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindCounters {
    /// Pending records found at the start of phase B, skipped ones included
    pub uploaded: usize,
    /// Size of the remote collection listed in phase A
    pub downloaded: usize,
}

/// Reconciles one kind at a time for one user
pub struct EntityReconciler<'a, S, C> {
    store: &'a S,
    remote: &'a C,
    token: &'a BearerToken,
    owner_id: &'a str,
    cancel: &'a CancelToken,
}

impl<'a, S, C> EntityReconciler<'a, S, C> {
    pub fn new(
        store: &'a S,
        remote: &'a C,
        token: &'a BearerToken,
        owner_id: &'a str,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            store,
            remote,
            token,
            owner_id,
            cancel,
        }
    }

    /// Run both phases for kind `R`
    ///
    /// `counters` is filled in as each phase learns its count, so it is
    /// meaningful even when this returns an error.
    pub async fn reconcile<R, G>(&self, strategy: &G, counters: &mut KindCounters) -> SyncResult<()>
    where
        R: SyncRecord,
        S: LocalStore<R>,
        C: RemoteCollection<R::Remote>,
        G: ReconcileStrategy<R>,
    {
        self.download::<R, G>(strategy, counters).await?;
        self.upload::<R, G>(strategy, counters).await?;
        info!(
            "Reconciled {}s: {} uploaded, {} downloaded",
            R::KIND,
            counters.uploaded,
            counters.downloaded
        );
        Ok(())
    }

    async fn download<R, G>(&self, strategy: &G, counters: &mut KindCounters) -> SyncResult<()>
    where
        R: SyncRecord,
        S: LocalStore<R>,
        C: RemoteCollection<R::Remote>,
        G: ReconcileStrategy<R>,
    {
        self.cancel.check()?;
        let remote_records =
            RemoteCollection::<R::Remote>::list_all(self.remote, self.token).await?;
        counters.downloaded = remote_records.len();
        debug!("Listed {} remote {}s", remote_records.len(), R::KIND);

        let mut index = self.local_index::<R>()?;

        for remote in &remote_records {
            let remote_id = remote.remote_id();
            if remote_id.is_empty() {
                warn!("Ignoring remote {} without an id", R::KIND);
                continue;
            }

            match index.get(remote_id) {
                None => {
                    let Some(mut shadow) = strategy.shadow(remote, self.owner_id) else {
                        debug!(
                            "Skipping remote {} {}: its location is not known locally",
                            R::KIND,
                            remote_id
                        );
                        continue;
                    };
                    LocalStore::<R>::upsert(self.store, &mut shadow, SyncState::Synced)?;
                    debug!(
                        "Discovered remote {} {} as {}",
                        R::KIND,
                        remote_id,
                        shadow.local_id()
                    );
                    index.insert(remote_id.to_string(), shadow);
                }
                Some(local) if local.sync_state() == SyncState::Pending && !local.is_tombstoned() => {
                    // Local wins; remote field values are dropped
                    self.settle::<R>(local.local_id(), Some(remote_id))?;
                    info!(
                        "Conflict on {} {}: kept local copy {}",
                        R::KIND,
                        remote_id,
                        local.local_id()
                    );
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    /// Remote id to local record over active and pending records
    fn local_index<R>(&self) -> SyncResult<HashMap<String, R>>
    where
        R: SyncRecord,
        S: LocalStore<R>,
    {
        let active = LocalStore::<R>::list_active(self.store, self.owner_id)?;
        let pending = LocalStore::<R>::list_pending(self.store, self.owner_id)?;

        let mut index = HashMap::with_capacity(active.len() + pending.len());
        for record in pending.into_iter().chain(active) {
            if let Some(remote_id) = record.remote_id().map(str::to_string) {
                index.entry(remote_id).or_insert(record);
            }
        }
        Ok(index)
    }

    async fn upload<R, G>(&self, strategy: &G, counters: &mut KindCounters) -> SyncResult<()>
    where
        R: SyncRecord,
        S: LocalStore<R>,
        C: RemoteCollection<R::Remote>,
        G: ReconcileStrategy<R>,
    {
        let pending = LocalStore::<R>::list_pending(self.store, self.owner_id)?;
        counters.uploaded = pending.len();
        debug!("{} pending {}s to upload", pending.len(), R::KIND);

        for record in pending {
            let local_id = record.local_id();

            if record.is_tombstoned() {
                if let Some(remote_id) = record.remote_id() {
                    self.cancel.check()?;
                    self.push_delete::<R>(local_id, remote_id).await;
                }
                self.settle::<R>(local_id, None)?;
                continue;
            }

            let payload = match strategy.payload(&record)? {
                Readiness::Ready(payload) => payload,
                Readiness::Deferred(reason) => {
                    debug!("Deferring {} {}: {}", R::KIND, local_id, reason);
                    continue;
                }
            };

            self.cancel.check()?;
            match record.remote_id() {
                None => {
                    let created =
                        RemoteCollection::<R::Remote>::create(self.remote, self.token, &payload)
                            .await
                            .map_err(|e| upload_failed::<R>(local_id, e))?;
                    let remote_id = created.remote_id();
                    if remote_id.is_empty() {
                        return Err(SyncError::transport(format!(
                            "server returned a {} without an id",
                            R::KIND
                        )));
                    }
                    self.settle::<R>(local_id, Some(remote_id))?;
                    debug!("Created remote {} {} for {}", R::KIND, remote_id, local_id);
                }
                Some(remote_id) => {
                    RemoteCollection::<R::Remote>::update(
                        self.remote,
                        self.token,
                        remote_id,
                        &payload,
                    )
                    .await
                    .map_err(|e| upload_failed::<R>(local_id, e))?;
                    self.settle::<R>(local_id, None)?;
                    debug!("Updated remote {} {}", R::KIND, remote_id);
                }
            }
        }

        Ok(())
    }

    /// Mark a record synced; a record that vanished meanwhile is skipped
    fn settle<R>(&self, local_id: Uuid, remote_id: Option<&str>) -> SyncResult<()>
    where
        R: SyncRecord,
        S: LocalStore<R>,
    {
        if !LocalStore::<R>::mark_synced(self.store, local_id, remote_id)? {
            let missing = SyncError::NotFound(format!("{} {}", R::KIND, local_id));
            debug!("Ignoring {}", missing);
        }
        Ok(())
    }

    /// Best-effort remote delete; the outcome never stops the phase
    async fn push_delete<R>(&self, local_id: Uuid, remote_id: &str)
    where
        R: SyncRecord,
        C: RemoteCollection<R::Remote>,
    {
        match RemoteCollection::<R::Remote>::delete(self.remote, self.token, remote_id).await {
            Ok(true) => debug!("Deleted remote {} {}", R::KIND, remote_id),
            Ok(false) => warn!(
                "Server refused delete of {} {} (local {}); marking synced anyway",
                R::KIND,
                remote_id,
                local_id
            ),
            Err(e) => warn!(
                "Delete of {} {} failed: {}; marking synced anyway",
                R::KIND,
                remote_id,
                e
            ),
        }
    }
}

fn upload_failed<R: SyncRecord>(local_id: Uuid, err: SyncError) -> SyncError {
    warn!("Upload of {} {} failed: {}", R::KIND, local_id, err);
    err
}
