//! Sync orchestration
//!
//! One run checks authentication and connectivity, then reconciles
//! locations followed by items. Items resolve their location through remote
//! ids, so the order is fixed.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use super::error::{SyncError, SyncResult};
use super::reconciler::{EntityReconciler, ItemStrategy, KindCounters, LocationStrategy};
use super::state::{CancelToken, RunGuard, SyncStatus};
use crate::models::{Location, StorageItem};
use crate::remote::{BearerToken, RemoteCollection, RemoteItem, RemoteLocation};
use crate::storage::{LocalStore, UserStore};

/// Result of one sync run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub success: bool,
    pub message: String,
    pub locations_uploaded: usize,
    pub locations_downloaded: usize,
    pub items_uploaded: usize,
    pub items_downloaded: usize,
}

impl SyncOutcome {
    fn failed(err: &SyncError) -> Self {
        Self {
            message: failure_message(err),
            ..Self::default()
        }
    }

    /// Uploads across both kinds
    pub fn uploaded(&self) -> usize {
        self.locations_uploaded + self.items_uploaded
    }

    /// Downloads across both kinds
    pub fn downloaded(&self) -> usize {
        self.locations_downloaded + self.items_downloaded
    }

    fn record_locations(&mut self, counters: KindCounters) {
        self.locations_uploaded = counters.uploaded;
        self.locations_downloaded = counters.downloaded;
    }

    fn record_items(&mut self, counters: KindCounters) {
        self.items_uploaded = counters.uploaded;
        self.items_downloaded = counters.downloaded;
    }
}

fn failure_message(err: &SyncError) -> String {
    match err {
        SyncError::NotAuthenticated
        | SyncError::Unreachable
        | SyncError::Cancelled
        | SyncError::AlreadyRunning => err.to_string(),
        other => format!("Sync failed: {}", other),
    }
}

/// Runs reconciliation for the logged-in user, one run at a time
pub struct SyncOrchestrator<S, C> {
    store: Arc<S>,
    remote: Arc<C>,
    running: AtomicBool,
    status: watch::Sender<SyncStatus>,
    status_rx: watch::Receiver<SyncStatus>,
}

impl<S, C> SyncOrchestrator<S, C>
where
    S: LocalStore<Location> + LocalStore<StorageItem> + UserStore,
    C: RemoteCollection<RemoteLocation> + RemoteCollection<RemoteItem>,
{
    pub fn new(store: Arc<S>, remote: Arc<C>) -> Self {
        let (status, status_rx) = watch::channel(SyncStatus::Idle);
        Self {
            store,
            remote,
            running: AtomicBool::new(false),
            status,
            status_rx,
        }
    }

    /// Get the current status
    pub fn status(&self) -> SyncStatus {
        *self.status_rx.borrow()
    }

    /// Subscribe to status changes
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status_rx.clone()
    }

    /// Sync `owner_id`, who must be the logged-in user
    pub async fn run_sync(&self, owner_id: &str) -> SyncOutcome {
        self.run_sync_cancellable(owner_id, &CancelToken::new())
            .await
    }

    /// Sync whoever is logged in
    pub async fn run_sync_current(&self) -> SyncOutcome {
        match self.store.current_user() {
            Ok(Some(user)) => self.run_sync(&user.id).await,
            Ok(None) => SyncOutcome::failed(&SyncError::NotAuthenticated),
            Err(e) => SyncOutcome::failed(&e.into()),
        }
    }

    /// Sync `owner_id`, stopping before the next remote call once `cancel` fires
    pub async fn run_sync_cancellable(&self, owner_id: &str, cancel: &CancelToken) -> SyncOutcome {
        let Some(_guard) = RunGuard::acquire(&self.running, &self.status) else {
            warn!("Sync requested while another run is in progress");
            return SyncOutcome::failed(&SyncError::AlreadyRunning);
        };

        info!("Starting sync for {}", owner_id);
        let mut outcome = SyncOutcome::default();

        match self.execute(owner_id, cancel, &mut outcome).await {
            Ok(()) => {
                outcome.success = true;
                outcome.message = format!(
                    "Sync completed: {} uploaded, {} downloaded",
                    outcome.uploaded(),
                    outcome.downloaded()
                );
                info!("{}", outcome.message);
            }
            Err(e) => {
                outcome.success = false;
                outcome.message = failure_message(&e);
                warn!("Sync for {} ended: {}", owner_id, e);
            }
        }

        outcome
    }

    async fn execute(
        &self,
        owner_id: &str,
        cancel: &CancelToken,
        outcome: &mut SyncOutcome,
    ) -> SyncResult<()> {
        let token = self.authenticate(owner_id)?;

        cancel.check()?;
        if !self.remote.probe().await {
            return Err(SyncError::Unreachable);
        }

        let reconciler =
            EntityReconciler::new(&*self.store, &*self.remote, &token, owner_id, cancel);

        let mut counters = KindCounters::default();
        let result = reconciler
            .reconcile::<Location, _>(&LocationStrategy, &mut counters)
            .await;
        outcome.record_locations(counters);
        result?;

        let strategy = ItemStrategy::build(&*self.store, owner_id)?;
        let mut counters = KindCounters::default();
        let result = reconciler
            .reconcile::<StorageItem, _>(&strategy, &mut counters)
            .await;
        outcome.record_items(counters);
        result?;

        self.store.update_last_sync(owner_id, Utc::now())?;
        Ok(())
    }

    /// Credential of the logged-in user, who must be `owner_id`
    fn authenticate(&self, owner_id: &str) -> SyncResult<BearerToken> {
        let user = self
            .store
            .current_user()?
            .ok_or(SyncError::NotAuthenticated)?;
        if user.id != owner_id {
            return Err(SyncError::NotAuthenticated);
        }
        user.credential()
            .and_then(BearerToken::new)
            .ok_or(SyncError::NotAuthenticated)
    }
}
