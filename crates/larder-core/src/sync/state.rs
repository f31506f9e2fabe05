//! Run state for the sync orchestrator

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use super::error::{SyncError, SyncResult};

/// Whether a sync run is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    Running,
}

/// Cooperative cancellation for a sync run
///
/// Cancelling never rolls anything back; the run stops before its next
/// remote call and records already reconciled keep their state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called
    pub fn check(&self) -> SyncResult<()> {
        if self.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Single-flight guard; publishes `Running` while held and `Idle` on drop
pub(crate) struct RunGuard<'a> {
    running: &'a AtomicBool,
    status: &'a watch::Sender<SyncStatus>,
}

impl<'a> RunGuard<'a> {
    /// Returns `None` if another run already holds the guard
    pub(crate) fn acquire(
        running: &'a AtomicBool,
        status: &'a watch::Sender<SyncStatus>,
    ) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        status.send_replace(SyncStatus::Running);
        Some(Self { running, status })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.status.send_replace(SyncStatus::Idle);
    }
}
