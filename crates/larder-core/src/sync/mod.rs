//! Offline-first reconciliation with the remote inventory service
//!
//! ## Flow
//!
//! 1. Check that a user is logged in with a credential.
//! 2. Probe the server.
//! 3. Reconcile locations, then items (download and merge, then upload).
//!
//! Conflicts resolve local-wins. Each run is single-flight and can be
//! cancelled between remote calls.
//!
//! ## Usage
//!
//! ```ignore
//! let orchestrator = SyncOrchestrator::new(store, remote);
//! let outcome = orchestrator.run_sync_current().await;
//! println!("{}", outcome.message);
//! ```

mod error;
mod orchestrator;
mod reconciler;
mod record;
mod state;

pub use error::{SyncError, SyncResult};
pub use orchestrator::{SyncOrchestrator, SyncOutcome};
pub use reconciler::{
    EntityReconciler, ItemStrategy, KindCounters, LocationStrategy, PayloadOf, Readiness,
    ReconcileStrategy,
};
pub use record::SyncRecord;
pub use state::{CancelToken, SyncStatus};
