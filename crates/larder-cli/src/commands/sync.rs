//! Sync command

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use larder_core::{CancelToken, Config, HttpRemoteClient, SqliteStore, SyncOrchestrator};

use super::require_user;
use crate::output::Output;

/// Reconcile local records with the remote service
///
/// Ctrl-C cancels the run before its next remote call. Fails when the run
/// does not complete.
pub async fn run(store: Arc<SqliteStore>, config: &Config, output: &Output) -> Result<()> {
    let user = require_user(&store)?;
    let remote = HttpRemoteClient::from_config(config).context("Failed to create HTTP client")?;

    output.message(&format!("Syncing with {}...", remote.base_url()));

    let orchestrator = SyncOrchestrator::new(store, Arc::new(remote));

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling sync");
            trigger.cancel();
        }
    });

    let outcome = orchestrator.run_sync_cancellable(&user.id, &cancel).await;
    ctrl_c.abort();

    output.print_outcome(&outcome);

    if !outcome.success {
        bail!("{}", outcome.message);
    }
    Ok(())
}
