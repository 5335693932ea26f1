//! Periodic sweep for requests left in `processing`.

use super::Dispatcher;
use crate::config::ReconcileConfig;
use crate::error::StoreError;
use crate::store::DocumentStore;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::task::JoinHandle;

/// Error recorded on requests the sweep moves to `failed`.
pub const STUCK_DISPATCH_ERROR: &str = "Dispatch timed out";

/// Report every request that entered `processing`, or was claimed without
/// ever recording a status, more than `config.stuck_after()` before `now`.
/// Fail them when `mark_failed` is on; a request that finishes in the
/// meantime is left alone. Returns how many were found.
#[tracing::instrument(skip(store, dispatcher, config))]
pub async fn sweep_stuck_requests(
    store: &dyn DocumentStore,
    dispatcher: &Dispatcher,
    config: &ReconcileConfig,
    now: OffsetDateTime,
) -> Result<usize, StoreError> {
    let cutoff = now - config.stuck_after();
    let stuck = store.stuck_requests(cutoff).await?;
    for request in &stuck {
        tracing::warn!(
            name = "reconcile.stuck_request",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            email_id = %request.id,
            collection = request.profile.collection(),
            processing_start = ?request.processing_start,
            mark_failed = config.mark_failed,
            message = "Request never finished dispatching"
        );
        if config.mark_failed {
            dispatcher.fail_stuck(request, STUCK_DISPATCH_ERROR).await;
        }
    }
    Ok(stuck.len())
}

/// Spawn the sweep loop. Returns `None` when reconciliation is disabled.
pub fn spawn_reconcile_task(
    store: Arc<dyn DocumentStore>,
    dispatcher: Arc<Dispatcher>,
    config: ReconcileConfig,
) -> Option<JoinHandle<()>> {
    if !config.enabled {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.interval());
        loop {
            interval.tick().await;
            match sweep_stuck_requests(
                store.as_ref(),
                &dispatcher,
                &config,
                OffsetDateTime::now_utc(),
            )
            .await
            {
                Ok(0) => {}
                Ok(found) => tracing::info!(
                    name = "reconcile.sweep_done",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    found,
                    message = "Reconcile sweep found stuck requests"
                ),
                Err(e) => tracing::warn!(
                    name = "reconcile.sweep_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    error = %e,
                    message = "Reconcile sweep failed"
                ),
            }
        }
    }))
}
