//! Fires the dispatcher once for every newly created request document.

use super::{DispatchOutcome, Dispatcher};
use crate::config::DispatcherConfig;
use crate::model::{EmailRequest, RequestProfile};
use crate::store::DocumentStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Polls both request collections for unclaimed documents and hands each one
/// to the [`Dispatcher`]. Claiming is atomic in the store, so several watchers
/// may run against one database without double sends.
pub struct TriggerWatcher {
    store: Arc<dyn DocumentStore>,
    dispatcher: Arc<Dispatcher>,
    config: DispatcherConfig,
}

/// Handle to a spawned watcher loop.
pub struct WatcherHandle {
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    /// Stop claiming new documents. Dispatches already started run to the end.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl TriggerWatcher {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        dispatcher: Arc<Dispatcher>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            config,
        }
    }

    async fn claim(&self) -> Vec<EmailRequest> {
        let mut claimed = Vec::new();
        for profile in RequestProfile::ALL {
            match self
                .store
                .claim_new_requests(profile, self.config.batch_size)
                .await
            {
                Ok(batch) => claimed.extend(batch),
                Err(e) => tracing::error!(
                    name = "trigger.claim_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    collection = profile.collection(),
                    error = %e,
                    message = "Failed to claim new requests"
                ),
            }
        }
        claimed
    }

    /// Claim one batch and dispatch it to completion. Returns the outcomes in
    /// claim order; `None` marks a dispatch that hit the timeout.
    #[tracing::instrument(skip(self))]
    pub async fn poll_once(&self) -> Vec<Option<DispatchOutcome>> {
        let claimed = self.claim().await;
        let timeout = self.config.timeout();
        futures::future::join_all(
            claimed
                .into_iter()
                .map(|request| run_dispatch(self.dispatcher.clone(), timeout, request)),
        )
        .await
    }

    /// Run the watcher loop on the Tokio runtime. Each claimed request is
    /// dispatched on its own task so a slow relay never delays the next poll.
    pub fn spawn(self) -> WatcherHandle {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let task = tokio::spawn(async move {
            tracing::info!(
                name = "trigger.started",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                poll_interval_ms = self.config.poll_interval_ms,
                batch_size = self.config.batch_size,
                message = "Request trigger watcher started"
            );
            let timeout = self.config.timeout();
            let mut interval = tokio::time::interval(self.config.poll_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            while flag.load(Ordering::SeqCst) {
                interval.tick().await;
                for request in self.claim().await {
                    tokio::spawn(run_dispatch(self.dispatcher.clone(), timeout, request));
                }
            }
        });
        WatcherHandle { running, task }
    }
}

/// Dispatch `request` under `timeout`. A timed out dispatch is abandoned where
/// it stands; the reconcile sweep picks it up later.
pub async fn run_dispatch(
    dispatcher: Arc<Dispatcher>,
    timeout: Duration,
    request: EmailRequest,
) -> Option<DispatchOutcome> {
    match tokio::time::timeout(timeout, dispatcher.dispatch(&request)).await {
        Ok(outcome) => Some(outcome),
        Err(_) => {
            tracing::error!(
                name = "trigger.dispatch_timed_out",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                email_id = %request.id,
                timeout_secs = timeout.as_secs(),
                message = "Dispatch timed out"
            );
            None
        }
    }
}
