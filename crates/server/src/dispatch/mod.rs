//! Request dispatch.
//!
//! - `dispatcher` - validates a request, sends it and records each transition
//! - `trigger` - claims new request documents and fires the dispatcher
//! - `reconcile` - finds requests stuck in `processing`

pub mod dispatcher;
pub mod reconcile;
pub mod trigger;

pub use dispatcher::{DispatchOutcome, Dispatcher, ValidatedRequest, validate};
pub use reconcile::{STUCK_DISPATCH_ERROR, spawn_reconcile_task, sweep_stuck_requests};
pub use trigger::{TriggerWatcher, WatcherHandle, run_dispatch};
