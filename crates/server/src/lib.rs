//! Transactional email relay with an auditable delivery status log.
//!
//! Writers store email requests as documents; a trigger watcher hands every new
//! document to the dispatcher exactly once, which sends it over SMTP and records
//! each transition on the document and in an append-only status log. Clients
//! poll the status over HTTP.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::store::DocumentStore;
use crate::transport::MailTransport;

pub mod api;
pub mod config;
pub mod dispatch;
pub mod entity;
pub mod error;
pub mod model;
pub mod query;
pub mod store;
pub mod transport;

/// Long-lived handles shared by the HTTP layer and background tasks.
#[derive(Clone)]
pub struct AppResources {
    pub store: Arc<dyn DocumentStore>,
    pub mailer: Arc<dyn MailTransport>,
    pub config: Arc<AppConfig>,
}
