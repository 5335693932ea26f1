//! Durable storage for request documents and the delivery status log.
//!
//! - `database` - sea-orm backed store (Postgres or SQLite)
//! - `memory` - in-process store for development and tests

pub mod database;
pub mod memory;

pub use database::SeaOrmStore;
pub use memory::{MemoryStore, StoreEvent};

use crate::error::StoreError;
use crate::model::{
    DeliveryStatusRecord, EmailRequest, NewEmailRequest, NewStatusRecord, RequestProfile,
    RequestUpdate,
};
use async_trait::async_trait;
use sea_orm::Database;
use std::sync::Arc;
use time::OffsetDateTime;

/// Connection URL prefix selecting [`MemoryStore`].
pub const MEMORY_URL_PREFIX: &str = "memory:";

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist a new request document. This is the whole of intake: nothing is
    /// validated here.
    async fn create_request(
        &self,
        profile: RequestProfile,
        request: NewEmailRequest,
    ) -> Result<EmailRequest, StoreError>;

    async fn get_request(
        &self,
        profile: RequestProfile,
        id: &str,
    ) -> Result<Option<EmailRequest>, StoreError>;

    /// Claim up to `limit` documents of `profile` that no trigger has fired for
    /// yet, oldest first. A document is returned by at most one call.
    async fn claim_new_requests(
        &self,
        profile: RequestProfile,
        limit: u64,
    ) -> Result<Vec<EmailRequest>, StoreError>;

    async fn update_request(&self, id: &str, update: &RequestUpdate) -> Result<(), StoreError>;

    /// Apply `update` only while the request is unfinished: not `processed`,
    /// and with no status or a `processing` status. Returns `false` when the
    /// document was left untouched.
    async fn update_unfinished_request(
        &self,
        id: &str,
        update: &RequestUpdate,
    ) -> Result<bool, StoreError>;

    async fn append_status(
        &self,
        record: NewStatusRecord,
    ) -> Result<DeliveryStatusRecord, StoreError>;

    /// Most recent record for `email_id` in `collection`.
    async fn latest_status(
        &self,
        collection: &str,
        email_id: &str,
    ) -> Result<Option<DeliveryStatusRecord>, StoreError>;

    /// Unfinished requests that should have finished by now: those still
    /// `processing` since before `started_before`, and those claimed before
    /// `started_before` that never recorded any status. Direct requests never
    /// enter `processing`, so a stalled one only shows up as the latter.
    async fn stuck_requests(
        &self,
        started_before: OffsetDateTime,
    ) -> Result<Vec<EmailRequest>, StoreError>;
}

/// Open the store named by `database_url`.
#[tracing::instrument(skip_all)]
pub async fn connect(database_url: &str) -> Result<Arc<dyn DocumentStore>, StoreError> {
    if database_url.starts_with(MEMORY_URL_PREFIX) {
        tracing::warn!(
            name = "store.connect.memory",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            message = "Using in-memory store; documents are lost on restart"
        );
        return Ok(Arc::new(MemoryStore::new()));
    }
    let db = Database::connect(database_url).await?;
    Ok(Arc::new(SeaOrmStore::new(Arc::new(db))))
}
