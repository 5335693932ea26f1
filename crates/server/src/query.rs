//! Best-known delivery status for a request id.

use crate::error::StoreError;
use crate::model::{
    DEFAULT_STATUS_COLLECTION, DeliveryStatusRecord, EmailRequest, RequestProfile,
};
use crate::store::DocumentStore;
use serde::Serialize;
use serde_json::{Value, json};
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Where the answer to a delivery lookup came from.
#[derive(Clone, Debug, PartialEq)]
pub enum DeliveryLookup {
    Record(DeliveryStatusRecord),
    Request(EmailRequest),
    NotFound,
}

/// Look `email_id` up in the status log first, then in the full and direct
/// request collections.
#[tracing::instrument(skip(store))]
pub async fn lookup_delivery(
    store: &dyn DocumentStore,
    email_id: &str,
) -> Result<DeliveryLookup, StoreError> {
    if let Some(record) = store
        .latest_status(DEFAULT_STATUS_COLLECTION, email_id)
        .await?
    {
        return Ok(DeliveryLookup::Record(record));
    }
    for profile in RequestProfile::ALL {
        if let Some(request) = store.get_request(profile, email_id).await? {
            return Ok(DeliveryLookup::Request(request));
        }
    }
    Ok(DeliveryLookup::NotFound)
}

/// Body of the delivery polling endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct DeliveryStatusResponse {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub timestamp: Option<OffsetDateTime>,
    /// Present when the answer came from a status record.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<Value>,
    /// `email_request` or `direct_request` when the answer came from a request
    /// document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl DeliveryStatusResponse {
    pub fn not_found() -> Self {
        Self {
            found: false,
            delivered: None,
            status: None,
            timestamp: None,
            details: None,
            source: None,
        }
    }
}

impl From<DeliveryLookup> for DeliveryStatusResponse {
    fn from(lookup: DeliveryLookup) -> Self {
        match lookup {
            DeliveryLookup::Record(record) => Self {
                found: true,
                delivered: Some(record.delivered),
                status: Some(record.status),
                timestamp: Some(record.timestamp),
                details: Some(record.details.unwrap_or_else(|| json!({}))),
                source: None,
            },
            DeliveryLookup::Request(request) => Self {
                found: true,
                delivered: Some(request.status.as_deref() == Some("delivered")),
                status: Some(request.status.unwrap_or_else(|| "unknown".to_string())),
                timestamp: request.processed_at,
                details: None,
                source: Some(request.profile.source_label().to_string()),
            },
            DeliveryLookup::NotFound => Self::not_found(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeliveryStatus, NewEmailRequest, NewStatusRecord, RequestUpdate};
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn record_wins_over_request_document() {
        let store = MemoryStore::new();
        let request = store
            .create_request(RequestProfile::Full, NewEmailRequest::default())
            .await
            .unwrap();
        store
            .update_request(
                &request.id,
                &RequestUpdate::failed("smtp down", OffsetDateTime::now_utc()),
            )
            .await
            .unwrap();
        store
            .append_status(NewStatusRecord::for_request(
                &request,
                DeliveryStatus::Delivered,
                json!({ "messageId": "<x@example.com>" }),
            ))
            .await
            .unwrap();

        let response = DeliveryStatusResponse::from(
            lookup_delivery(&store, &request.id).await.unwrap(),
        );
        assert!(response.found);
        assert_eq!(response.delivered, Some(true));
        assert_eq!(response.status.as_deref(), Some("delivered"));
        assert_eq!(response.source, None);
    }

    #[tokio::test]
    async fn falls_back_to_direct_request() {
        let store = MemoryStore::new();
        let request = store
            .create_request(RequestProfile::Direct, NewEmailRequest::default())
            .await
            .unwrap();

        let response = DeliveryStatusResponse::from(
            lookup_delivery(&store, &request.id).await.unwrap(),
        );
        assert!(response.found);
        assert_eq!(response.delivered, Some(false));
        assert_eq!(response.status.as_deref(), Some("unknown"));
        assert_eq!(response.source.as_deref(), Some("direct_request"));
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let store = MemoryStore::new();
        let lookup = lookup_delivery(&store, "missing").await.unwrap();
        assert_eq!(lookup, DeliveryLookup::NotFound);
        let body = serde_json::to_value(DeliveryStatusResponse::from(lookup)).unwrap();
        assert_eq!(body, json!({ "found": false }));
    }
}
