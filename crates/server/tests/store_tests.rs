//! SeaOrmStore against SQLite.

mod common;

use common::{sqlite_store, valid_request};
use mail_relay::error::StoreError;
use mail_relay::model::{
    DEFAULT_STATUS_COLLECTION, DeliveryStatus, NewEmailRequest, NewStatusRecord, RequestProfile,
    RequestUpdate,
};
use mail_relay::store::{self, DocumentStore};
use serde_json::{Map, Value, json};
use time::{Duration, OffsetDateTime};

#[tokio::test]
async fn create_and_get_round_trips_fields() {
    let store = sqlite_store().await;
    let mut extra = Map::new();
    extra.insert("userId".into(), json!("u-1"));
    extra.insert("tags".into(), json!(["otp", "login"]));
    let body = NewEmailRequest {
        html: true,
        priority: Some("low".into()),
        request_id: Some("caller-1".into()),
        confirm_path: Some("custom_status".into()),
        extra,
        ..valid_request()
    };

    let created = store.create_request(RequestProfile::Full, body).await.unwrap();
    let loaded = store
        .get_request(RequestProfile::Full, &created.id)
        .await
        .unwrap()
        .expect("stored");

    assert_eq!(loaded.id, created.id);
    assert_eq!(loaded.to.as_deref(), Some("a@b.com"));
    assert_eq!(loaded.subject.as_deref(), Some("Hi"));
    assert_eq!(loaded.message.as_deref(), Some("Body"));
    assert!(loaded.html);
    assert_eq!(loaded.priority.as_deref(), Some("low"));
    assert_eq!(loaded.request_id.as_deref(), Some("caller-1"));
    assert_eq!(loaded.confirm_path.as_deref(), Some("custom_status"));
    assert_eq!(
        loaded.metadata,
        Some(json!({ "userId": "u-1", "tags": ["otp", "login"] }))
    );
    assert_eq!(loaded.status, None);
    assert!(!loaded.processed);
}

#[tokio::test]
async fn collections_are_separate() {
    let store = sqlite_store().await;
    let direct = store
        .create_request(RequestProfile::Direct, valid_request())
        .await
        .unwrap();

    assert!(
        store
            .get_request(RequestProfile::Full, &direct.id)
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        store
            .get_request(RequestProfile::Direct, &direct.id)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn documents_are_claimed_once() {
    let store = sqlite_store().await;
    for _ in 0..3 {
        store
            .create_request(RequestProfile::Full, valid_request())
            .await
            .unwrap();
    }
    store
        .create_request(RequestProfile::Direct, valid_request())
        .await
        .unwrap();

    let first = store
        .claim_new_requests(RequestProfile::Full, 2)
        .await
        .unwrap();
    assert_eq!(first.len(), 2);
    let second = store
        .claim_new_requests(RequestProfile::Full, 10)
        .await
        .unwrap();
    assert_eq!(second.len(), 1);
    assert!(first.iter().all(|r| r.id != second[0].id));
    assert!(
        store
            .claim_new_requests(RequestProfile::Full, 10)
            .await
            .unwrap()
            .is_empty()
    );

    let direct = store
        .claim_new_requests(RequestProfile::Direct, 10)
        .await
        .unwrap();
    assert_eq!(direct.len(), 1);
    assert_eq!(direct[0].profile, RequestProfile::Direct);
}

#[tokio::test]
async fn update_only_touches_given_fields() {
    let store = sqlite_store().await;
    let request = store
        .create_request(RequestProfile::Full, valid_request())
        .await
        .unwrap();

    let now = OffsetDateTime::now_utc();
    store
        .update_request(&request.id, &RequestUpdate::processing(now))
        .await
        .unwrap();
    store
        .update_request(&request.id, &RequestUpdate::delivered("<m@example.com>", now))
        .await
        .unwrap();

    let doc = store
        .get_request(RequestProfile::Full, &request.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.status.as_deref(), Some("delivered"));
    assert!(doc.processing);
    assert!(doc.processed);
    assert!(doc.processing_start.is_some());
    assert_eq!(doc.email_id.as_deref(), Some("<m@example.com>"));
    assert_eq!(doc.subject.as_deref(), Some("Hi"));
}

#[tokio::test]
async fn updating_unknown_document_is_not_found() {
    let store = sqlite_store().await;
    let result = store
        .update_request(
            "nope",
            &RequestUpdate::failed("x", OffsetDateTime::now_utc()),
        )
        .await;
    assert!(matches!(result, Err(StoreError::NotFound(id)) if id == "nope"));
}

#[tokio::test]
async fn latest_status_is_most_recent_record() {
    let store = sqlite_store().await;
    let request = store
        .create_request(RequestProfile::Full, valid_request())
        .await
        .unwrap();

    for (status, details) in [
        (DeliveryStatus::Processing, json!({ "from": "relay@example.com" })),
        (DeliveryStatus::Delivered, json!({ "messageId": "<m@example.com>" })),
    ] {
        store
            .append_status(NewStatusRecord::for_request(&request, status, details))
            .await
            .unwrap();
    }

    let latest = store
        .latest_status(DEFAULT_STATUS_COLLECTION, &request.id)
        .await
        .unwrap()
        .expect("record");
    assert_eq!(latest.status, "delivered");
    assert!(latest.delivered);
    assert_eq!(latest.details, Some(json!({ "messageId": "<m@example.com>" })));
    assert!(
        store
            .latest_status("other_collection", &request.id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn string_details_survive_storage() {
    let store = sqlite_store().await;
    let request = store
        .create_request(RequestProfile::Full, NewEmailRequest::default())
        .await
        .unwrap();
    store
        .append_status(NewStatusRecord::for_request(
            &request,
            DeliveryStatus::Failed,
            Value::String("Missing required fields".into()),
        ))
        .await
        .unwrap();

    let record = store
        .latest_status(DEFAULT_STATUS_COLLECTION, &request.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.details, Some(json!("Missing required fields")));
    assert!(!record.delivered);
}

#[tokio::test]
async fn stuck_requests_respect_cutoff() {
    let store = sqlite_store().await;
    let old = store
        .create_request(RequestProfile::Full, valid_request())
        .await
        .unwrap();
    let fresh = store
        .create_request(RequestProfile::Full, valid_request())
        .await
        .unwrap();
    let done = store
        .create_request(RequestProfile::Full, valid_request())
        .await
        .unwrap();

    let now = OffsetDateTime::now_utc();
    store
        .update_request(&old.id, &RequestUpdate::processing(now - Duration::hours(1)))
        .await
        .unwrap();
    store
        .update_request(&fresh.id, &RequestUpdate::processing(now))
        .await
        .unwrap();
    store
        .update_request(&done.id, &RequestUpdate::processing(now - Duration::hours(1)))
        .await
        .unwrap();
    store
        .update_request(&done.id, &RequestUpdate::delivered("<d@example.com>", now))
        .await
        .unwrap();

    let stuck = store
        .stuck_requests(now - Duration::minutes(10))
        .await
        .unwrap();
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0].id, old.id);
}

#[tokio::test]
async fn memory_url_selects_memory_store() {
    let store = store::connect("memory:").await.unwrap();
    let request = store
        .create_request(RequestProfile::Direct, valid_request())
        .await
        .unwrap();
    assert!(
        store
            .get_request(RequestProfile::Direct, &request.id)
            .await
            .unwrap()
            .is_some()
    );
}
