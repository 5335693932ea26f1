use super::DocumentStore;
use crate::error::StoreError;
use crate::model::{
    DeliveryStatus, DeliveryStatusRecord, EmailRequest, NewEmailRequest, NewStatusRecord,
    RequestProfile, RequestUpdate,
};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use std::sync::Mutex;
use time::OffsetDateTime;
use uuid::Uuid;

/// A write observed by a [`MemoryStore`], in the order it happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreEvent {
    RequestUpdated {
        id: String,
        status: Option<DeliveryStatus>,
    },
    StatusAppended {
        email_id: String,
        status: DeliveryStatus,
    },
}

/// In-memory document store using `DashMap`. Suitable for development and testing.
///
/// Status records live in a single append-only vector, so insertion order is
/// also timestamp order.
#[derive(Default)]
pub struct MemoryStore {
    requests: DashMap<String, EmailRequest>,
    claims: DashMap<String, OffsetDateTime>,
    records: Mutex<Vec<DeliveryStatusRecord>>,
    events: Mutex<Vec<StoreEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully formed document, bypassing intake. Useful for seeding.
    pub fn insert_request(&self, request: EmailRequest) {
        self.requests.insert(request.id.clone(), request);
    }

    /// Snapshot of every status record across all collections.
    pub fn records(&self) -> Vec<DeliveryStatusRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Records for one request, oldest first.
    pub fn records_for(&self, email_id: &str) -> Vec<DeliveryStatusRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.email_id == email_id)
            .collect()
    }

    pub fn events(&self) -> Vec<StoreEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn push_event(&self, event: StoreEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

fn apply_update(doc: &mut EmailRequest, update: &RequestUpdate) {
    if let Some(status) = update.status {
        doc.status = Some(status.as_str().to_string());
    }
    if let Some(processing) = update.processing {
        doc.processing = processing;
    }
    if let Some(start) = update.processing_start {
        doc.processing_start = Some(start);
    }
    if let Some(processed) = update.processed {
        doc.processed = processed;
    }
    if let Some(email_id) = &update.email_id {
        doc.email_id = Some(email_id.clone());
    }
    if let Some(processed_at) = update.processed_at {
        doc.processed_at = Some(processed_at);
    }
    if let Some(error) = &update.error {
        doc.error = Some(error.clone());
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_request(
        &self,
        profile: RequestProfile,
        request: NewEmailRequest,
    ) -> Result<EmailRequest, StoreError> {
        let doc = EmailRequest {
            id: Uuid::new_v4().to_string(),
            profile,
            to: request.to,
            subject: request.subject,
            message: request.message,
            html: request.html,
            priority: request.priority,
            request_id: request.request_id,
            confirm_path: request.confirm_path,
            metadata: (!request.extra.is_empty()).then(|| Value::Object(request.extra)),
            created_at: OffsetDateTime::now_utc(),
            processing: false,
            processing_start: None,
            processed: false,
            status: None,
            email_id: None,
            processed_at: None,
            error: None,
        };
        self.requests.insert(doc.id.clone(), doc.clone());
        Ok(doc)
    }

    async fn get_request(
        &self,
        profile: RequestProfile,
        id: &str,
    ) -> Result<Option<EmailRequest>, StoreError> {
        Ok(self
            .requests
            .get(id)
            .map(|r| r.value().clone())
            .filter(|r| r.profile == profile))
    }

    async fn claim_new_requests(
        &self,
        profile: RequestProfile,
        limit: u64,
    ) -> Result<Vec<EmailRequest>, StoreError> {
        // Ids of claimed documents are tracked separately from the document so
        // a claim never looks like a dispatcher write.
        let mut candidates: Vec<(OffsetDateTime, String)> = self
            .requests
            .iter()
            .filter(|r| r.profile == profile)
            .map(|r| (r.created_at, r.id.clone()))
            .collect();
        candidates.sort();

        let now = OffsetDateTime::now_utc();
        let mut claimed = Vec::new();
        for (_, id) in candidates {
            if claimed.len() as u64 >= limit {
                break;
            }
            if let Some(doc) = self.requests.get(&id) {
                if let Entry::Vacant(slot) = self.claims.entry(id.clone()) {
                    slot.insert(now);
                    claimed.push(doc.value().clone());
                }
            }
        }
        Ok(claimed)
    }

    async fn update_request(&self, id: &str, update: &RequestUpdate) -> Result<(), StoreError> {
        let mut doc = self
            .requests
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        apply_update(&mut doc, update);
        drop(doc);
        self.push_event(StoreEvent::RequestUpdated {
            id: id.to_string(),
            status: update.status,
        });
        Ok(())
    }

    async fn update_unfinished_request(
        &self,
        id: &str,
        update: &RequestUpdate,
    ) -> Result<bool, StoreError> {
        let Some(mut doc) = self.requests.get_mut(id) else {
            return Ok(false);
        };
        let unfinished = !doc.processed
            && doc
                .status
                .as_deref()
                .is_none_or(|s| s == DeliveryStatus::Processing.as_str());
        if !unfinished {
            return Ok(false);
        }
        apply_update(&mut doc, update);
        drop(doc);
        self.push_event(StoreEvent::RequestUpdated {
            id: id.to_string(),
            status: update.status,
        });
        Ok(true)
    }

    async fn append_status(
        &self,
        record: NewStatusRecord,
    ) -> Result<DeliveryStatusRecord, StoreError> {
        let delivered = record.delivered();
        let status = record.status;
        let stored = {
            let mut records = self
                .records
                .lock()
                .map_err(|_| StoreError::Unavailable("status log lock poisoned".into()))?;
            let stored = DeliveryStatusRecord {
                id: records.len() as i64 + 1,
                collection: record.collection,
                email_id: record.email_id,
                request_id: record.request_id,
                delivered,
                status: status.as_str().to_string(),
                details: match record.details {
                    Value::Null => None,
                    details => Some(details),
                },
                timestamp: OffsetDateTime::now_utc(),
            };
            records.push(stored.clone());
            stored
        };
        self.push_event(StoreEvent::StatusAppended {
            email_id: stored.email_id.clone(),
            status,
        });
        Ok(stored)
    }

    async fn latest_status(
        &self,
        collection: &str,
        email_id: &str,
    ) -> Result<Option<DeliveryStatusRecord>, StoreError> {
        Ok(self
            .records()
            .into_iter()
            .rev()
            .find(|r| r.collection == collection && r.email_id == email_id))
    }

    async fn stuck_requests(
        &self,
        started_before: OffsetDateTime,
    ) -> Result<Vec<EmailRequest>, StoreError> {
        let mut stuck: Vec<EmailRequest> = self
            .requests
            .iter()
            .filter(|r| {
                if r.processed {
                    return false;
                }
                match r.status.as_deref() {
                    Some(status) => {
                        status == DeliveryStatus::Processing.as_str()
                            && r.processing_start.is_some_and(|s| s < started_before)
                    }
                    None => self
                        .claims
                        .get(&r.id)
                        .is_some_and(|claimed_at| *claimed_at < started_before),
                }
            })
            .map(|r| r.value().clone())
            .collect();
        stuck.sort_by_key(|r| r.created_at);
        Ok(stuck)
    }
}
