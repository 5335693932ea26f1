use super::DocumentStore;
use crate::entity::{delivery_status, email_request};
use crate::error::StoreError;
use crate::model::{
    DeliveryStatus, DeliveryStatusRecord, EmailRequest, NewEmailRequest, NewStatusRecord,
    RequestProfile, RequestUpdate,
};
use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, Condition,
    DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde_json::Value;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

/// Document store on top of a sea-orm connection.
#[derive(Clone, Debug)]
pub struct SeaOrmStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }
}

fn parse_json(id: &str, column: &str, text: Option<String>) -> Result<Option<Value>, StoreError> {
    text.map(|t| serde_json::from_str(&t))
        .transpose()
        .map_err(|e| StoreError::InvalidDocument {
            id: id.to_string(),
            reason: format!("{column} is not valid JSON: {e}"),
        })
}

fn request_from_model(model: email_request::Model) -> Result<EmailRequest, StoreError> {
    let profile = RequestProfile::from_collection(&model.collection).ok_or_else(|| {
        StoreError::InvalidDocument {
            id: model.id.clone(),
            reason: format!("unknown collection '{}'", model.collection),
        }
    })?;
    let metadata = parse_json(&model.id, "metadata", model.metadata)?;
    Ok(EmailRequest {
        id: model.id,
        profile,
        to: model.recipient,
        subject: model.subject,
        message: model.message,
        html: model.html,
        priority: model.priority,
        request_id: model.request_id,
        confirm_path: model.confirm_path,
        metadata,
        created_at: model.created_at,
        processing: model.processing,
        processing_start: model.processing_start,
        processed: model.processed,
        status: model.status,
        email_id: model.email_id,
        processed_at: model.processed_at,
        error: model.error,
    })
}

fn record_from_model(model: delivery_status::Model) -> Result<DeliveryStatusRecord, StoreError> {
    let details = parse_json(&model.email_id, "details", model.details)?;
    Ok(DeliveryStatusRecord {
        id: model.id,
        collection: model.collection,
        email_id: model.email_id,
        request_id: model.request_id,
        delivered: model.delivered,
        status: model.status,
        details,
        timestamp: model.timestamp,
    })
}

/// Partial update touching only the fields `update` sets.
fn active_update(update: &RequestUpdate) -> email_request::ActiveModel {
    let mut active = <email_request::ActiveModel as Default>::default();
    if let Some(status) = update.status {
        active.status = Set(Some(status.as_str().to_string()));
    }
    if let Some(processing) = update.processing {
        active.processing = Set(processing);
    }
    if let Some(start) = update.processing_start {
        active.processing_start = Set(Some(start));
    }
    if let Some(processed) = update.processed {
        active.processed = Set(processed);
    }
    if let Some(email_id) = &update.email_id {
        active.email_id = Set(Some(email_id.clone()));
    }
    if let Some(processed_at) = update.processed_at {
        active.processed_at = Set(Some(processed_at));
    }
    if let Some(error) = &update.error {
        active.error = Set(Some(error.clone()));
    }
    active
}

#[async_trait]
impl DocumentStore for SeaOrmStore {
    #[tracing::instrument(skip(self, request))]
    async fn create_request(
        &self,
        profile: RequestProfile,
        request: NewEmailRequest,
    ) -> Result<EmailRequest, StoreError> {
        let metadata = if request.extra.is_empty() {
            None
        } else {
            Some(Value::Object(request.extra).to_string())
        };
        let model = email_request::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            collection: Set(profile.collection().to_string()),
            recipient: Set(request.to),
            subject: Set(request.subject),
            message: Set(request.message),
            html: Set(request.html),
            priority: Set(request.priority),
            request_id: Set(request.request_id),
            confirm_path: Set(request.confirm_path),
            metadata: Set(metadata),
            created_at: Set(OffsetDateTime::now_utc()),
            claimed_at: Set(None),
            processing: Set(false),
            processing_start: Set(None),
            processed: Set(false),
            status: Set(None),
            email_id: Set(None),
            processed_at: Set(None),
            error: Set(None),
        }
        .insert(self.connection())
        .await?;
        request_from_model(model)
    }

    #[tracing::instrument(skip(self))]
    async fn get_request(
        &self,
        profile: RequestProfile,
        id: &str,
    ) -> Result<Option<EmailRequest>, StoreError> {
        email_request::Entity::find_by_id(id.to_string())
            .filter(email_request::Column::Collection.eq(profile.collection()))
            .one(self.connection())
            .await?
            .map(request_from_model)
            .transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn claim_new_requests(
        &self,
        profile: RequestProfile,
        limit: u64,
    ) -> Result<Vec<EmailRequest>, StoreError> {
        let candidates = email_request::Entity::find()
            .filter(email_request::Column::Collection.eq(profile.collection()))
            .filter(email_request::Column::ClaimedAt.is_null())
            .order_by_asc(email_request::Column::CreatedAt)
            .limit(limit)
            .all(self.connection())
            .await?;

        let now = OffsetDateTime::now_utc();
        let mut claimed = Vec::with_capacity(candidates.len());
        for mut candidate in candidates {
            // Conditional on claimed_at still being NULL so that two watchers
            // never both fire for the same document.
            let result = email_request::Entity::update_many()
                .col_expr(email_request::Column::ClaimedAt, Expr::value(now))
                .filter(email_request::Column::Id.eq(candidate.id.clone()))
                .filter(email_request::Column::ClaimedAt.is_null())
                .exec(self.connection())
                .await?;
            if result.rows_affected == 1 {
                candidate.claimed_at = Some(now);
                claimed.push(request_from_model(candidate)?);
            }
        }
        Ok(claimed)
    }

    #[tracing::instrument(skip(self, update))]
    async fn update_request(&self, id: &str, update: &RequestUpdate) -> Result<(), StoreError> {
        let result = email_request::Entity::update_many()
            .set(active_update(update))
            .filter(email_request::Column::Id.eq(id))
            .exec(self.connection())
            .await?;
        if result.rows_affected == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, update))]
    async fn update_unfinished_request(
        &self,
        id: &str,
        update: &RequestUpdate,
    ) -> Result<bool, StoreError> {
        let result = email_request::Entity::update_many()
            .set(active_update(update))
            .filter(email_request::Column::Id.eq(id))
            .filter(email_request::Column::Processed.eq(false))
            .filter(
                Condition::any()
                    .add(email_request::Column::Status.is_null())
                    .add(email_request::Column::Status.eq(DeliveryStatus::Processing.as_str())),
            )
            .exec(self.connection())
            .await?;
        Ok(result.rows_affected > 0)
    }

    #[tracing::instrument(skip(self, record), fields(email_id = %record.email_id, status = %record.status))]
    async fn append_status(
        &self,
        record: NewStatusRecord,
    ) -> Result<DeliveryStatusRecord, StoreError> {
        let delivered = record.delivered();
        let details = match record.details {
            Value::Null => None,
            details => Some(details.to_string()),
        };
        let model = delivery_status::ActiveModel {
            id: NotSet,
            collection: Set(record.collection),
            email_id: Set(record.email_id),
            request_id: Set(record.request_id),
            delivered: Set(delivered),
            status: Set(record.status.as_str().to_string()),
            details: Set(details),
            timestamp: Set(OffsetDateTime::now_utc()),
        }
        .insert(self.connection())
        .await?;
        record_from_model(model)
    }

    #[tracing::instrument(skip(self))]
    async fn latest_status(
        &self,
        collection: &str,
        email_id: &str,
    ) -> Result<Option<DeliveryStatusRecord>, StoreError> {
        delivery_status::Entity::find()
            .filter(delivery_status::Column::Collection.eq(collection))
            .filter(delivery_status::Column::EmailId.eq(email_id))
            .order_by_desc(delivery_status::Column::Timestamp)
            .order_by_desc(delivery_status::Column::Id)
            .one(self.connection())
            .await?
            .map(record_from_model)
            .transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn stuck_requests(
        &self,
        started_before: OffsetDateTime,
    ) -> Result<Vec<EmailRequest>, StoreError> {
        email_request::Entity::find()
            .filter(email_request::Column::Processed.eq(false))
            .filter(
                Condition::any()
                    .add(
                        Condition::all()
                            .add(
                                email_request::Column::Status
                                    .eq(DeliveryStatus::Processing.as_str()),
                            )
                            .add(email_request::Column::ProcessingStart.lt(started_before)),
                    )
                    .add(
                        Condition::all()
                            .add(email_request::Column::Status.is_null())
                            .add(email_request::Column::ClaimedAt.lt(started_before)),
                    ),
            )
            .order_by_asc(email_request::Column::CreatedAt)
            .all(self.connection())
            .await?
            .into_iter()
            .map(request_from_model)
            .collect()
    }
}
