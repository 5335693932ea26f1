//! Append-only delivery status log.
//!
//! One row per transition of a request. Rows are never updated or deleted; the
//! `collection` column carries the request's `confirm_path` override.

use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "email_delivery_status")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub collection: String,
    pub email_id: String,
    pub request_id: Option<String>,
    pub delivered: bool,
    pub status: String, // "processing", "delivered" or "failed"
    /// JSON text.
    #[sea_orm(column_type = "Text", nullable)]
    pub details: Option<String>,
    pub timestamp: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
