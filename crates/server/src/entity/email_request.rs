//! Request documents for both the `email_requests` and `email_direct_requests`
//! collections. The `collection` column says which one a row belongs to.

use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "email_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub collection: String,
    pub recipient: Option<String>,
    pub subject: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub message: Option<String>,
    pub html: bool,
    pub priority: Option<String>,
    pub request_id: Option<String>,
    pub confirm_path: Option<String>,
    /// Extra caller fields as JSON text.
    #[sea_orm(column_type = "Text", nullable)]
    pub metadata: Option<String>,
    pub created_at: OffsetDateTime,
    /// Set once when the trigger watcher picks the row up.
    pub claimed_at: Option<OffsetDateTime>,
    pub processing: bool,
    pub processing_start: Option<OffsetDateTime>,
    pub processed: bool,
    pub status: Option<String>,
    pub email_id: Option<String>,
    pub processed_at: Option<OffsetDateTime>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
