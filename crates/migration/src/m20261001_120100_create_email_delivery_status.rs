use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Append-only delivery status log.
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EmailDeliveryStatus::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EmailDeliveryStatus::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(EmailDeliveryStatus::Collection)
                            .string()
                            .not_null()
                            .default("email_delivery_status")
                            .comment("Status collection, overridden by a request's confirm_path"),
                    )
                    .col(string(EmailDeliveryStatus::EmailId))
                    .col(string_null(EmailDeliveryStatus::RequestId))
                    .col(boolean(EmailDeliveryStatus::Delivered).default(false))
                    .col(
                        ColumnDef::new(EmailDeliveryStatus::Status)
                            .string()
                            .not_null()
                            .comment("'processing', 'delivered' or 'failed'"),
                    )
                    .col(text_null(EmailDeliveryStatus::Details))
                    .col(
                        timestamp_with_time_zone(EmailDeliveryStatus::Timestamp)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .index(
                        Index::create()
                            .name("idx_email_delivery_status_lookup")
                            .col(EmailDeliveryStatus::Collection)
                            .col(EmailDeliveryStatus::EmailId)
                            .col(EmailDeliveryStatus::Timestamp),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EmailDeliveryStatus::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum EmailDeliveryStatus {
    Table,
    Id,
    Collection,
    EmailId,
    RequestId,
    Delivered,
    Status,
    Details,
    Timestamp,
}
