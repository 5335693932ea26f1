use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Request documents for both request collections.
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EmailRequests::Table)
                    .if_not_exists()
                    .col(string(EmailRequests::Id).primary_key())
                    .col(
                        ColumnDef::new(EmailRequests::Collection)
                            .string()
                            .not_null()
                            .comment("'email_requests' or 'email_direct_requests'"),
                    )
                    .col(string_null(EmailRequests::Recipient))
                    .col(string_null(EmailRequests::Subject))
                    .col(text_null(EmailRequests::Message))
                    .col(boolean(EmailRequests::Html).default(false))
                    .col(string_null(EmailRequests::Priority))
                    .col(string_null(EmailRequests::RequestId))
                    .col(string_null(EmailRequests::ConfirmPath))
                    .col(text_null(EmailRequests::Metadata))
                    .col(
                        timestamp_with_time_zone(EmailRequests::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(EmailRequests::ClaimedAt))
                    .col(boolean(EmailRequests::Processing).default(false))
                    .col(timestamp_with_time_zone_null(EmailRequests::ProcessingStart))
                    .col(boolean(EmailRequests::Processed).default(false))
                    .col(string_null(EmailRequests::Status))
                    .col(string_null(EmailRequests::EmailId))
                    .col(timestamp_with_time_zone_null(EmailRequests::ProcessedAt))
                    .col(text_null(EmailRequests::Error))
                    .to_owned(),
            )
            .await?;

        // Trigger watcher: unclaimed rows per collection, oldest first.
        manager
            .create_index(
                Index::create()
                    .name("idx_email_requests_unclaimed")
                    .table(EmailRequests::Table)
                    .col(EmailRequests::Collection)
                    .col(EmailRequests::ClaimedAt)
                    .col(EmailRequests::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Reconcile sweep.
        manager
            .create_index(
                Index::create()
                    .name("idx_email_requests_status_processing_start")
                    .table(EmailRequests::Table)
                    .col(EmailRequests::Status)
                    .col(EmailRequests::ProcessingStart)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EmailRequests::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum EmailRequests {
    Table,
    Id,
    Collection,
    Recipient,
    Subject,
    Message,
    Html,
    Priority,
    RequestId,
    ConfirmPath,
    Metadata,
    CreatedAt,
    ClaimedAt,
    Processing,
    ProcessingStart,
    Processed,
    Status,
    EmailId,
    ProcessedAt,
    Error,
}
