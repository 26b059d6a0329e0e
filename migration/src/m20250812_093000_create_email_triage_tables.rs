use sea_orm_migration::{prelude::*, schema::*};

use crate::m20250810_000001_create_contacts_tables::Client;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EmailTask::Table)
                    .if_not_exists()
                    .col(string(EmailTask::Id).primary_key())
                    .col(string_null(EmailTask::ClientId))
                    .col(string(EmailTask::Sender))
                    .col(string_len(EmailTask::Subject, 500))
                    .col(string_len(EmailTask::Snippet, 500))
                    .col(text(EmailTask::Content))
                    .col(string_null(EmailTask::GmailLink))
                    .col(string_null(EmailTask::ThreadId))
                    .col(timestamp_with_time_zone_null(EmailTask::ReceivedAt))
                    .col(
                        timestamp_with_time_zone(EmailTask::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(string_null(EmailTask::SourceLabel))
                    .col(string_len(EmailTask::Priority, 16).default("normal"))
                    .col(string_null(EmailTask::ClientHint))
                    .col(string(EmailTask::Status).default("open"))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-email_tasks-client_id")
                            .from(EmailTask::Table, EmailTask::ClientId)
                            .to(Client::Table, Client::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        for (name, col) in [
            ("idx-email_tasks-sender", EmailTask::Sender),
            ("idx-email_tasks-thread_id", EmailTask::ThreadId),
            ("idx-email_tasks-received_at", EmailTask::ReceivedAt),
        ] {
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name(name)
                        .table(EmailTask::Table)
                        .col(col)
                        .to_owned(),
                )
                .await?;
        }

        manager
            .create_table(
                Table::create()
                    .table(TaskMeta::Table)
                    .if_not_exists()
                    .col(string(TaskMeta::TaskId).primary_key())
                    .col(string_len(TaskMeta::TaskType, 20).default("flexible"))
                    .col(string_len_null(TaskMeta::DeadlineType, 50))
                    .col(timestamp_with_time_zone_null(TaskMeta::FixedDate))
                    .col(boolean(TaskMeta::CalendarBlocked).default(false))
                    .col(string_len_null(TaskMeta::RecurrencePattern, 50))
                    .col(string_len_null(TaskMeta::ClientCode, 20))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-task_meta-task_id")
                            .from(TaskMeta::Table, TaskMeta::TaskId)
                            .to(EmailTask::Table, EmailTask::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProcessedEmail::Table)
                    .if_not_exists()
                    .col(string(ProcessedEmail::MessageId).primary_key())
                    .col(string_null(ProcessedEmail::HeliosTaskId))
                    .col(string_len(ProcessedEmail::Status, 32))
                    .col(timestamp_with_time_zone_null(ProcessedEmail::ReceivedAt))
                    .col(
                        timestamp_with_time_zone(ProcessedEmail::ProcessedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-processed_emails-helios_task_id")
                    .table(ProcessedEmail::Table)
                    .col(ProcessedEmail::HeliosTaskId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProcessedEmail::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TaskMeta::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EmailTask::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum EmailTask {
    #[sea_orm(iden = "email_tasks")]
    Table,
    Id,
    ClientId,
    Sender,
    Subject,
    Snippet,
    Content,
    GmailLink,
    ThreadId,
    ReceivedAt,
    CreatedAt,
    SourceLabel,
    Priority,
    ClientHint,
    Status,
}

#[derive(DeriveIden)]
pub enum TaskMeta {
    #[sea_orm(iden = "task_meta")]
    Table,
    TaskId,
    TaskType,
    DeadlineType,
    FixedDate,
    CalendarBlocked,
    RecurrencePattern,
    ClientCode,
}

#[derive(DeriveIden)]
pub enum ProcessedEmail {
    #[sea_orm(iden = "processed_emails")]
    Table,
    MessageId,
    HeliosTaskId,
    Status,
    ReceivedAt,
    ProcessedAt,
}
