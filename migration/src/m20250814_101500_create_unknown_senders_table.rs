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
                    .table(UnknownSender::Table)
                    .if_not_exists()
                    .col(pk_auto(UnknownSender::Id))
                    .col(string(UnknownSender::Email))
                    .col(string(UnknownSender::Domain))
                    .col(string(UnknownSender::MessageId))
                    .col(string_null(UnknownSender::LastSubject))
                    .col(
                        timestamp_with_time_zone(UnknownSender::FirstSeen)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(UnknownSender::LastSeen)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(integer(UnknownSender::Hits).default(1))
                    .col(string(UnknownSender::Status).default("pending"))
                    .col(string_null(UnknownSender::MatchedClientId))
                    .col(boolean(UnknownSender::Resolved).default(false))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-unknown_senders-matched_client_id")
                            .from(UnknownSender::Table, UnknownSender::MatchedClientId)
                            .to(Client::Table, Client::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // repeated sightings of the same message update in place
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-unknown_senders-email-message_id")
                    .unique()
                    .table(UnknownSender::Table)
                    .col(UnknownSender::Email)
                    .col(UnknownSender::MessageId)
                    .to_owned(),
            )
            .await?;

        for (name, col) in [
            ("idx-unknown_senders-email", UnknownSender::Email),
            ("idx-unknown_senders-last_seen", UnknownSender::LastSeen),
            ("idx-unknown_senders-status", UnknownSender::Status),
        ] {
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name(name)
                        .table(UnknownSender::Table)
                        .col(col)
                        .to_owned(),
                )
                .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UnknownSender::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum UnknownSender {
    #[sea_orm(iden = "unknown_senders")]
    Table,
    Id,
    Email,
    Domain,
    MessageId,
    LastSubject,
    FirstSeen,
    LastSeen,
    Hits,
    Status,
    MatchedClientId,
    Resolved,
}
