use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Client::Table)
                    .if_not_exists()
                    .col(string(Client::Id).primary_key())
                    .col(string(Client::Name))
                    .col(string_null(Client::Phone))
                    .col(text_null(Client::Notes))
                    .col(array(Client::Tags, ColumnType::Text).not_null())
                    .col(boolean(Client::Active).default(true))
                    .col(
                        timestamp_with_time_zone(Client::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(Client::UpdatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // display names are unique regardless of case
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX \"idx-clients-name-ci\" ON \"clients\" (lower(\"name\"))",
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ClientEmail::Table)
                    .if_not_exists()
                    .col(pk_auto(ClientEmail::Id))
                    .col(string(ClientEmail::ClientId))
                    .col(string(ClientEmail::Email))
                    .col(
                        timestamp_with_time_zone(ClientEmail::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-client_emails-client_id")
                            .from(ClientEmail::Table, ClientEmail::ClientId)
                            .to(Client::Table, Client::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-client_emails-client_id-email")
                    .unique()
                    .table(ClientEmail::Table)
                    .col(ClientEmail::ClientId)
                    .col(ClientEmail::Email)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-client_emails-email")
                    .table(ClientEmail::Table)
                    .col(ClientEmail::Email)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ClientDomain::Table)
                    .if_not_exists()
                    .col(pk_auto(ClientDomain::Id))
                    .col(string(ClientDomain::ClientId))
                    .col(string(ClientDomain::Domain))
                    .col(boolean(ClientDomain::Wildcard).default(false))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-client_domains-client_id")
                            .from(ClientDomain::Table, ClientDomain::ClientId)
                            .to(Client::Table, Client::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-client_domains-client_id-domain-wildcard")
                    .unique()
                    .table(ClientDomain::Table)
                    .col(ClientDomain::ClientId)
                    .col(ClientDomain::Domain)
                    .col(ClientDomain::Wildcard)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-client_domains-domain")
                    .table(ClientDomain::Table)
                    .col(ClientDomain::Domain)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AllowlistMeta::Table)
                    .if_not_exists()
                    .col(integer(AllowlistMeta::Id).primary_key())
                    .col(big_integer(AllowlistMeta::Version).default(1).not_null())
                    .col(
                        timestamp_with_time_zone(AllowlistMeta::UpdatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // the singleton row every version bump targets
        manager
            .get_connection()
            .execute_unprepared(
                "INSERT INTO \"allowlist_meta\" (\"id\", \"version\") VALUES (1, 1) ON CONFLICT DO NOTHING",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AllowlistMeta::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ClientDomain::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ClientEmail::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Client::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Client {
    #[sea_orm(iden = "clients")]
    Table,
    Id,
    Name,
    Phone,
    Notes,
    Tags,
    Active,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum ClientEmail {
    #[sea_orm(iden = "client_emails")]
    Table,
    Id,
    ClientId,
    Email,
    CreatedAt,
}

#[derive(DeriveIden)]
pub enum ClientDomain {
    #[sea_orm(iden = "client_domains")]
    Table,
    Id,
    ClientId,
    Domain,
    Wildcard,
}

#[derive(DeriveIden)]
pub enum AllowlistMeta {
    #[sea_orm(iden = "allowlist_meta")]
    Table,
    Id,
    Version,
    UpdatedAt,
}
