use sea_orm_migration::{prelude::*, schema::*};

use crate::m20250812_093000_create_email_triage_tables::TaskMeta;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(TaskMeta::Table)
                    .add_column(timestamp_with_time_zone_null(Alias::new("start_at")))
                    .add_column(timestamp_with_time_zone_null(Alias::new("due_at")))
                    .add_column(string_len_null(Alias::new("source"), 32))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(TaskMeta::Table)
                    .drop_column(Alias::new("source"))
                    .drop_column(Alias::new("due_at"))
                    .drop_column(Alias::new("start_at"))
                    .to_owned(),
            )
            .await
    }
}
