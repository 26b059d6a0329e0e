use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ThreadTask::Table)
                    .if_not_exists()
                    .col(string(ThreadTask::ThreadId).primary_key())
                    .col(string(ThreadTask::TaskId))
                    .col(timestamp_with_time_zone_null(ThreadTask::LastEmailAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-thread_tasks-task_id")
                    .table(ThreadTask::Table)
                    .col(ThreadTask::TaskId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ThreadTask::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum ThreadTask {
    #[sea_orm(iden = "thread_tasks")]
    Table,
    ThreadId,
    TaskId,
    LastEmailAt,
}
