pub use sea_orm_migration::prelude::*;

mod m20250810_000001_create_contacts_tables;
mod m20250812_093000_create_email_triage_tables;
mod m20250814_101500_create_unknown_senders_table;
mod m20250816_120000_create_thread_tasks_table;
mod m20250901_083000_add_task_meta_start_due_source;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250810_000001_create_contacts_tables::Migration),
            Box::new(m20250812_093000_create_email_triage_tables::Migration),
            Box::new(m20250814_101500_create_unknown_senders_table::Migration),
            Box::new(m20250816_120000_create_thread_tasks_table::Migration),
            Box::new(m20250901_083000_add_task_meta_start_due_source::Migration),
        ]
    }
}
