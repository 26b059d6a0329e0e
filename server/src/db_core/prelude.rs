pub use entity::prelude::*;
pub use entity::{
    allowlist_meta, client, client_domain, client_email, email_task, processed_email, task_meta,
    thread_task, unknown_sender,
};
pub use sea_orm::{
    entity::*, prelude::Expr, query::*, ActiveValue, DatabaseConnection, DbErr, EntityTrait,
    JoinType, QueryFilter, TransactionTrait,
};
