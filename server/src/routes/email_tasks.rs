use axum::{
    extract::{Query, State},
    Json,
};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use serde_json::json;

use crate::{
    db_core::queries,
    email::{ingest_email, EmailTaskIn},
    error::AppJsonResult,
    server_config::cfg,
};

/// The ingestion entry point. Rejections are not HTTP errors: the response
/// is always 200 with a `reason`, matching what batch drivers expect.
pub async fn handler_from_email(
    State(conn): State<DatabaseConnection>,
    Json(input): Json<EmailTaskIn>,
) -> AppJsonResult<serde_json::Value> {
    let outcome = ingest_email(&conn, input, cfg.thread_mode).await?;
    Ok(Json(serde_json::to_value(outcome).unwrap_or_default()))
}

const DEFAULT_LIMIT: u64 = 50;
const MAX_LIMIT: u64 = 200;

#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub sender: Option<String>,
    pub source_label: Option<String>,
}

pub async fn handler_latest(
    State(conn): State<DatabaseConnection>,
    Query(query): Query<LatestQuery>,
) -> AppJsonResult<serde_json::Value> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let offset = query.offset.unwrap_or(0);
    let tasks =
        queries::email_tasks_latest(&conn, limit, offset, query.sender, query.source_label)
            .await?;
    Ok(Json(json!({
        "tasks": tasks,
        "limit": limit,
        "offset": offset,
    })))
}
