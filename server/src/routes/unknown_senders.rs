use axum::{
    extract::{Path, Query, State},
    Json,
};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use serde_json::json;

use crate::{
    db_core::unknown_senders::{
        list_unknown_senders, record_unknown_sender, resolve_unknown_sender, ResolveAction,
    },
    error::AppJsonResult,
};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

pub async fn handler_list(
    State(conn): State<DatabaseConnection>,
    Query(query): Query<ListQuery>,
) -> AppJsonResult<serde_json::Value> {
    let rows = list_unknown_senders(&conn, query.status).await?;
    Ok(Json(json!({ "unknown_senders": rows })))
}

#[derive(Debug, Deserialize)]
pub struct RecordIn {
    pub email: String,
    pub message_id: String,
    pub subject: Option<String>,
}

pub async fn handler_record(
    State(conn): State<DatabaseConnection>,
    Json(input): Json<RecordIn>,
) -> AppJsonResult<serde_json::Value> {
    let row = record_unknown_sender(
        &conn,
        &input.email,
        &input.message_id,
        input.subject.as_deref(),
    )
    .await
    .map_err(crate::error::AppError::from)?;
    Ok(Json(serde_json::to_value(row).unwrap_or_default()))
}

pub async fn handler_resolve(
    State(conn): State<DatabaseConnection>,
    Path(id): Path<i32>,
    Json(action): Json<ResolveAction>,
) -> AppJsonResult<serde_json::Value> {
    let row = resolve_unknown_sender(&conn, id, action).await?;
    Ok(Json(serde_json::to_value(row).unwrap_or_default()))
}
