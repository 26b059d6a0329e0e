use axum::{
    extract::{Path, Query, State},
    Json,
};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use serde_json::json;

use crate::{
    db_core::queries::{self, ClientIn, ClientPatch},
    error::AppJsonResult,
};

pub async fn handler_list_clients(
    State(conn): State<DatabaseConnection>,
) -> AppJsonResult<serde_json::Value> {
    let clients = queries::list_clients(&conn).await?;
    Ok(Json(json!({ "clients": clients })))
}

pub async fn handler_create_client(
    State(conn): State<DatabaseConnection>,
    Json(input): Json<ClientIn>,
) -> AppJsonResult<serde_json::Value> {
    let detail = queries::create_client(&conn, input).await?;
    Ok(Json(serde_json::to_value(detail).unwrap_or_default()))
}

pub async fn handler_get_client(
    State(conn): State<DatabaseConnection>,
    Path(id): Path<String>,
) -> AppJsonResult<serde_json::Value> {
    let detail = queries::get_client(&conn, &id).await?;
    Ok(Json(serde_json::to_value(detail).unwrap_or_default()))
}

pub async fn handler_patch_client(
    State(conn): State<DatabaseConnection>,
    Path(id): Path<String>,
    Json(patch): Json<ClientPatch>,
) -> AppJsonResult<serde_json::Value> {
    let detail = queries::update_client(&conn, &id, patch).await?;
    Ok(Json(serde_json::to_value(detail).unwrap_or_default()))
}

pub async fn handler_delete_client(
    State(conn): State<DatabaseConnection>,
    Path(id): Path<String>,
) -> AppJsonResult<serde_json::Value> {
    queries::soft_delete_client(&conn, &id).await?;
    Ok(Json(json!({"deleted": id})))
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    /// Comma-separated attendee addresses.
    pub emails: String,
}

pub async fn handler_lookup_by_attendees(
    State(conn): State<DatabaseConnection>,
    Query(query): Query<LookupQuery>,
) -> AppJsonResult<serde_json::Value> {
    let emails: Vec<String> = query
        .emails
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    let matches = queries::lookup_by_attendees(&conn, &emails).await?;
    Ok(Json(json!({ "matches": matches })))
}
