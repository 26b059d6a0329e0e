use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use serde_json::json;

use crate::{db_core::queries, error::AppResult, server_config::cfg};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowlistQuery {
    pub if_none_match: Option<String>,
}

/// Versioned snapshot read with etag-style cache validation. The max-age
/// header tells out-of-process triage clients how long they may sit on a
/// cached copy before revalidating.
pub async fn handler_get_allowlist(
    State(conn): State<DatabaseConnection>,
    Query(query): Query<AllowlistQuery>,
) -> AppResult<Response> {
    let cache_control = format!("max-age={}", cfg.allowlist_cache_ttl_sec);

    let version = queries::get_allowlist_version(&conn).await?;
    let etag = format!("W/\"{version}\"");

    if query.if_none_match.as_deref() == Some(etag.as_str()) {
        let body = Json(json!({"not_modified": true, "etag": etag}));
        return Ok(([(header::CACHE_CONTROL, cache_control)], body).into_response());
    }

    let snapshot = queries::get_allowlist_snapshot(&conn).await?;
    let body = Json(json!({
        "emails": snapshot.emails,
        "domains": snapshot.domains,
        "etag": snapshot.etag(),
        "version": snapshot.version,
        "generated_at": Utc::now().to_rfc3339(),
    }));
    Ok(([(header::CACHE_CONTROL, cache_control)], body).into_response())
}
