use std::time::Duration;

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};

use crate::{request_tracing, ServerState};

/// Per-request deadline for HTTP endpoints; admin batch actions (sweeps,
/// window planning) get a larger budget.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const BATCH_TIMEOUT: Duration = Duration::from_secs(60);

pub struct AppRouter;

impl AppRouter {
    pub fn create(state: ServerState) -> Router {
        let api = Router::new()
            .route("/", get(|| async { "Helios server" }))
            .route("/healthz", get(handler_healthz))
            .route("/readyz", get(handler_readyz))
            .route("/api/allowlist", get(super::allowlist::handler_get_allowlist))
            .route(
                "/api/clients",
                get(super::clients::handler_list_clients)
                    .post(super::clients::handler_create_client),
            )
            .route(
                "/api/clients/:id",
                get(super::clients::handler_get_client)
                    .patch(super::clients::handler_patch_client)
                    .delete(super::clients::handler_delete_client),
            )
            .route(
                "/api/contacts/lookup-by-attendees",
                get(super::clients::handler_lookup_by_attendees),
            )
            .route(
                "/api/unknown-senders",
                get(super::unknown_senders::handler_list)
                    .post(super::unknown_senders::handler_record),
            )
            .route(
                "/api/unknown-senders/:id/resolve",
                post(super::unknown_senders::handler_resolve),
            )
            .route(
                "/api/tasks/from-email",
                post(super::email_tasks::handler_from_email),
            )
            .route(
                "/api/email-tasks/latest",
                get(super::email_tasks::handler_latest),
            )
            .route("/api/schedule/today", get(super::schedule::handler_today))
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

        let admin = Router::new()
            .route("/api/admin/ingest/sweep", post(super::admin::handler_sweep))
            .route(
                "/api/admin/schedule/plan",
                post(super::admin::handler_plan),
            )
            .route(
                "/api/admin/schedule/reflow",
                post(super::admin::handler_reflow),
            )
            .route(
                "/api/admin/allowlist/cleanup",
                post(super::admin::handler_allowlist_cleanup),
            )
            .layer(TimeoutLayer::new(BATCH_TIMEOUT));

        api.merge(admin)
            .layer(request_tracing::request_id_layer())
            .layer(request_tracing::tracing_layer())
            .layer(request_tracing::propagate_request_id_layer())
            .layer(CorsLayer::permissive())
            .with_state(state)
            .fallback(handler_404)
    }
}

pub async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Route does not exist")
}

async fn handler_healthz() -> impl IntoResponse {
    axum::Json(serde_json::json!({"ok": true, "service": "helios"}))
}

async fn handler_readyz(
    axum::extract::State(conn): axum::extract::State<DatabaseConnection>,
) -> impl IntoResponse {
    match conn.ping().await {
        Ok(()) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({"ready": true})),
        ),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(serde_json::json!({"ready": false, "error": err.to_string()})),
        ),
    }
}
