use anyhow::anyhow;
use axum::{extract::State, http::HeaderMap, Json};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::{
    calendar::{CalendarClient, CalendarSource},
    db_core::queries,
    email::sweep_triage_labels,
    error::{AppError, AppJsonResult, AppResult},
    scheduler::{
        apply::{apply_plan, CalendarFixedEvents},
        planner::plan_window,
        reflow::{reflow_now, ReflowParams},
        task_source::{StoreTaskSource, TaskSource},
    },
    server_config::cfg,
    ServerState,
};

const ADMIN_TOKEN_HEADER: &str = "x-helios-admin-token";

fn require_admin(headers: &HeaderMap) -> AppResult<()> {
    let Some(expected) = &cfg.admin_token else {
        return Err(AppError::Internal(anyhow!("ADMIN_TOKEN not configured")));
    };
    match headers.get(ADMIN_TOKEN_HEADER).and_then(|v| v.to_str().ok()) {
        Some(presented) if presented == expected => Ok(()),
        _ => Err(AppError::Forbidden("admin token mismatch".to_string())),
    }
}

fn calendar_client(state: &ServerState) -> AppResult<CalendarClient> {
    let token = cfg.calendar_access_token.clone().ok_or_else(|| {
        AppError::Unauthorized("CALENDAR_ACCESS_TOKEN is not configured".to_string())
    })?;
    Ok(CalendarClient::new(state.http_client.clone(), token))
}

fn fixed_calendar_id() -> AppResult<String> {
    cfg.fixed_calendar_id
        .clone()
        .ok_or_else(|| AppError::Validation("FIXED_CALENDAR_ID is not configured".to_string()))
}

fn flexible_calendar_id() -> AppResult<String> {
    cfg.flexible_calendar_id
        .clone()
        .ok_or_else(|| AppError::Validation("FLEXIBLE_CALENDAR_ID is not configured".to_string()))
}

/// Trigger a triage-label sweep outside its cron cadence.
pub async fn handler_sweep(
    State(state): State<ServerState>,
    headers: HeaderMap,
) -> AppJsonResult<serde_json::Value> {
    require_admin(&headers)?;
    let stats = sweep_triage_labels(&state).await?;
    Ok(Json(serde_json::to_value(stats).unwrap_or_default()))
}

#[derive(Debug, Deserialize)]
pub struct PlanRequest {
    /// Defaults to today in the configured timezone.
    pub start_date: Option<NaiveDate>,
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    /// Write the blocks to the suggestions calendar.
    #[serde(default)]
    pub apply: bool,
    /// Clear previously generated suggestions in the window first.
    #[serde(default)]
    pub pre_clear: bool,
}

fn default_window_days() -> u32 {
    7
}

pub async fn handler_plan(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(request): Json<PlanRequest>,
) -> AppJsonResult<serde_json::Value> {
    require_admin(&headers)?;
    if request.window_days == 0 || request.window_days > 60 {
        return Err(AppError::Validation(
            "window_days must be between 1 and 60".to_string(),
        ));
    }

    let tz = cfg.timezone;
    let start_date = request
        .start_date
        .unwrap_or_else(|| Utc::now().with_timezone(&tz).date_naive());

    let calendar = calendar_client(&state)?;
    let fixed_id = fixed_calendar_id()?;

    let tasks = StoreTaskSource::new(state.conn.clone())
        .grouped_tasks()
        .await?;

    let fetcher = CalendarFixedEvents::new(&calendar, fixed_id, tz);
    let plan = plan_window(
        &fetcher,
        &tasks,
        &cfg.scheduler,
        tz,
        start_date,
        request.window_days,
    )
    .await;

    let report = if request.apply {
        let flexible_id = flexible_calendar_id()?;
        let window_start = tz
            .from_local_datetime(&start_date.and_hms_opt(0, 0, 0).unwrap())
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        let window = (
            window_start,
            window_start + Duration::days(request.window_days as i64),
        );
        Some(
            apply_plan(
                &calendar,
                &flexible_id,
                &plan.blocks,
                window,
                request.pre_clear,
            )
            .await?,
        )
    } else {
        None
    };

    Ok(Json(json!({
        "start_date": start_date,
        "window_days": request.window_days,
        "days_skipped": plan.days_skipped,
        "blocks": plan.blocks,
        "apply_report": report,
    })))
}

pub async fn handler_reflow(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(params): Json<ReflowParams>,
) -> AppJsonResult<serde_json::Value> {
    require_admin(&headers)?;

    let calendar = calendar_client(&state)?;
    let flexible_id = flexible_calendar_id()?;
    let tasks = StoreTaskSource::new(state.conn.clone())
        .grouped_tasks()
        .await?;

    let outcome = reflow_now(&calendar, &flexible_id, &tasks, Utc::now(), &params).await?;
    Ok(Json(serde_json::to_value(outcome).unwrap_or_default()))
}

pub async fn handler_allowlist_cleanup(
    State(state): State<ServerState>,
    headers: HeaderMap,
) -> AppJsonResult<serde_json::Value> {
    require_admin(&headers)?;
    let report = queries::allowlist_cleanup(&state.conn).await?;
    Ok(Json(serde_json::to_value(report).unwrap_or_default()))
}
