use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::modules::monitor::{
    model::{CheckInterval, MatchPattern, NewMonitor},
    schema::{CreateMonitorRequest, CreateMonitorResponse, ErrorResponse, LogsResponse, StatusResponse},
};
use crate::services::checker;
use crate::services::ledger::LogLevel;
use crate::services::monitor::LoopStart;
use crate::AppState;

/// Entries returned by the logs endpoint
pub const LOGS_PAGE_SIZE: usize = 100;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(code: &str, message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::with_message(code, message)),
    )
}

fn store_unavailable(e: impl std::fmt::Display) -> ApiError {
    tracing::error!("monitor store failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::with_message("store_unavailable", e.to_string())),
    )
}

fn check_access(state: &AppState, supplied: Option<&str>) -> Result<(), ApiError> {
    match state.settings.access_password.as_deref() {
        Some(expected) if supplied != Some(expected) => Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("unauthorized")),
        )),
        _ => Ok(()),
    }
}

/// Validate the request into a store input. No state is touched here.
fn parse_request(req: CreateMonitorRequest) -> Result<NewMonitor, ApiError> {
    if let Err(e) = req.validate() {
        return Err(bad_request("invalid_request", e.to_string()));
    }

    let url = req.url.trim().to_string();
    match reqwest::Url::parse(&url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
        _ => return Err(bad_request("invalid_request", "url must use http or https")),
    }

    let interval = CheckInterval::try_from(req.interval_hours)
        .map_err(|e| bad_request("invalid_interval", e))?;

    let pattern = MatchPattern::from_request(req.selector.as_deref(), &req.match_text)
        .ok_or_else(|| bad_request("empty_pattern", "provide a non-empty match or selector"))?;
    if let Some(selector) = pattern.selector() {
        checker::parse_selector(selector)
            .map_err(|e| bad_request("invalid_selector", e.to_string()))?;
    }

    Ok(NewMonitor {
        url,
        pattern,
        interval,
        email_to: req.email_to,
        email_message: req.email_message.filter(|m| !m.trim().is_empty()),
    })
}

pub async fn create_monitor(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateMonitorRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateMonitorResponse>), ApiError> {
    let Json(req) = payload.map_err(|e| bad_request("invalid_request", e.body_text()))?;

    check_access(&state, req.access_password.as_deref())?;
    let new_monitor = parse_request(req)?;

    let (definition, created) = state
        .store
        .create_or_reuse(new_monitor)
        .await
        .map_err(store_unavailable)?;

    let registry = state.engine.registry();
    if created {
        tracing::info!(monitor_id = %definition.id, url = %definition.url, "monitor created");
        registry
            .append(
                &definition.id,
                LogLevel::Info,
                format!("monitor created for {}", definition.url),
            )
            .await;
        state.engine.send_ready_notice(&definition).await;
    } else {
        registry
            .append(
                &definition.id,
                LogLevel::Info,
                format!("monitor reused for {}", definition.url),
            )
            .await;
    }

    // Every submission gets an immediate check: a fresh loop runs it as its
    // first tick, an existing loop is left alone and the check runs here.
    let monitor_id = definition.id.clone();
    match state.engine.start(definition.clone()).await {
        LoopStart::Started => tracing::debug!(%monitor_id, "loop started"),
        LoopStart::AlreadyRunning => {
            tracing::debug!(%monitor_id, "loop already running, checking now");
            state.engine.check_now(&definition).await;
        }
        LoopStart::ShuttingDown => tracing::warn!(%monitor_id, "engine shutting down, loop not started"),
    }

    let monitor_url = format!(
        "{}/monitor/{}",
        state.settings.public_base_url.as_deref().unwrap_or(""),
        monitor_id
    );
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(CreateMonitorResponse {
            ok: true,
            monitor_id,
            monitor_url,
            created,
        }),
    ))
}

pub async fn get_logs(
    State(state): State<Arc<AppState>>,
    Path(monitor_id): Path<String>,
) -> Json<LogsResponse> {
    Json(state.engine.registry().recent(&monitor_id, LOGS_PAGE_SIZE).await)
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(monitor_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Some(definition) = state
        .store
        .get_by_id(&monitor_id)
        .await
        .map_err(store_unavailable)?
    else {
        return Ok(Json(StatusResponse::Inactive { active: false }));
    };

    let runtime = state.engine.registry().runtime(&monitor_id).await;

    Ok(Json(StatusResponse::Active {
        active: true,
        url: definition.url,
        match_value: definition.pattern.value().to_string(),
        match_type: definition.pattern.kind(),
        email_to: definition.email_to,
        interval_hours: definition.interval.hours(),
        last_check: runtime.map(|r| r.last_check),
        next_check: runtime.map(|r| r.next_check),
    }))
}
