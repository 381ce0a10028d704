pub mod config;
pub mod modules;
pub mod services;

use axum::{routing::get, Json, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use modules::monitor::{monitor_routes, schema::HealthResponse, MonitorStore};
use services::monitor::MonitorEngine;

/// Settings the HTTP boundary needs beyond the store and engine.
#[derive(Debug, Clone, Default)]
pub struct AppSettings {
    pub access_password: Option<String>,
    pub public_base_url: Option<String>,
}

pub struct AppState {
    pub store: Arc<dyn MonitorStore>,
    pub engine: Arc<MonitorEngine>,
    pub settings: AppSettings,
}

pub fn create_app(
    store: Arc<dyn MonitorStore>,
    engine: Arc<MonitorEngine>,
    settings: AppSettings,
) -> Router {
    let state = Arc::new(AppState {
        store,
        engine,
        settings,
    });

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .merge(monitor_routes())
        .layer(RequestBodyLimitLayer::new(1024 * 64)) // 64KB max body
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> &'static str {
    "Page Monitor API"
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}
