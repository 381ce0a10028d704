use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::AppState;
use super::controller;

pub fn monitor_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/monitor", post(controller::create_monitor))
        .route("/logs/{monitor_id}", get(controller::get_logs))
        .route("/status/{monitor_id}", get(controller::get_status))
}
