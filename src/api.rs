pub(crate) mod admin;
pub(crate) mod health;
pub(crate) mod metrics;
pub(crate) mod status;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::app::AppState;

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics::exporter))
        .route("/v1/ingest/status", get(status::current))
        .route("/v1/ingest/runs", get(status::runs))
        .route("/admin/ingest/sweep", post(admin::trigger_sweep))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
