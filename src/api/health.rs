use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use tracing::error;

use crate::app::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct HealthReport {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl HealthReport {
    fn ready() -> Self {
        Self {
            status: "ready",
            detail: None,
        }
    }

    fn degraded(detail: impl Into<String>) -> Self {
        Self {
            status: "degraded",
            detail: Some(detail.into()),
        }
    }
}

pub(crate) async fn ready(
    State(state): State<AppState>,
) -> Result<Json<HealthReport>, (StatusCode, Json<HealthReport>)> {
    let ready = state.scheduler().store_ready().await;
    state.telemetry().record_ready_probe(ready);

    if !ready {
        error!("paper store readiness check failed");
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthReport::degraded("paper store unreachable")),
        ));
    }

    Ok(Json(HealthReport::ready()))
}

pub(crate) async fn live(State(state): State<AppState>) -> Json<HealthReport> {
    state.telemetry().record_live_probe();
    Json(HealthReport {
        status: "live",
        detail: None,
    })
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        app::{build_router, tests::test_registry},
        store::InMemoryPaperStore,
    };

    async fn status_of(store: &InMemoryPaperStore, uri: &str) -> StatusCode {
        build_router(test_registry(Vec::new(), store))
            .oneshot(Request::get(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response")
            .status()
    }

    #[tokio::test]
    async fn live_is_always_ok() {
        let store = InMemoryPaperStore::new();
        store.set_unavailable(true);
        assert_eq!(status_of(&store, "/health/live").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn ready_follows_store_reachability() {
        let store = InMemoryPaperStore::new();
        assert_eq!(status_of(&store, "/health/ready").await, StatusCode::OK);

        store.set_unavailable(true);
        assert_eq!(
            status_of(&store, "/health/ready").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
