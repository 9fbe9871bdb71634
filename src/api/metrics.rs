use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::app::AppState;

pub(crate) async fn exporter(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, state.telemetry().render_prometheus()).into_response()
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

    #[tokio::test]
    async fn exposes_ingest_metrics() {
        let router = build_router(test_registry(Vec::new(), &InMemoryPaperStore::new()));

        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let text = String::from_utf8(body.to_vec()).expect("utf8");
        assert!(text.contains("arxiv_ingest_runs_completed_total"));
    }
}
