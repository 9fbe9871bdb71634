use axum::{Json, body::Bytes, extract::State, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    app::AppState,
    pipeline::CategoryPlan,
    scheduler::TriggerKind,
};

/// 手動スイープの上書き指定。どちらも省略可能。
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SweepRequest {
    #[serde(default)]
    max_results: Option<usize>,
    #[serde(default)]
    categories: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct SweepAccepted {
    run_id: Uuid,
    status: &'static str,
    partitions: Vec<String>,
    requested_count: usize,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

pub(crate) async fn trigger_sweep(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    state.telemetry().record_admin_sweep_invocation();

    let request = if body.iter().all(u8::is_ascii_whitespace) {
        SweepRequest::default()
    } else {
        match serde_json::from_slice::<SweepRequest>(&body) {
            Ok(request) => request,
            Err(error) => {
                return error_response(StatusCode::BAD_REQUEST, format!("invalid request body: {error}"));
            }
        }
    };

    let plan = match build_plan(&state, request) {
        Ok(plan) => plan,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    let scheduler = state.scheduler().clone();
    let Some(permit) = scheduler.try_acquire(TriggerKind::Admin) else {
        return error_response(StatusCode::CONFLICT, "an ingest sweep is already in progress");
    };

    let run_id = permit.run_id();
    let body = SweepAccepted {
        run_id,
        status: "accepted",
        partitions: plan
            .partitions()
            .iter()
            .map(|partition| partition.name().to_string())
            .collect(),
        requested_count: plan.requested_count(),
    };

    tokio::spawn(async move {
        let run = scheduler.run_sweep(permit, &plan).await;
        info!(%run_id, state = ?run.state, "admin sweep finished");
    });

    (StatusCode::ACCEPTED, Json(body)).into_response()
}

fn build_plan(state: &AppState, request: SweepRequest) -> Result<CategoryPlan, String> {
    let config = state.config();
    let mut plan = match request.categories {
        Some(categories) => {
            CategoryPlan::from_categories(&categories, config.page_size(), config.max_pages())
                .map_err(|error| error.to_string())?
                .with_sort(config.sort_key(), config.sort_order())
        }
        None => state.default_plan().clone(),
    };
    if let Some(max_results) = request.max_results {
        plan = plan.with_max_results(max_results);
    }
    plan.validate().map_err(|error| error.to_string())?;
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::Body,
        http::{Request, header},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        app::{build_router, tests::test_registry},
        clients::arxiv::FeedPage,
        pipeline::fetch::tests::records,
        scheduler::RunState,
        store::InMemoryPaperStore,
    };

    fn post(body: &str) -> Request<Body> {
        Request::post("/admin/ingest/sweep")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&body).expect("json")
    }

    #[tokio::test]
    async fn accepted_sweep_runs_in_background() {
        let store = InMemoryPaperStore::new();
        let registry = test_registry(
            vec![FeedPage::new(records("a", 100)), FeedPage::new(records("b", 100))],
            &store,
        );
        let scheduler = registry.scheduler().clone();
        let router = build_router(registry);

        let response = router.oneshot(post(r#"{"max_results": 150}"#)).await.expect("response");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        assert_eq!(body["requested_count"], 150);
        let run_id = body["run_id"].as_str().expect("run id").to_string();

        let mut finished = None;
        for _ in 0..200 {
            if let Some(run) = scheduler.history().into_iter().find(|run| run.state.is_terminal()) {
                finished = Some(run);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let run = finished.expect("admin sweep should finish");
        assert_eq!(run.run_id.to_string(), run_id);
        assert_eq!(run.state, RunState::Completed);
        assert_eq!(run.trigger, TriggerKind::Admin);
        assert_eq!(run.fetched_count, 150);
        assert_eq!(store.len(), 150);
    }

    #[tokio::test]
    async fn busy_scheduler_answers_conflict() {
        let store = InMemoryPaperStore::new();
        let registry = test_registry(Vec::new(), &store);
        let permit = registry
            .scheduler()
            .try_acquire(TriggerKind::Scheduled)
            .expect("permit");
        let router = build_router(registry);

        let response = router.oneshot(post("")).await.expect("response");

        assert_eq!(response.status(), StatusCode::CONFLICT);
        drop(permit);
    }

    #[tokio::test]
    async fn invalid_overrides_are_bad_requests() {
        let store = InMemoryPaperStore::new();
        let router = build_router(test_registry(Vec::new(), &store));

        for body in [r#"{"max_results": 0}"#, r#"{"categories": ["cs.AI", " "]}"#, "not json"] {
            let response = router.clone().oneshot(post(body)).await.expect("response");
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
        }
    }

    #[tokio::test]
    async fn explicit_categories_replace_default_plan() {
        let store = InMemoryPaperStore::new();
        let router = build_router(test_registry(Vec::new(), &store));

        let response = router
            .oneshot(post(r#"{"categories": ["cs.AI", "cs.CL"]}"#))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        assert_eq!(body["partitions"], serde_json::json!(["cs.AI", "cs.CL"]));
    }
}
