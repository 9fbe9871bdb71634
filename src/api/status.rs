use axum::{Json, extract::State};
use serde::Serialize;

use crate::{
    app::AppState,
    scheduler::{IngestionRun, StatusSnapshot},
};

#[derive(Debug, Serialize)]
pub(crate) struct RunHistory {
    runs: Vec<IngestionRun>,
}

pub(crate) async fn current(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.scheduler().status().await)
}

pub(crate) async fn runs(State(state): State<AppState>) -> Json<RunHistory> {
    Json(RunHistory {
        runs: state.scheduler().history(),
    })
}
