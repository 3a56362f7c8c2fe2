//! Health check endpoints

use axum::{extract::State, Json};
use serde::Serialize;

use crate::config::EngineKind;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub engine: String,
    pub engine_kind: EngineKind,
    pub runtime_version: &'static str,
    pub version: &'static str,
    pub scratch_dir: String,
    pub max_upload_bytes: u64,
}

/// Read-only diagnostic snapshot; always succeeds
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let engine = state.converter().engine();

    Json(HealthResponse {
        status: "ok",
        engine: engine.describe(),
        engine_kind: engine.kind(),
        runtime_version: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")),
        version: env!("CARGO_PKG_VERSION"),
        scratch_dir: state.scratch().path().display().to_string(),
        max_upload_bytes: state.config().upload.max_upload_bytes,
    })
}
