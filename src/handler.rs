use axum::{Json, response::IntoResponse};
use serde::Serialize;
use tracing::info;

use crate::engine::EngineHandle;

#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn healthcheck() -> impl IntoResponse {
    info!("got healthcheck request");
    Json(HealthResponse { status: "ok" })
}
