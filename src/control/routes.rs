use axum::{
    Router,
    routing::{get, post},
};

use super::handler;
use crate::handler::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/hook", post(handler::hook))
        .route("/start", get(handler::start).post(handler::start))
        .route("/stop", get(handler::stop).post(handler::stop))
        .route("/status", get(handler::status))
}
