use axum::http::Method;
use axum::{Router, routing::get};
use std::error::Error;
use tower_http::cors::{Any, CorsLayer};

use crate::handler::{AppState, healthcheck};

pub mod color;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod handler;
pub mod hue;
pub mod plex;
pub mod transition;

pub fn unpack_error(err: &(dyn Error)) -> String {
    let mut parts = Vec::new();
    parts.push(err.to_string());
    let mut current = err.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": ")
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/", get(healthcheck))
        .nest("/api", control::routes())
        .layer(cors)
        .with_state(state)
}
