use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::handler::AppState;

/// Playback events the worker reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    Play,
    Resume,
    Pause,
    Stop,
    Other,
}

impl PlaybackEvent {
    pub fn parse(event: &str) -> Self {
        match event {
            "media.play" => PlaybackEvent::Play,
            "media.resume" => PlaybackEvent::Resume,
            "media.pause" => PlaybackEvent::Pause,
            "media.stop" => PlaybackEvent::Stop,
            _ => PlaybackEvent::Other,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    event: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub armed: bool,
    pub last_color: Color,
}

#[derive(Debug, Serialize)]
struct ApiResponse<T> {
    data: T,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn success<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse { data })).into_response()
}

fn bad_request(msg: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: msg.to_string(),
        }),
    )
        .into_response()
}

fn status_of(state: &AppState) -> StatusResponse {
    StatusResponse {
        armed: state.engine.is_armed(),
        last_color: state.engine.last_color(),
    }
}

pub async fn hook(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut payload = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Failed to read webhook body: {}", e);
                return bad_request("malformed multipart body");
            }
        };

        if field.name() != Some("payload") {
            continue;
        }

        match field.text().await {
            Ok(text) => payload = Some(text),
            Err(e) => {
                tracing::error!("Failed to read webhook payload: {}", e);
                return bad_request("unreadable payload field");
            }
        }
    }

    let Some(payload) = payload else {
        return bad_request("missing payload field");
    };

    let event = match serde_json::from_str::<WebhookPayload>(&payload) {
        Ok(p) => p.event,
        Err(e) => {
            tracing::error!("Failed to parse webhook payload: {}", e);
            return bad_request("payload is not a playback event");
        }
    };

    tracing::info!(event = %event, "received playback event");
    match PlaybackEvent::parse(&event) {
        PlaybackEvent::Play | PlaybackEvent::Resume => state.engine.arm(),
        PlaybackEvent::Pause | PlaybackEvent::Stop => state.engine.disarm(),
        PlaybackEvent::Other => {}
    }

    success(status_of(&state))
}

pub async fn start(State(state): State<AppState>) -> Response {
    state.engine.arm();
    success(status_of(&state))
}

pub async fn stop(State(state): State<AppState>) -> Response {
    state.engine.disarm();
    success(status_of(&state))
}

pub async fn status(State(state): State<AppState>) -> Response {
    success(status_of(&state))
}
