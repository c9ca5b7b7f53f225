//! Control Module
//!
//! HTTP entry points that steer the sync worker from outside.
//!
//! # Endpoints
//!
//! - `POST /hook`: Plex webhook receiver. The request is `multipart/form-data`
//!   with a `payload` field holding the event JSON. `media.play` and
//!   `media.resume` arm the worker, `media.pause` and `media.stop` disarm it,
//!   anything else is acknowledged and ignored.
//! - `GET|POST /start` and `GET|POST /stop`: manual arm/disarm.
//! - `GET /status`: whether the worker is armed and the last color it sent.
//!
//! None of these touch the lights directly; they only flip the worker's
//! armed flag through [`crate::engine::EngineHandle`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use lumasync::control;
//!
//! let app = Router::new()
//!     .nest("/api", control::routes())
//!     .with_state(app_state);
//! ```

mod handler;
mod routes;

pub use handler::PlaybackEvent;
pub use routes::routes;
