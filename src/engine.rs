//! The background worker that keeps the lights following the picture.
//!
//! A single [`SyncLoop`] runs per process. While armed it polls the media
//! server, samples a frame, extracts a color and fades the lights toward it.
//! While disarmed it only sleeps. The outside world talks to it exclusively
//! through an [`EngineHandle`]: arm/disarm travel over a single-slot watch
//! channel and shutdown is a cancellation token, so the worker stays the only
//! writer of `last_color` and the only caller of the lighting bridge.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::color::{Color, ColorStrategy};
use crate::config::Config;
use crate::error::SyncError;
use crate::hue::{LightBridge, set_color};
use crate::plex::MediaServer;
use crate::transition::Transition;

#[derive(Debug, Clone)]
pub struct Settings {
    pub lights: Vec<u32>,
    pub steps: u32,
    pub transition: Duration,
    pub idle_delay: Duration,
    pub look_ahead: Duration,
    pub strategy: ColorStrategy,
    pub buckets: u16,
}

impl Settings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            lights: cfg.bridge.lights.clone(),
            steps: cfg.sync.steps,
            transition: cfg.sync.transition_duration(),
            idle_delay: cfg.sync.idle_delay(),
            look_ahead: Duration::from_millis(cfg.plex.look_ahead_ms),
            strategy: cfg.sync.strategy,
            buckets: cfg.sync.buckets,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    NotPlaying,
    FetchFailed,
    ExtractFailed,
    Updated { color: Color, dispatched: usize },
}

/// Cloneable control surface for the worker.
#[derive(Clone)]
pub struct EngineHandle {
    armed: Arc<watch::Sender<bool>>,
    last_color: watch::Receiver<Color>,
    shutdown: CancellationToken,
}

impl EngineHandle {
    pub fn arm(&self) {
        if !self.armed.send_replace(true) {
            tracing::info!("sync armed");
        }
    }

    pub fn disarm(&self) {
        if self.armed.send_replace(false) {
            tracing::info!("sync disarmed");
        }
    }

    /// Stops the worker for good. Also disarms so a running fade ends at its
    /// next step.
    pub fn shutdown(&self) {
        self.armed.send_replace(false);
        self.shutdown.cancel();
        tracing::info!("sync shutting down");
    }

    pub fn is_armed(&self) -> bool {
        *self.armed.borrow()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn last_color(&self) -> Color {
        *self.last_color.borrow()
    }
}

pub struct SyncLoop<M, B> {
    media: M,
    bridge: B,
    settings: Settings,
    transition: Transition,
    armed: watch::Receiver<bool>,
    last_color: Color,
    published: watch::Sender<Color>,
    shutdown: CancellationToken,
}

impl<M, B> SyncLoop<M, B>
where
    M: MediaServer + Send + Sync + 'static,
    B: LightBridge + Send + Sync + 'static,
{
    /// Fails with a configuration error when the transition has no steps.
    pub fn new(media: M, bridge: B, settings: Settings) -> Result<(Self, EngineHandle), SyncError> {
        let transition = Transition::new(settings.steps, settings.transition)?;
        let (armed_tx, armed_rx) = watch::channel(false);
        let (color_tx, color_rx) = watch::channel(Color::BLACK);
        let shutdown = CancellationToken::new();

        let handle = EngineHandle {
            armed: Arc::new(armed_tx),
            last_color: color_rx,
            shutdown: shutdown.clone(),
        };

        let sync = Self {
            media,
            bridge,
            settings,
            transition,
            armed: armed_rx,
            last_color: Color::BLACK,
            published: color_tx,
            shutdown,
        };

        Ok((sync, handle))
    }

    pub fn last_color(&self) -> Color {
        self.last_color
    }

    /// Runs until [`EngineHandle::shutdown`] is called.
    pub async fn run(mut self) {
        tracing::info!(lights = ?self.settings.lights, steps = self.transition.step_count(), "sync loop started");

        while !self.shutdown.is_cancelled() {
            let armed = *self.armed.borrow_and_update();
            if !armed {
                self.idle().await;
                continue;
            }

            match self.poll_once().await {
                PollOutcome::Updated { .. } => {}
                _ => self.idle().await,
            }
        }

        tracing::info!(last_color = %self.last_color, "sync loop stopped");
    }

    /// One armed iteration: session, frame, color, fade.
    pub async fn poll_once(&mut self) -> PollOutcome {
        let Some(session) = self.media.current_session().await else {
            return PollOutcome::NotPlaying;
        };

        let frame = match self.media.fetch_frame(&session, self.settings.look_ahead).await {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, video_id = session.video_id, "failed to fetch frame");
                return PollOutcome::FetchFailed;
            }
        };

        let color = match self.settings.strategy.extract(&frame, self.settings.buckets) {
            Ok(color) => color,
            Err(e) => {
                tracing::error!(error = %e, "failed to extract color");
                return PollOutcome::ExtractFailed;
            }
        };
        drop(frame);
        tracing::info!(%color, from = %self.last_color, "sampled color");

        let armed = &self.armed;
        let shutdown = &self.shutdown;
        let bridge = &self.bridge;
        let lights = self.settings.lights.as_slice();

        let dispatched = self
            .transition
            .run(
                self.last_color,
                color,
                || *armed.borrow() && !shutdown.is_cancelled(),
                |step| async move {
                    set_color(bridge, lights, step.color).await;
                },
                shutdown,
            )
            .await;

        // Even a cut-short fade moves the origin of the next one.
        self.last_color = color;
        self.published.send_replace(color);

        PollOutcome::Updated { color, dispatched }
    }

    async fn idle(&mut self) {
        let delay = self.settings.idle_delay;
        let shutdown = &self.shutdown;
        let armed = &mut self.armed;

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.cancelled() => {}
            Ok(()) = armed.changed() => {}
        }
    }
}
