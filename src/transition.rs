use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::color::Color;
use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionStep {
    pub color: Color,
    pub ordinal: u32,
}

/// Paced, evenly spaced fade from one color to another.
#[derive(Debug, Clone, Copy)]
pub struct Transition {
    step_count: u32,
    total: Duration,
}

impl Transition {
    pub fn new(step_count: u32, total: Duration) -> Result<Self, SyncError> {
        if step_count == 0 {
            return Err(SyncError::Configuration("transition needs at least one step".into()));
        }
        Ok(Self { step_count, total })
    }

    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    pub fn step_delay(&self) -> Duration {
        self.total / self.step_count
    }

    /// Step `i` sits at `i / step_count` of the way, so the first step is
    /// `from` and the target itself is never part of the sequence.
    pub fn steps(&self, from: Color, to: Color) -> Vec<TransitionStep> {
        (0..self.step_count)
            .map(|ordinal| TransitionStep {
                color: interpolate(from, to, f64::from(ordinal) / f64::from(self.step_count)),
                ordinal,
            })
            .collect()
    }

    /// Dispatches each step in order, pausing `step_delay` after each one.
    ///
    /// `is_armed` is checked before every step and the sequence stops at the
    /// first `false`; whatever was dispatched last stays on the lights.
    /// Cancelling `shutdown` only shortens the pause in progress. Returns the
    /// number of steps dispatched.
    pub async fn run<A, D, Fut>(
        &self,
        from: Color,
        to: Color,
        is_armed: A,
        mut dispatch: D,
        shutdown: &CancellationToken,
    ) -> usize
    where
        A: Fn() -> bool,
        D: FnMut(TransitionStep) -> Fut,
        Fut: Future<Output = ()>,
    {
        let delay = self.step_delay();
        let mut dispatched = 0;

        for step in self.steps(from, to) {
            if !is_armed() {
                tracing::info!(step = step.ordinal, "disarmed, stopping transition");
                break;
            }

            tracing::info!(step = step.ordinal, color = %step.color, "requesting color change");
            dispatch(step).await;
            dispatched += 1;

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => {}
            }
        }

        dispatched
    }
}

fn interpolate(from: Color, to: Color, t: f64) -> Color {
    let channel = |a: u8, b: u8| {
        let v = f64::from(a) + t * (f64::from(b) - f64::from(a));
        v.round().clamp(0.0, 255.0) as u8
    };
    Color::new(channel(from.r, to.r), channel(from.g, to.g), channel(from.b, to.b))
}
