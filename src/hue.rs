use std::future::Future;
use std::time::Duration;

use serde::Serialize;

use crate::color::Color;
use crate::config::Bridge;
use crate::error::SyncError;

/// Brightness fraction at or below which a light is switched off instead.
pub const NEAR_BLACK: f64 = 0.03;

/// Partial state update accepted by `PUT /api/{user}/lights/{id}/state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LightState {
    pub on: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hue: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sat: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,
}

impl LightState {
    pub const OFF: LightState = LightState {
        on: false,
        hue: None,
        sat: None,
        bri: None,
    };

    /// Converts through HSV into the bridge's ranges: hue 0..=65535,
    /// saturation and brightness 0..=254.
    pub fn from_color(color: Color) -> Self {
        let (h, s, v) = rgb_to_hsv(color);
        if v <= NEAR_BLACK {
            return LightState::OFF;
        }

        let hue = (h * 65536.0).round() as u32 % 65536;
        LightState {
            on: true,
            hue: Some(hue as u16),
            sat: Some((s * 254.0).round() as u8),
            bri: Some((v * 254.0).round() as u8),
        }
    }
}

/// Hue, saturation and value, each as a fraction in 0..1.
fn rgb_to_hsv(color: Color) -> (f64, f64, f64) {
    let [r, g, b] = color.channels().map(|c| f64::from(c) / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max > 0.0 { delta / max } else { 0.0 };

    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };

    (h / 6.0, s, max)
}

pub trait LightBridge {
    fn set_state(
        &self,
        light: u32,
        state: &LightState,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;
}

pub struct HueBridge {
    client: reqwest::Client,
    base_url: String,
    user: String,
}

impl HueBridge {
    pub fn new(cfg: &Bridge) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| SyncError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: cfg.url.trim_end_matches('/').to_string(),
            user: cfg.user.clone(),
        })
    }

    fn state_url(&self, light: u32) -> String {
        format!("{}/api/{}/lights/{}/state", self.base_url, self.user, light)
    }
}

impl LightBridge for HueBridge {
    async fn set_state(&self, light: u32, state: &LightState) -> Result<(), SyncError> {
        let resp = self.client.put(self.state_url(light)).json(state).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SyncError::Transport(format!(
                "light {} update failed with status {}",
                light, status
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub updated: usize,
    pub failed: usize,
}

/// Sends `color` to every light in turn. A failing light is logged and
/// counted; the remaining lights are still attempted.
pub async fn set_color<B: LightBridge>(bridge: &B, lights: &[u32], color: Color) -> DispatchReport {
    let state = LightState::from_color(color);
    let mut report = DispatchReport::default();

    for &light in lights {
        match bridge.set_state(light, &state).await {
            Ok(()) => report.updated += 1,
            Err(e) => {
                tracing::error!(light, %color, error = %e, "failed to update light");
                report.failed += 1;
            }
        }
    }

    tracing::debug!(%color, on = state.on, bri = ?state.bri, "dispatched color");
    report
}
