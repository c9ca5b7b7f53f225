use anyhow::Result;
use clap::Parser;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::color::{ColorStrategy, DEFAULT_BUCKETS};
use crate::error::SyncError;

#[derive(Parser, Debug)]
#[command(name = "lumasync")]
#[command(about = "Matches Hue lights to whatever is playing on Plex", long_about = None)]
pub struct Cli {
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<String>,
    /// Start armed instead of waiting for a play event.
    #[arg(long)]
    pub armed: bool,
}

pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".lumasync")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}

#[derive(Debug, Deserialize, Clone)]
pub struct App {
    #[serde(default = "default_port")]
    port: u16,
}

fn default_port() -> u16 {
    8080
}

impl App {
    pub fn get_port(&self) -> u16 {
        self.port
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Plex {
    pub url: String,
    pub token: String,
    #[serde(default = "default_frame_width")]
    pub frame_width: u32,
    #[serde(default = "default_frame_height")]
    pub frame_height: u32,
    #[serde(default = "default_look_ahead_ms")]
    pub look_ahead_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_frame_width() -> u32 {
    700
}

fn default_frame_height() -> u32 {
    394
}

fn default_look_ahead_ms() -> u64 {
    2000
}

fn default_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Deserialize, Clone)]
pub struct Bridge {
    pub url: String,
    pub user: String,
    pub lights: Vec<u32>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_transition_ms")]
    pub transition_ms: u64,
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u64,
    #[serde(default = "default_buckets")]
    pub buckets: u16,
    #[serde(default)]
    pub strategy: ColorStrategy,
}

fn default_steps() -> u32 {
    4
}

fn default_transition_ms() -> u64 {
    2000
}

fn default_idle_ms() -> u64 {
    2000
}

fn default_buckets() -> u16 {
    DEFAULT_BUCKETS
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            transition_ms: default_transition_ms(),
            idle_ms: default_idle_ms(),
            buckets: default_buckets(),
            strategy: ColorStrategy::default(),
        }
    }
}

impl SyncConfig {
    pub fn transition_duration(&self) -> Duration {
        Duration::from_millis(self.transition_ms)
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub app: App,
    pub plex: Plex,
    pub bridge: Bridge,
    #[serde(default)]
    pub sync: SyncConfig,
}

impl Config {
    pub fn new(path: &str) -> Result<Self> {
        let cfg = Config::load_config(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Self> {
        let yaml_with_env = Config::substitute_env_vars(yaml_str)?;
        let config: Config = serde_yaml::from_str(&yaml_with_env)?;
        Ok(config)
    }

    fn load_config(path: &str) -> Result<Config> {
        let yaml_str = fs::read_to_string(path)?;
        Config::from_yaml(&yaml_str)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        for (name, url) in [("plex.url", &self.plex.url), ("bridge.url", &self.bridge.url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(SyncError::Configuration(format!("{} must be an http(s) address, got '{}'", name, url)));
            }
        }
        if self.plex.token.trim().is_empty() {
            return Err(SyncError::Configuration("plex.token is empty".into()));
        }
        if self.bridge.user.trim().is_empty() || self.bridge.user.contains('/') {
            return Err(SyncError::Configuration("bridge.user is not a valid bridge username".into()));
        }
        if self.bridge.lights.is_empty() {
            return Err(SyncError::Configuration("bridge.lights lists no lights".into()));
        }
        if self.sync.steps == 0 {
            return Err(SyncError::Configuration("sync.steps must be at least 1".into()));
        }
        if self.sync.buckets == 0 || self.sync.buckets > 256 {
            return Err(SyncError::Configuration(format!("sync.buckets must be within 1..=256, got {}", self.sync.buckets)));
        }
        Ok(())
    }

    fn substitute_env_vars(yaml_str: &str) -> Result<String> {
        let mut result = yaml_str.to_string();
        let mut offset = 0;

        while let Some(start) = result[offset..].find("${") {
            let actual_start = offset + start;
            if let Some(end) = result[actual_start..].find("}") {
                let var_name = &result[actual_start + 2..actual_start + end];

                // ${VAR:-default}
                let env_value = if let Some(default_start) = var_name.find(":-") {
                    let actual_var = &var_name[..default_start];
                    let default_val = &var_name[default_start + 2..];
                    env::var(actual_var).unwrap_or_else(|_| default_val.to_string())
                } else {
                    env::var(var_name).unwrap_or_else(|_| {
                        tracing::warn!("environment variable '{}' not found", var_name);
                        String::new()
                    })
                };

                result.replace_range(actual_start..actual_start + end + 1, &env_value);
                offset = actual_start + env_value.len();
            } else {
                break;
            }
        }

        Ok(result)
    }
}
