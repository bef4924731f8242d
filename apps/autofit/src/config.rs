use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::autofit::FitConfig;
use crate::layout::FontFamily;
use crate::queue::QueueSettings;
use crate::session::SessionSettings;

/// Application configuration loaded from environment variables.
/// Every variable is optional; malformed values fail startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub font: FontFamily,
    pub sparsity_threshold: f64,
    pub max_iterations: u32,
    pub ready_interval_ms: u64,
    pub handshake_timeout_ms: u64,
    pub debounce_ms: u64,
    pub dedup_window_ms: u64,
    pub render_timeout_ms: u64,
    pub profile_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            font: match std::env::var("AUTOFIT_FONT_FAMILY") {
                Ok(raw) => FontFamily::from_str(&raw).map_err(|e| anyhow!("AUTOFIT_FONT_FAMILY: {e}"))?,
                Err(_) => FontFamily::default(),
            },
            sparsity_threshold: parse_env("AUTOFIT_SPARSITY_THRESHOLD", 0.85)?,
            max_iterations: parse_env("AUTOFIT_MAX_ITERATIONS", 25)?,
            ready_interval_ms: parse_env("AUTOFIT_READY_INTERVAL_MS", 100)?,
            handshake_timeout_ms: parse_env("AUTOFIT_HANDSHAKE_TIMEOUT_MS", 5000)?,
            debounce_ms: parse_env("AUTOFIT_DEBOUNCE_MS", 300)?,
            dedup_window_ms: parse_env("AUTOFIT_DEDUP_WINDOW_MS", 1000)?,
            render_timeout_ms: parse_env("AUTOFIT_RENDER_TIMEOUT_MS", 15000)?,
            profile_path: std::env::var("AUTOFIT_PROFILE_PATH").ok().map(PathBuf::from),
        })
    }

    /// Session settings for every render job. A fit profile, when configured,
    /// replaces the built-in parameter table; the threshold and ceiling from the
    /// environment always win.
    pub fn session_settings(&self) -> Result<SessionSettings> {
        let mut fit = match &self.profile_path {
            Some(path) => FitConfig::load_profile(path)?,
            None => FitConfig::default(),
        };
        fit.sparsity_threshold = self.sparsity_threshold;
        fit.max_iterations = self.max_iterations;
        fit.validate()?;

        Ok(SessionSettings {
            ready_interval: Duration::from_millis(self.ready_interval_ms),
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            render_timeout: Duration::from_millis(self.render_timeout_ms),
            queue: QueueSettings {
                debounce: Duration::from_millis(self.debounce_ms),
                dedup_window: Duration::from_millis(self.dedup_window_ms),
            },
            fit,
        })
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}
