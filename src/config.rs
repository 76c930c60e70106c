use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::digits::window::DEFAULT_WINDOW_CAPACITY;
use crate::error::AppError;

pub const DEFAULT_DECIMAL_PLACES: u32 = 2;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub feed: FeedConfig,
    #[serde(default)]
    pub digits: DigitsConfig,
    #[serde(default)]
    pub clock: ClockConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub rest_base_url: String,
    pub ws_base_url: String,
    pub symbol: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub decimal_places: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DigitsConfig {
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,
    #[serde(default = "default_true")]
    pub visible: bool,
}

impl Default for DigitsConfig {
    fn default() -> Self {
        Self {
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            visible: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClockSourceKind {
    /// Sample the local wall clock (no network round trip).
    #[default]
    Local,
    /// Sample Binance `GET /api/v3/time`.
    Binance,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClockConfig {
    #[serde(default = "default_resync_interval_ms")]
    pub resync_interval_ms: u64,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default)]
    pub source: ClockSourceKind,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            resync_interval_ms: default_resync_interval_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            source: ClockSourceKind::default(),
        }
    }
}

impl ClockConfig {
    pub fn resync_interval(&self) -> Duration {
        Duration::from_millis(self.resync_interval_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_window_capacity() -> usize {
    DEFAULT_WINDOW_CAPACITY
}

fn default_true() -> bool {
    true
}

fn default_resync_interval_ms() -> u64 {
    30_000
}

fn default_tick_interval_ms() -> u64 {
    1_000
}

fn default_log_file() -> String {
    "digit-pulse.log".to_string()
}

impl FeedConfig {
    pub fn normalized_symbol(&self) -> String {
        self.symbol.trim().to_ascii_uppercase()
    }

    /// Human-facing instrument identity; falls back to the symbol.
    pub fn display_name(&self) -> String {
        match self.display_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.normalized_symbol(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_path = Path::new("config/default.toml");
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;

        let mut config =
            Self::from_toml_str(&config_str).context("failed to parse config/default.toml")?;

        if let Ok(symbol) = std::env::var("DIGIT_PULSE_SYMBOL") {
            if !symbol.trim().is_empty() {
                config.feed.symbol = symbol;
            }
        }
        if let Ok(decimals) = std::env::var("DIGIT_PULSE_DECIMALS") {
            let parsed: u32 = decimals
                .trim()
                .parse()
                .with_context(|| format!("DIGIT_PULSE_DECIMALS '{}' is not a u32", decimals))?;
            config.feed.decimal_places = Some(parsed);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).context("invalid config toml")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let invalid = |msg: String| Err(AppError::Config(msg));
        if self.feed.normalized_symbol().is_empty() {
            return invalid("feed.symbol must not be empty".to_string());
        }
        if self.digits.window_capacity == 0 {
            return invalid("digits.window_capacity must be > 0".to_string());
        }
        if let Some(dp) = self.feed.decimal_places {
            if dp > 18 {
                return invalid(format!("feed.decimal_places {} is out of range (max 18)", dp));
            }
        }
        if self.clock.tick_interval_ms == 0 {
            return invalid("clock.tick_interval_ms must be > 0".to_string());
        }
        if self.clock.resync_interval_ms < self.clock.tick_interval_ms {
            return invalid(format!(
                "clock.resync_interval_ms ({}) must be >= clock.tick_interval_ms ({})",
                self.clock.resync_interval_ms, self.clock.tick_interval_ms
            ));
        }
        Ok(())
    }
}
