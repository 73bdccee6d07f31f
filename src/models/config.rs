//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Slot rotation, fetch and selection behavior
    #[serde(default)]
    pub rotator: RotatorConfig,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Impression/click event delivery
    #[serde(default)]
    pub analytics: AnalyticsConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        let r = &self.rotator;
        if r.slot_selector.trim().is_empty() {
            return Err(AppError::validation("rotator.slot_selector is empty"));
        }
        url::Url::parse(&r.api)
            .map_err(|e| AppError::validation(format!("rotator.api is not a URL: {e}")))?;
        if r.default_interval_ms == 0 {
            return Err(AppError::validation(
                "rotator.default_interval_ms must be > 0",
            ));
        }
        if r.fetch_timeout_ms == 0 {
            return Err(AppError::validation("rotator.fetch_timeout_ms must be > 0"));
        }
        if !(r.backoff_factor.is_finite() && r.backoff_factor >= 1.0) {
            return Err(AppError::validation("rotator.backoff_factor must be >= 1"));
        }
        if r.error_backoff_cap == 0 || r.hidden_interval_multiplier == 0 {
            return Err(AppError::validation(
                "rotator.error_backoff_cap and rotator.hidden_interval_multiplier must be > 0",
            ));
        }
        if !(0.0..=1.0).contains(&r.min_video_play_visibility) {
            return Err(AppError::validation(
                "rotator.min_video_play_visibility must be within 0..=1",
            ));
        }
        if !(0.0..=1.0).contains(&r.recent_penalty) {
            return Err(AppError::validation(
                "rotator.recent_penalty must be within 0..=1",
            ));
        }
        if r.recently_shown_limit == 0 {
            return Err(AppError::validation(
                "rotator.recently_shown_limit must be > 0",
            ));
        }
        if r.storage_key.trim().is_empty() {
            return Err(AppError::validation("rotator.storage_key is empty"));
        }
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.analytics.enabled && self.analytics.endpoint.trim().is_empty() {
            return Err(AppError::validation(
                "analytics.endpoint is empty while analytics is enabled",
            ));
        }
        Ok(())
    }

    /// Resolve the analytics endpoint against the ad API origin.
    pub fn analytics_url(&self) -> Result<url::Url> {
        let base = url::Url::parse(&self.rotator.api)?;
        Ok(base.join(&self.analytics.endpoint)?)
    }
}

/// Rotation and fetch behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotatorConfig {
    /// Host selector identifying ad slots
    #[serde(default = "defaults::slot_selector")]
    pub slot_selector: String,

    /// Ad endpoint URL
    #[serde(default = "defaults::api")]
    pub api: String,

    /// Value sent as the `count` query parameter
    #[serde(default = "defaults::request_count")]
    pub request_count: u32,

    /// Fallback rotation interval in milliseconds
    #[serde(default = "defaults::default_interval")]
    pub default_interval_ms: u64,

    /// Per-attempt fetch timeout in milliseconds
    #[serde(default = "defaults::fetch_timeout")]
    pub fetch_timeout_ms: u64,

    /// Retries after the first attempt
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds
    #[serde(default = "defaults::retry_base_delay")]
    pub retry_base_delay_ms: u64,

    /// Multiplier for retry and error backoff
    #[serde(default = "defaults::backoff_factor")]
    pub backoff_factor: f64,

    /// Error backoff never exceeds `default_interval * error_backoff_cap`
    #[serde(default = "defaults::error_backoff_cap")]
    pub error_backoff_cap: u32,

    /// Re-arm multiplier used while the page is hidden
    #[serde(default = "defaults::hidden_interval_multiplier")]
    pub hidden_interval_multiplier: u32,

    /// Floor for duration-driven display intervals in milliseconds
    #[serde(default = "defaults::min_display")]
    pub min_display_ms: u64,

    /// Intersection ratio required to play video
    #[serde(default = "defaults::min_video_play_visibility")]
    pub min_video_play_visibility: f64,

    /// Bound of the recently shown history
    #[serde(default = "defaults::recently_shown_limit")]
    pub recently_shown_limit: usize,

    /// Weight multiplier for recently shown ads
    #[serde(default = "defaults::recent_penalty")]
    pub recent_penalty: f64,

    /// Initial delay added per slot index in milliseconds
    #[serde(default = "defaults::stagger_step")]
    pub stagger_step_ms: u64,

    /// Cap on the initial per-slot delay in milliseconds
    #[serde(default = "defaults::stagger_start_max")]
    pub stagger_start_max_ms: u64,

    /// Drive the slot progress indicator
    #[serde(default = "defaults::enabled")]
    pub progress_bar: bool,

    /// Mount video even on slow connections
    #[serde(default)]
    pub allow_video_on_slow_connection: bool,

    /// Downlink below this (Mbps) counts as slow
    #[serde(default = "defaults::low_bandwidth_threshold")]
    pub low_bandwidth_threshold_mbps: f64,

    /// Image mounted when media fails to load
    #[serde(default = "defaults::placeholder_image")]
    pub placeholder_image: String,

    /// Key under which the recent history is persisted
    #[serde(default = "defaults::storage_key")]
    pub storage_key: String,
}

impl RotatorConfig {
    pub fn default_interval(&self) -> Duration {
        Duration::from_millis(self.default_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn min_display(&self) -> Duration {
        Duration::from_millis(self.min_display_ms)
    }
}

impl Default for RotatorConfig {
    fn default() -> Self {
        Self {
            slot_selector: defaults::slot_selector(),
            api: defaults::api(),
            request_count: defaults::request_count(),
            default_interval_ms: defaults::default_interval(),
            fetch_timeout_ms: defaults::fetch_timeout(),
            max_retries: defaults::max_retries(),
            retry_base_delay_ms: defaults::retry_base_delay(),
            backoff_factor: defaults::backoff_factor(),
            error_backoff_cap: defaults::error_backoff_cap(),
            hidden_interval_multiplier: defaults::hidden_interval_multiplier(),
            min_display_ms: defaults::min_display(),
            min_video_play_visibility: defaults::min_video_play_visibility(),
            recently_shown_limit: defaults::recently_shown_limit(),
            recent_penalty: defaults::recent_penalty(),
            stagger_step_ms: defaults::stagger_step(),
            stagger_start_max_ms: defaults::stagger_start_max(),
            progress_bar: defaults::enabled(),
            allow_video_on_slow_connection: false,
            low_bandwidth_threshold_mbps: defaults::low_bandwidth_threshold(),
            placeholder_image: defaults::placeholder_image(),
            storage_key: defaults::storage_key(),
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
        }
    }
}

/// Analytics delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Event endpoint, absolute or relative to the ad API
    #[serde(default = "defaults::analytics_endpoint")]
    pub endpoint: String,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled(),
            endpoint: defaults::analytics_endpoint(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    // Rotator defaults
    pub fn slot_selector() -> String {
        ".ad-banner".into()
    }
    pub fn api() -> String {
        "http://localhost:3000/api/v1/ad".into()
    }
    pub fn request_count() -> u32 {
        1
    }
    pub fn default_interval() -> u64 {
        30_000
    }
    pub fn fetch_timeout() -> u64 {
        8_000
    }
    pub fn max_retries() -> u32 {
        2
    }
    pub fn retry_base_delay() -> u64 {
        300
    }
    pub fn backoff_factor() -> f64 {
        2.0
    }
    pub fn error_backoff_cap() -> u32 {
        16
    }
    pub fn hidden_interval_multiplier() -> u32 {
        4
    }
    pub fn min_display() -> u64 {
        3_000
    }
    pub fn min_video_play_visibility() -> f64 {
        0.5
    }
    pub fn recently_shown_limit() -> usize {
        20
    }
    pub fn recent_penalty() -> f64 {
        0.2
    }
    pub fn stagger_step() -> u64 {
        1_000
    }
    pub fn stagger_start_max() -> u64 {
        2_000
    }
    pub fn low_bandwidth_threshold() -> f64 {
        0.5
    }
    pub fn placeholder_image() -> String {
        "/images/default.jpg".into()
    }
    pub fn storage_key() -> String {
        "ads.lastShown".into()
    }
    pub fn enabled() -> bool {
        true
    }

    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; adrotor/0.1)".into()
    }

    // Analytics defaults
    pub fn analytics_endpoint() -> String {
        "/api/v1/ad/event".into()
    }

    // Logging defaults
    pub fn log_level() -> String {
        "info".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.rotator.default_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_threshold_out_of_range() {
        let mut config = Config::default();
        config.rotator.min_video_play_visibility = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_shrinking_backoff() {
        let mut config = Config::default();
        config.rotator.backoff_factor = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            [rotator]
            api = "https://ads.example.com/api/v1/ad"
            default_interval_ms = 10000
            "#,
        )
        .unwrap();
        assert_eq!(config.rotator.default_interval_ms, 10_000);
        assert_eq!(config.rotator.max_retries, 2);
        assert_eq!(config.rotator.recently_shown_limit, 20);
        assert!(config.analytics.enabled);
    }

    #[test]
    fn analytics_url_resolves_against_api_origin() {
        let mut config = Config::default();
        config.rotator.api = "https://ads.example.com/api/v1/ad?count=1".into();
        assert_eq!(
            config.analytics_url().unwrap().as_str(),
            "https://ads.example.com/api/v1/ad/event"
        );

        config.analytics.endpoint = "https://events.example.com/collect".into();
        assert_eq!(
            config.analytics_url().unwrap().as_str(),
            "https://events.example.com/collect"
        );
    }

    #[test]
    fn load_or_default_survives_missing_file() {
        let config = Config::load_or_default("/nonexistent/adrotor.toml");
        assert_eq!(config.rotator.slot_selector, ".ad-banner");
    }
}
