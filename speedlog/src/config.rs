//! Configuration management
//!
//! One TOML file is shared by the sampler and the dashboard so both agree on the
//! log location and the sampling interval. Every field has a default.

use crate::alert::ThresholdConfig;
use crate::constants::*;
use crate::error::ConfigError;
use crate::filter::{parse_time_of_day, TimeRange};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub sampler: SamplerConfig,
    pub provider: ProviderConfig,
    pub dashboard: DashboardConfig,
    pub thresholds: ThresholdConfig,
    pub alerts: AlertsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub sample_interval_s: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Speed-test servers (base URLs); the one with the lowest latency is used
    pub endpoints: Vec<String>,
    pub download_bytes: u64,
    pub upload_bytes: u64,
    pub timeout_s: u64,
    pub ping_method: PingMethod,
    pub ping_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PingMethod {
    /// Round trip of a minimal HTTP request
    Http,
    /// ICMP echo (needs CAP_NET_RAW); also yields packet loss
    Icmp,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub refresh_interval_s: u64,
    /// `HH:MM:SS`; unset means start of day
    pub time_range_start: Option<String>,
    /// `HH:MM:SS`; unset means end of day
    pub time_range_end: Option<String>,
    pub chart_type: ChartType,
    /// Rows of the series shown in the terminal
    pub max_rows: usize,
    /// Defaults to three sample intervals
    pub stale_after_s: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    #[default]
    Line,
    Bar,
    Area,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub enabled: bool,
    pub sink: SinkKind,
    pub webhook_url: Option<String>,
    pub twilio: Option<TwilioConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Log,
    Webhook,
    Twilio,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Write logs here instead of stderr
    pub path: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_path: DEFAULT_LOG_PATH.to_string(),
        }
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            sample_interval_s: DEFAULT_SAMPLE_INTERVAL_S,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["https://speed.cloudflare.com".to_string()],
            download_bytes: 25_000_000,
            upload_bytes: 10_000_000,
            timeout_s: 30,
            ping_method: PingMethod::Http,
            ping_count: 4,
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            refresh_interval_s: DEFAULT_REFRESH_INTERVAL_S,
            time_range_start: None,
            time_range_end: None,
            chart_type: ChartType::Line,
            max_rows: 20,
            stale_after_s: None,
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sink: SinkKind::Log,
            webhook_url: None,
            twilio: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            path: None,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.as_ref().display().to_string(),
            source,
        })?;

        Self::parse(&contents)
    }

    /// Like [`Config::load`], but a missing file means defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load(&path) {
            Err(ConfigError::Read { source, .. }) if source.kind() == ErrorKind::NotFound => {
                warn!("Config file {:?} not found, using defaults", path.as_ref());
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampler.sample_interval_s == 0 {
            return Err(ConfigError::Invalid("sample_interval_s must be at least 1".into()));
        }
        if self.dashboard.refresh_interval_s == 0 {
            return Err(ConfigError::Invalid("refresh_interval_s must be at least 1".into()));
        }
        for (name, value) in [
            ("sample_interval_s", Some(self.sampler.sample_interval_s)),
            ("refresh_interval_s", Some(self.dashboard.refresh_interval_s)),
            ("stale_after_s", self.dashboard.stale_after_s),
        ] {
            if value.is_some_and(|v| v > MAX_INTERVAL_S) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be at most {}",
                    name, MAX_INTERVAL_S
                )));
            }
        }
        if self.provider.endpoints.is_empty() {
            return Err(ConfigError::Invalid("at least one provider endpoint is required".into()));
        }
        if self.provider.ping_count == 0 {
            return Err(ConfigError::Invalid("ping_count must be at least 1".into()));
        }
        for (name, value) in [
            ("download threshold", self.thresholds.download_mbps),
            ("upload threshold", self.thresholds.upload_mbps),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!("{} must be >= 0, got {}", name, value)));
            }
        }
        self.time_range()?;

        Ok(())
    }

    pub fn time_range(&self) -> Result<TimeRange, ConfigError> {
        let whole_day = TimeRange::default();
        let parse = |raw: &Option<String>, fallback| match raw {
            Some(raw) => parse_time_of_day(raw).map_err(ConfigError::Invalid),
            None => Ok(fallback),
        };

        Ok(TimeRange::new(
            parse(&self.dashboard.time_range_start, whole_day.start)?,
            parse(&self.dashboard.time_range_end, whole_day.end)?,
        ))
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sampler.sample_interval_s)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.dashboard.refresh_interval_s)
    }

    pub fn stale_after(&self) -> chrono::Duration {
        let secs = self
            .dashboard
            .stale_after_s
            .unwrap_or_else(|| self.sampler.sample_interval_s.saturating_mul(STALE_INTERVALS))
            .min(MAX_INTERVAL_S * STALE_INTERVALS);
        chrono::Duration::seconds(secs as i64)
    }
}

impl ChartType {
    /// Next type in line -> bar -> area order
    pub fn next(self) -> Self {
        match self {
            ChartType::Line => ChartType::Bar,
            ChartType::Bar => ChartType::Area,
            ChartType::Area => ChartType::Line,
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChartType::Line => write!(f, "line"),
            ChartType::Bar => write!(f, "bar"),
            ChartType::Area => write!(f, "area"),
        }
    }
}

impl FromStr for ChartType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "line" => Ok(ChartType::Line),
            "bar" => Ok(ChartType::Bar),
            "area" => Ok(ChartType::Area),
            other => Err(format!("Unknown chart type {:?}, expected line, bar or area", other)),
        }
    }
}
