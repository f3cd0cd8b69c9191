//! Edge-triggered threshold alerts

use crate::constants::{DEFAULT_DOWNLOAD_THRESHOLD_MBPS, DEFAULT_UPLOAD_THRESHOLD_MBPS};
use crate::sample::Sample;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operator-set floor values, in Mbps
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default = "default_download_threshold")]
    pub download_mbps: f64,
    #[serde(default = "default_upload_threshold")]
    pub upload_mbps: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            download_mbps: DEFAULT_DOWNLOAD_THRESHOLD_MBPS,
            upload_mbps: DEFAULT_UPLOAD_THRESHOLD_MBPS,
        }
    }
}

fn default_download_threshold() -> f64 {
    DEFAULT_DOWNLOAD_THRESHOLD_MBPS
}

fn default_upload_threshold() -> f64 {
    DEFAULT_UPLOAD_THRESHOLD_MBPS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Download,
    Upload,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Download => write!(f, "Download"),
            Metric::Upload => write!(f, "Upload"),
        }
    }
}

/// A threshold crossing, fired once per transition below the floor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub metric: Metric,
    pub value_mbps: f64,
    pub threshold_mbps: f64,
    /// Timestamp of the sample that crossed the threshold
    pub sample_timestamp: NaiveDateTime,
    pub message: String,
}

impl Alert {
    fn new(metric: Metric, value_mbps: f64, threshold_mbps: f64, at: NaiveDateTime) -> Self {
        Self {
            metric,
            value_mbps,
            threshold_mbps,
            sample_timestamp: at,
            message: format!("Low {} Speed: {:.2} Mbps", metric, value_mbps),
        }
    }
}

/// Per-metric trigger flags.
///
/// Process-scoped: starts untriggered and is never persisted. An alert fires on the
/// transition from at/above threshold to below it; staying below does not re-fire,
/// and recovering resets silently.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AlertState {
    pub download_triggered: bool,
    pub upload_triggered: bool,
}

impl AlertState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate the most recent sample against the current thresholds
    pub fn evaluate(&mut self, latest: &Sample, thresholds: &ThresholdConfig) -> Vec<Alert> {
        let mut alerts = Vec::new();

        if let Some(alert) = step(
            &mut self.download_triggered,
            Metric::Download,
            latest.download_mbps,
            thresholds.download_mbps,
            latest.timestamp,
        ) {
            alerts.push(alert);
        }

        if let Some(alert) = step(
            &mut self.upload_triggered,
            Metric::Upload,
            latest.upload_mbps,
            thresholds.upload_mbps,
            latest.timestamp,
        ) {
            alerts.push(alert);
        }

        alerts
    }

    pub fn is_triggered(&self, metric: Metric) -> bool {
        match metric {
            Metric::Download => self.download_triggered,
            Metric::Upload => self.upload_triggered,
        }
    }
}

fn step(
    triggered: &mut bool,
    metric: Metric,
    value: f64,
    threshold: f64,
    at: NaiveDateTime,
) -> Option<Alert> {
    if value < threshold {
        if *triggered {
            return None;
        }
        *triggered = true;
        Some(Alert::new(metric, value, threshold, at))
    } else {
        *triggered = false;
        None
    }
}
