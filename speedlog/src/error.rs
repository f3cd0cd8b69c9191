//! Error types for sampling, log access and alert delivery

use std::time::Duration;
use thiserror::Error;

/// The measurement provider could not produce a result for this tick
#[derive(Error, Debug)]
pub enum MeasurementError {
    #[error("No reachable endpoint")]
    NoEndpoint,

    #[error("Request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },

    #[error("Measurement timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid measurement: {0}")]
    Invalid(String),
}

/// Reading or appending the sample log failed
#[derive(Error, Debug)]
pub enum LogError {
    #[error("Log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Log header is missing required column {0:?}")]
    MissingColumn(&'static str),
}

/// A single malformed row; the row is skipped and counted
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Malformed row at line {line}: {reason}")]
pub struct LogParseError {
    pub line: u64,
    pub reason: String,
}

/// An alert sink failed to deliver; logged and dropped
#[derive(Error, Debug)]
pub enum AlertDeliveryError {
    #[error("Alert sink is not configured: {0}")]
    NotConfigured(String),

    #[error("Alert transport failed: {0}")]
    Transport(String),

    #[error("Alert rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Failure of one sampler tick
#[derive(Error, Debug)]
pub enum SampleError {
    #[error("Measurement failed: {0}")]
    Measurement(#[from] MeasurementError),

    #[error("Failed to append sample: {0}")]
    Storage(#[from] LogError),
}

/// The configuration file could not be used
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
