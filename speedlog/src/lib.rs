//! Speedwatch sampling library
//!
//! Shared definitions for the speedwatch sampler and dashboard.
//! This includes the sample model, the CSV log both processes communicate through,
//! and the aggregation and alerting pipeline that runs on top of it.

pub mod aggregator;
pub mod alert;
pub mod config;
pub mod constants;
pub mod error;
pub mod filter;
pub mod jitter;
pub mod log;
pub mod provider;
pub mod sample;
pub mod sampler;
pub mod schedule;
pub mod sink;
pub mod stats;

pub use aggregator::{Aggregator, Snapshot, ViewStatus};
pub use alert::{Alert, AlertState, Metric, ThresholdConfig};
pub use config::{ChartType, Config};
pub use constants::*;
pub use error::{
    AlertDeliveryError, ConfigError, LogError, LogParseError, MeasurementError, SampleError,
};
pub use filter::TimeRange;
pub use jitter::PingHistory;
pub use log::{LogContents, SampleLog};
pub use provider::{EndpointHandle, MeasurementProvider};
pub use sample::Sample;
pub use sampler::Sampler;
pub use schedule::{shutdown_channel, Shutdown, ShutdownTrigger, Ticker};
pub use sink::{AlertDispatcher, AlertSink};
pub use stats::Aggregates;
