//! Measurement provider interface

use crate::error::MeasurementError;
use async_trait::async_trait;
use std::fmt;

/// Opaque reference to the endpoint a provider selected for this tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointHandle {
    /// Provider-specific address (URL, host, server id)
    pub address: String,
    /// Human-readable name for logging
    pub name: String,
}

impl EndpointHandle {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for EndpointHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// Something that can run a speed test.
///
/// Throughput is reported in bits per second; the sampler converts to Mbps.
#[async_trait]
pub trait MeasurementProvider: Send {
    async fn select_best_endpoint(&mut self) -> Result<EndpointHandle, MeasurementError>;

    async fn measure_download(&mut self, endpoint: &EndpointHandle) -> Result<f64, MeasurementError>;

    async fn measure_upload(&mut self, endpoint: &EndpointHandle) -> Result<f64, MeasurementError>;

    /// Latency observed while selecting the endpoint, in milliseconds
    fn last_ping_ms(&self) -> f64;

    /// Packet loss observed during the last test, if the provider measures it
    fn packet_loss_pct(&self) -> Option<f64> {
        None
    }
}
