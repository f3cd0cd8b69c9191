//! Sample data structures

use crate::constants::BITS_PER_MEGABIT;
use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// One measurement, as stored in one log row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Local wall-clock capture time, second resolution
    pub timestamp: NaiveDateTime,

    pub download_mbps: f64,

    pub upload_mbps: f64,

    /// Latency reported by the provider in milliseconds
    pub ping_ms: f64,

    /// Mean absolute difference between consecutive pings seen so far
    pub jitter_ms: f64,

    /// Packet loss percentage (None if the provider does not report it)
    pub packet_loss_pct: Option<f64>,
}

impl Sample {
    /// Build a sample from raw provider output (throughput in bits per second)
    pub fn from_provider(
        timestamp: NaiveDateTime,
        download_bps: f64,
        upload_bps: f64,
        ping_ms: f64,
        jitter_ms: f64,
        packet_loss_pct: Option<f64>,
    ) -> Self {
        Self {
            timestamp: truncate_to_second(timestamp),
            download_mbps: download_bps / BITS_PER_MEGABIT,
            upload_mbps: upload_bps / BITS_PER_MEGABIT,
            ping_ms,
            jitter_ms,
            packet_loss_pct,
        }
    }
}

pub fn truncate_to_second(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_nanosecond(0).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_converts_bits_to_mbps() {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_milli_opt(12, 30, 15, 750)
            .unwrap();
        let sample = Sample::from_provider(ts, 95_500_000.0, 12_000_000.0, 14.2, 0.0, None);

        assert_eq!(sample.download_mbps, 95.5);
        assert_eq!(sample.upload_mbps, 12.0);
        assert_eq!(sample.timestamp.nanosecond(), 0);
        assert_eq!(sample.timestamp.second(), 15);
    }
}
