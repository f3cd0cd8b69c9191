//! Summary statistics over the sample log

use crate::log::LogContents;
use serde::{Deserialize, Serialize};

/// Summary of every row currently in the log.
///
/// `None` means unavailable (no rows, or no values in that column); it is never
/// reported as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregates {
    pub rows: usize,
    pub avg_download: Option<f64>,
    pub max_download: Option<f64>,
    pub min_upload: Option<f64>,
    pub avg_latency: Option<f64>,
    pub avg_jitter: Option<f64>,
    pub avg_packet_loss: Option<f64>,
    /// Mean of the download and upload standard deviations; needs two rows
    pub stability_index: Option<f64>,
}

impl Aggregates {
    pub fn compute(contents: &LogContents) -> Self {
        let samples = &contents.samples;
        let downloads: Vec<f64> = samples.iter().map(|s| s.download_mbps).collect();
        let uploads: Vec<f64> = samples.iter().map(|s| s.upload_mbps).collect();
        let pings: Vec<f64> = samples.iter().map(|s| s.ping_ms).collect();
        let jitters: Vec<f64> = samples.iter().map(|s| s.jitter_ms).collect();

        let avg_packet_loss = if contents.has_packet_loss {
            let losses: Vec<f64> = samples.iter().filter_map(|s| s.packet_loss_pct).collect();
            mean(&losses)
        } else {
            None
        };

        let stability_index = match (sample_stddev(&downloads), sample_stddev(&uploads)) {
            (Some(down), Some(up)) => Some((down + up) / 2.0),
            _ => None,
        };

        Self {
            rows: samples.len(),
            avg_download: mean(&downloads),
            max_download: max(&downloads),
            min_upload: min(&uploads),
            avg_latency: mean(&pings),
            avg_jitter: mean(&jitters),
            avg_packet_loss,
            stability_index,
        }
    }
}

fn finite(values: &[f64]) -> impl Iterator<Item = f64> + '_ {
    values.iter().copied().filter(|v| v.is_finite())
}

pub fn mean(values: &[f64]) -> Option<f64> {
    let (sum, count) = finite(values).fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

pub fn max(values: &[f64]) -> Option<f64> {
    finite(values).reduce(f64::max)
}

pub fn min(values: &[f64]) -> Option<f64> {
    finite(values).reduce(f64::min)
}

/// Sample standard deviation (n - 1 denominator)
pub fn sample_stddev(values: &[f64]) -> Option<f64> {
    let vals: Vec<f64> = finite(values).collect();
    if vals.len() < 2 {
        return None;
    }

    let avg = vals.iter().sum::<f64>() / vals.len() as f64;
    let variance = vals.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (vals.len() - 1) as f64;

    Some(variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Sample;
    use chrono::NaiveDate;

    fn contents(rows: &[(f64, f64, f64)]) -> LogContents {
        let base = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        LogContents {
            samples: rows
                .iter()
                .enumerate()
                .map(|(i, &(down, up, ping))| Sample {
                    timestamp: base + chrono::Duration::seconds(30 * i as i64),
                    download_mbps: down,
                    upload_mbps: up,
                    ping_ms: ping,
                    jitter_ms: 0.0,
                    packet_loss_pct: None,
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_log_is_unavailable() {
        let agg = Aggregates::compute(&LogContents::default());

        assert_eq!(agg.rows, 0);
        assert_eq!(agg.avg_download, None);
        assert_eq!(agg.max_download, None);
        assert_eq!(agg.min_upload, None);
        assert_eq!(agg.avg_latency, None);
        assert_eq!(agg.avg_packet_loss, None);
        assert_eq!(agg.stability_index, None);
    }

    #[test]
    fn test_summary_values() {
        let agg = Aggregates::compute(&contents(&[
            (10.0, 4.0, 20.0),
            (20.0, 6.0, 30.0),
            (30.0, 2.0, 10.0),
        ]));

        assert_eq!(agg.avg_download, Some(20.0));
        assert_eq!(agg.max_download, Some(30.0));
        assert_eq!(agg.min_upload, Some(2.0));
        assert_eq!(agg.avg_latency, Some(20.0));
        // stddev(download) = 10, stddev(upload) = 2
        assert_eq!(agg.stability_index, Some(6.0));
    }

    #[test]
    fn test_stability_needs_two_rows() {
        let agg = Aggregates::compute(&contents(&[(10.0, 4.0, 20.0)]));
        assert_eq!(agg.stability_index, None);
        assert_eq!(agg.avg_download, Some(10.0));
    }

    #[test]
    fn test_packet_loss_absent_column_is_unavailable() {
        let mut log = contents(&[(10.0, 4.0, 20.0), (12.0, 5.0, 22.0)]);
        log.samples[0].packet_loss_pct = Some(1.0);
        assert_eq!(Aggregates::compute(&log).avg_packet_loss, None);

        log.has_packet_loss = true;
        assert_eq!(Aggregates::compute(&log).avg_packet_loss, Some(1.0));
    }

    #[test]
    fn test_nan_latency_is_skipped() {
        let agg = Aggregates::compute(&contents(&[(10.0, 4.0, f64::NAN), (12.0, 5.0, 30.0)]));
        assert_eq!(agg.avg_latency, Some(30.0));

        let agg = Aggregates::compute(&contents(&[(10.0, 4.0, f64::NAN)]));
        assert_eq!(agg.avg_latency, None);
    }
}
