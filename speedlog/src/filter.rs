//! Time-of-day filtering for the rendered series

use crate::constants::TIME_OF_DAY_FORMAT;
use crate::sample::Sample;
use chrono::{NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive time-of-day window `[start, end]`.
///
/// There is no wraparound past midnight: a window with `start > end` matches
/// nothing, whatever the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// One point of the download/upload series handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: NaiveDateTime,
    pub download_mbps: f64,
    pub upload_mbps: f64,
}

impl Default for TimeRange {
    /// The whole day
    fn default() -> Self {
        Self {
            start: NaiveTime::MIN,
            end: NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn is_inverted(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, ts: &NaiveDateTime) -> bool {
        let time = ts.time().with_nanosecond(0).unwrap_or(ts.time());
        self.start <= time && time <= self.end
    }

    pub fn apply(&self, samples: &[Sample]) -> Vec<SeriesPoint> {
        if self.is_inverted() {
            return Vec::new();
        }

        samples
            .iter()
            .filter(|s| self.contains(&s.timestamp))
            .map(|s| SeriesPoint {
                timestamp: s.timestamp,
                download_mbps: s.download_mbps,
                upload_mbps: s.upload_mbps,
            })
            .collect()
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}",
            self.start.format(TIME_OF_DAY_FORMAT),
            self.end.format(TIME_OF_DAY_FORMAT)
        )
    }
}

/// Parse `HH:MM:SS` or `HH:MM`
pub fn parse_time_of_day(raw: &str) -> Result<NaiveTime, String> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, TIME_OF_DAY_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| format!("Invalid time of day {:?}, expected HH:MM:SS", raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_at(h: u32, m: u32, s: u32) -> Sample {
        Sample {
            timestamp: NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(h, m, s)
                .unwrap(),
            download_mbps: 50.0,
            upload_mbps: 10.0,
            ping_ms: 12.0,
            jitter_ms: 0.0,
            packet_loss_pct: None,
        }
    }

    fn t(raw: &str) -> NaiveTime {
        parse_time_of_day(raw).unwrap()
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let range = TimeRange::new(t("09:00:00"), t("10:00:00"));
        let samples = vec![
            sample_at(8, 59, 59),
            sample_at(9, 0, 0),
            sample_at(9, 30, 0),
            sample_at(10, 0, 0),
            sample_at(10, 0, 1),
        ];

        let series = range.apply(&samples);
        assert_eq!(series.len(), 3);
        assert_eq!(series[0].timestamp, samples[1].timestamp);
        assert_eq!(series[2].timestamp, samples[3].timestamp);
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let range = TimeRange::new(t("09:00:00"), t("08:00:00"));
        let samples: Vec<Sample> = (0..24).map(|h| sample_at(h, 30, 0)).collect();

        assert!(range.is_inverted());
        assert!(range.apply(&samples).is_empty());
    }

    #[test]
    fn test_default_covers_whole_day() {
        let samples = vec![sample_at(0, 0, 0), sample_at(23, 59, 59)];
        assert_eq!(TimeRange::default().apply(&samples).len(), 2);
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!(t("07:15"), NaiveTime::from_hms_opt(7, 15, 0).unwrap());
        assert_eq!(t("07:15:42"), NaiveTime::from_hms_opt(7, 15, 42).unwrap());
        assert!(parse_time_of_day("25:00").is_err());
    }
}
