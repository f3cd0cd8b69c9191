//! Log aggregation and threshold alerting for the live view

use crate::alert::{Alert, AlertState, ThresholdConfig};
use crate::filter::{SeriesPoint, TimeRange};
use crate::log::{LogContents, SampleLog};
use crate::sample::Sample;
use crate::stats::Aggregates;
use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewStatus {
    /// No samples yet (log missing or empty)
    Waiting,
    Live,
}

/// Read-only view handed to the presentation layer on every refresh
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub taken_at: NaiveDateTime,
    pub status: ViewStatus,
    pub aggregates: Aggregates,
    pub latest: Option<Sample>,
    pub time_range: TimeRange,
    pub filtered_series: Vec<SeriesPoint>,
    pub thresholds: ThresholdConfig,
    /// Alerts fired by this refresh
    pub alert_events: Vec<Alert>,
    pub skipped_rows: usize,
    pub warnings: Vec<String>,
}

/// Re-reads the whole log on every refresh; nothing is cached between reads
/// except the alert trigger flags.
pub struct Aggregator {
    log: SampleLog,
    alerts: AlertState,
    stale_after: Option<Duration>,
}

impl Aggregator {
    pub fn new(log: SampleLog) -> Self {
        Self {
            log,
            alerts: AlertState::new(),
            stale_after: None,
        }
    }

    /// Warn when the newest sample is older than this
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = Some(stale_after);
        self
    }

    pub fn alert_state(&self) -> &AlertState {
        &self.alerts
    }

    pub fn log(&self) -> &SampleLog {
        &self.log
    }

    pub fn refresh(
        &mut self,
        thresholds: &ThresholdConfig,
        range: &TimeRange,
        now: NaiveDateTime,
    ) -> Snapshot {
        let mut warnings = Vec::new();

        let contents = match self.log.read() {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Failed to read {:?}: {}", self.log.path(), e);
                warnings.push(format!("Cannot read log: {}", e));
                LogContents::default()
            }
        };

        if !contents.skipped.is_empty() {
            warnings.push(format!("{} malformed rows skipped", contents.skipped.len()));
        }
        if range.is_inverted() {
            warnings.push(format!(
                "Time range {} starts after it ends; no rows are shown",
                range
            ));
        }

        let aggregates = Aggregates::compute(&contents);
        let filtered_series = range.apply(&contents.samples);

        let Some(latest) = contents.latest().cloned() else {
            return Snapshot {
                taken_at: now,
                status: ViewStatus::Waiting,
                aggregates,
                latest: None,
                time_range: *range,
                filtered_series,
                thresholds: *thresholds,
                alert_events: Vec::new(),
                skipped_rows: contents.skipped.len(),
                warnings,
            };
        };

        let alert_events = self.alerts.evaluate(&latest, thresholds);
        for alert in &alert_events {
            warn!("ALERT: {}", alert.message);
        }

        if let Some(stale_after) = self.stale_after {
            if now - latest.timestamp > stale_after {
                warnings.push(format!(
                    "No new samples since {}; the sampler may be stopped or unable to write the log",
                    latest.timestamp
                ));
            }
        }

        debug!(
            "Refreshed view: {} rows, {} in range, {} alerts",
            aggregates.rows,
            filtered_series.len(),
            alert_events.len()
        );

        Snapshot {
            taken_at: now,
            status: ViewStatus::Live,
            aggregates,
            latest: Some(latest),
            time_range: *range,
            filtered_series,
            thresholds: *thresholds,
            alert_events,
            skipped_rows: contents.skipped.len(),
            warnings,
        }
    }
}
