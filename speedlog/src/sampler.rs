//! Periodic speed-test sampling into the log

use crate::error::{MeasurementError, SampleError};
use crate::jitter::PingHistory;
use crate::log::SampleLog;
use crate::provider::MeasurementProvider;
use crate::sample::{truncate_to_second, Sample};
use crate::schedule::Ticker;
use chrono::NaiveDateTime;
use tracing::{debug, error, info, warn};

type Clock = Box<dyn Fn() -> NaiveDateTime + Send>;

/// Runs one speed test per tick and appends the result to the log.
///
/// Owns the ping history used for jitter; it lives as long as the sampler.
pub struct Sampler<P> {
    provider: P,
    log: SampleLog,
    history: PingHistory,
    last_timestamp: Option<NaiveDateTime>,
    clock: Clock,
}

impl<P: MeasurementProvider> Sampler<P> {
    pub fn new(provider: P, log: SampleLog) -> Self {
        Self {
            provider,
            log,
            history: PingHistory::new(),
            last_timestamp: None,
            clock: Box::new(|| chrono::Local::now().naive_local()),
        }
    }

    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> NaiveDateTime + Send + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    pub fn history(&self) -> &PingHistory {
        &self.history
    }

    /// Measure once and append exactly one row
    pub async fn tick(&mut self) -> Result<Sample, SampleError> {
        let sample = self.measure().await?;
        self.log.append(&sample)?;
        self.last_timestamp = Some(sample.timestamp);

        Ok(sample)
    }

    /// Tick until shutdown. A failed tick is logged and the next one runs on schedule.
    pub async fn run(&mut self, mut ticker: Ticker) {
        let mut shutdown = ticker.shutdown_signal();
        info!("Sampling every {:?} into {:?}", ticker.period(), self.log.path());

        while ticker.tick().await {
            let result = tokio::select! {
                biased;
                _ = shutdown.wait() => None,
                result = self.tick() => Some(result),
            };

            match result {
                None => break,
                Some(Ok(sample)) => info!(
                    "Sample: down {:.2} Mbps, up {:.2} Mbps, ping {:.2} ms, jitter {:.2} ms",
                    sample.download_mbps, sample.upload_mbps, sample.ping_ms, sample.jitter_ms
                ),
                Some(Err(SampleError::Measurement(e))) => {
                    warn!("Measurement failed, retrying next tick: {}", e)
                }
                Some(Err(e)) => error!("{}", e),
            }
        }

        info!("Sampler stopped after {} pings", self.history.len());
    }

    async fn measure(&mut self) -> Result<Sample, MeasurementError> {
        let endpoint = self.provider.select_best_endpoint().await?;
        debug!("Selected endpoint {}", endpoint);

        let download_bps = checked("download", self.provider.measure_download(&endpoint).await?)?;
        let upload_bps = checked("upload", self.provider.measure_upload(&endpoint).await?)?;
        let ping_ms = checked("ping", self.provider.last_ping_ms())?;
        let packet_loss_pct = match self.provider.packet_loss_pct() {
            Some(loss) => Some(checked("packet loss", loss)?),
            None => None,
        };

        self.history.record(ping_ms);

        Ok(Sample::from_provider(
            self.next_timestamp(),
            download_bps,
            upload_bps,
            ping_ms,
            self.history.jitter(),
            packet_loss_pct,
        ))
    }

    /// Wall-clock time, held at the previous sample's time if the clock stepped back
    fn next_timestamp(&self) -> NaiveDateTime {
        let now = truncate_to_second((self.clock)());
        match self.last_timestamp {
            Some(last) if now < last => {
                warn!("Clock moved backwards ({} < {}), reusing previous timestamp", now, last);
                last
            }
            _ => now,
        }
    }
}

fn checked(what: &str, value: f64) -> Result<f64, MeasurementError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(MeasurementError::Invalid(format!("{} reported {}", what, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::EndpointHandle;
    use crate::schedule::{shutdown_channel, ShutdownTrigger};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;

    /// (download bps, upload bps, ping ms), or None for an unreachable endpoint
    type Step = Option<(f64, f64, f64)>;

    struct ScriptedProvider {
        script: VecDeque<Step>,
        current: Option<(f64, f64, f64)>,
        when_done: Option<ShutdownTrigger>,
    }

    impl ScriptedProvider {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                script: steps.into(),
                current: None,
                when_done: None,
            }
        }
    }

    #[async_trait]
    impl MeasurementProvider for ScriptedProvider {
        async fn select_best_endpoint(&mut self) -> Result<EndpointHandle, MeasurementError> {
            match self.script.pop_front() {
                Some(Some(step)) => {
                    self.current = Some(step);
                    Ok(EndpointHandle::new("http://test", "test"))
                }
                Some(None) => Err(MeasurementError::NoEndpoint),
                None => {
                    if let Some(trigger) = &self.when_done {
                        trigger.trigger();
                    }
                    Err(MeasurementError::NoEndpoint)
                }
            }
        }

        async fn measure_download(&mut self, _: &EndpointHandle) -> Result<f64, MeasurementError> {
            Ok(self.current.map(|c| c.0).unwrap_or_default())
        }

        async fn measure_upload(&mut self, _: &EndpointHandle) -> Result<f64, MeasurementError> {
            Ok(self.current.map(|c| c.1).unwrap_or_default())
        }

        fn last_ping_ms(&self) -> f64 {
            self.current.map(|c| c.2).unwrap_or_default()
        }
    }

    fn step(down_mbps: f64, up_mbps: f64, ping: f64) -> Step {
        Some((down_mbps * 1_000_000.0, up_mbps * 1_000_000.0, ping))
    }

    #[tokio::test]
    async fn test_tick_appends_one_row() {
        let dir = TempDir::new().unwrap();
        let log = SampleLog::new(dir.path().join("network_log.csv"));
        let mut sampler = Sampler::new(ScriptedProvider::new(vec![step(94.2, 11.5, 13.0)]), log);

        let sample = sampler.tick().await.unwrap();
        assert!((sample.download_mbps - 94.2).abs() < 1e-9);
        assert_eq!(sample.jitter_ms, 0.0);

        let contents = SampleLog::new(dir.path().join("network_log.csv")).read().unwrap();
        assert_eq!(contents.samples.len(), 1);
        assert_eq!(contents.samples[0], sample);
    }

    #[tokio::test]
    async fn test_jitter_across_ticks() {
        let dir = TempDir::new().unwrap();
        let log = SampleLog::new(dir.path().join("network_log.csv"));
        let mut sampler = Sampler::new(
            ScriptedProvider::new(vec![
                step(50.0, 10.0, 10.0),
                step(50.0, 10.0, 12.0),
                step(50.0, 10.0, 9.0),
            ]),
            log,
        );

        let mut jitters = Vec::new();
        for _ in 0..3 {
            jitters.push(sampler.tick().await.unwrap().jitter_ms);
        }
        assert_eq!(jitters, vec![0.0, 2.0, 2.5]);
    }

    #[tokio::test]
    async fn test_failed_measurement_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("network_log.csv");
        let mut sampler = Sampler::new(
            ScriptedProvider::new(vec![None, step(50.0, 10.0, 10.0)]),
            SampleLog::new(&path),
        );

        let err = sampler.tick().await.unwrap_err();
        assert!(matches!(err, SampleError::Measurement(MeasurementError::NoEndpoint)));
        assert!(!path.exists());

        sampler.tick().await.unwrap();
        assert_eq!(SampleLog::new(&path).read().unwrap().samples.len(), 1);
    }

    #[tokio::test]
    async fn test_negative_reading_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut sampler = Sampler::new(
            ScriptedProvider::new(vec![Some((-1.0, 10.0, 10.0))]),
            SampleLog::new(dir.path().join("network_log.csv")),
        );

        let err = sampler.tick().await.unwrap_err();
        assert!(matches!(err, SampleError::Measurement(MeasurementError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_timestamps_never_go_backwards() {
        let dir = TempDir::new().unwrap();
        let times = Arc::new(Mutex::new(VecDeque::from(vec![
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(9, 0, 30).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(9, 0, 10).unwrap(),
        ])));
        let clock_times = times.clone();
        let mut sampler = Sampler::new(
            ScriptedProvider::new(vec![step(50.0, 10.0, 10.0), step(50.0, 10.0, 10.0)]),
            SampleLog::new(dir.path().join("network_log.csv")),
        )
        .with_clock(move || clock_times.lock().unwrap().pop_front().unwrap());

        let first = sampler.tick().await.unwrap();
        let second = sampler.tick().await.unwrap();
        assert_eq!(first.timestamp, second.timestamp);
    }

    #[tokio::test]
    async fn test_run_survives_failed_ticks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("network_log.csv");
        let (trigger, shutdown) = shutdown_channel();

        let mut provider = ScriptedProvider::new(vec![
            step(50.0, 10.0, 10.0),
            None,
            step(40.0, 9.0, 11.0),
        ]);
        provider.when_done = Some(trigger);

        let mut sampler = Sampler::new(provider, SampleLog::new(&path));
        let ticker = Ticker::new(Duration::from_millis(10), shutdown);

        tokio::time::timeout(Duration::from_secs(5), sampler.run(ticker))
            .await
            .expect("sampler should stop on shutdown");

        assert_eq!(SampleLog::new(&path).read().unwrap().samples.len(), 2);
    }
}
