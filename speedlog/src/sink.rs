//! Alert delivery
//!
//! Sinks are fire-and-forget: the dispatcher hands each alert to a background task
//! and never waits for the outcome. Failures are logged and dropped.

use crate::alert::Alert;
use crate::error::AlertDeliveryError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Short name for logging ("log", "webhook", ...)
    fn name(&self) -> &str;

    async fn send_alert(&self, message: &str) -> Result<(), AlertDeliveryError>;
}

#[derive(Clone)]
pub struct AlertDispatcher {
    sink: Arc<dyn AlertSink>,
}

impl AlertDispatcher {
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self { sink }
    }

    /// Deliver in the background; returns immediately.
    ///
    /// The handle is only useful to tests; callers are free to drop it.
    pub fn dispatch(&self, alert: &Alert) -> JoinHandle<()> {
        let sink = self.sink.clone();
        let message = alert.message.clone();

        tokio::spawn(async move {
            match sink.send_alert(&message).await {
                Ok(()) => debug!("Alert delivered via {}: {}", sink.name(), message),
                Err(e) => warn!("Alert delivery via {} failed: {}", sink.name(), e),
            }
        })
    }

    pub fn dispatch_all(&self, alerts: &[Alert]) {
        for alert in alerts {
            self.dispatch(alert);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::Metric;
    use chrono::NaiveDate;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    struct SlowSink {
        delivered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AlertSink for SlowSink {
        fn name(&self) -> &str {
            "slow"
        }

        async fn send_alert(&self, message: &str) -> Result<(), AlertDeliveryError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            self.delivered.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl AlertSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        async fn send_alert(&self, _message: &str) -> Result<(), AlertDeliveryError> {
            Err(AlertDeliveryError::Transport("connection refused".into()))
        }
    }

    fn alert() -> Alert {
        Alert {
            metric: Metric::Download,
            value_mbps: 4.0,
            threshold_mbps: 10.0,
            sample_timestamp: NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            message: "Low Download Speed: 4.00 Mbps".into(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_does_not_block() {
        let sink = Arc::new(SlowSink {
            delivered: Mutex::new(Vec::new()),
        });
        let dispatcher = AlertDispatcher::new(sink.clone());

        let started = Instant::now();
        let handle = dispatcher.dispatch(&alert());
        assert!(started.elapsed() < Duration::from_millis(100));

        handle.await.unwrap();
        assert_eq!(
            *sink.delivered.lock().unwrap(),
            vec!["Low Download Speed: 4.00 Mbps".to_string()]
        );
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let dispatcher = AlertDispatcher::new(Arc::new(FailingSink));
        let handle = dispatcher.dispatch(&alert());

        // The task finishes normally; the error is only logged
        assert!(handle.await.is_ok());
    }
}
