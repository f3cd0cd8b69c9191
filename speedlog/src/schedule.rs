//! Timer-driven ticks with cooperative shutdown

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Interval, MissedTickBehavior};

/// Create a linked trigger / signal pair
pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

/// Owner side: request shutdown. Dropping the trigger also shuts down.
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown was requested or the trigger went away
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Fixed-period tick source.
///
/// The first tick fires immediately. A tick whose work overruns the period is not
/// made up with a burst; the next one is scheduled a full period later.
pub struct Ticker {
    interval: Interval,
    shutdown: Shutdown,
}

impl Ticker {
    pub fn new(period: Duration, shutdown: Shutdown) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, shutdown }
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }

    pub fn shutdown_signal(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Wait for the next tick. Returns false once shutdown is requested.
    pub async fn tick(&mut self) -> bool {
        if self.shutdown.is_triggered() {
            return false;
        }

        tokio::select! {
            biased;
            _ = self.shutdown.wait() => false,
            _ = self.interval.tick() => true,
        }
    }

    /// Restart the period from now, e.g. after an out-of-band refresh
    pub fn reset(&mut self) {
        self.interval.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_first_tick_is_immediate() {
        let (_trigger, shutdown) = shutdown_channel();
        let mut ticker = Ticker::new(Duration::from_secs(60), shutdown);

        let started = Instant::now();
        assert!(ticker.tick().await);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_wait() {
        let (trigger, shutdown) = shutdown_channel();
        let mut ticker = Ticker::new(Duration::from_secs(60), shutdown);
        assert!(ticker.tick().await);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.trigger();
        });

        let started = Instant::now();
        assert!(!ticker.tick().await);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!ticker.tick().await);
    }

    #[tokio::test]
    async fn test_dropped_trigger_stops_ticker() {
        let (trigger, shutdown) = shutdown_channel();
        let mut ticker = Ticker::new(Duration::from_millis(10), shutdown);
        drop(trigger);

        assert!(!ticker.tick().await);
    }

    #[tokio::test]
    async fn test_ticks_follow_period() {
        let (_trigger, shutdown) = shutdown_channel();
        let mut ticker = Ticker::new(Duration::from_millis(20), shutdown);

        let started = Instant::now();
        for _ in 0..3 {
            assert!(ticker.tick().await);
        }
        assert!(started.elapsed() >= Duration::from_millis(40));
    }
}
