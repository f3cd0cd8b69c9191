//! Ping history and jitter calculation

/// Every ping observed by the sampler process, in order.
///
/// Lives as long as the sampler; jitter is computed over the full history.
#[derive(Debug, Default, Clone)]
pub struct PingHistory {
    pings: Vec<f64>,
}

impl PingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, ping_ms: f64) {
        self.pings.push(ping_ms);
    }

    /// Mean absolute difference between consecutive pings, 0 with fewer than two
    pub fn jitter(&self) -> f64 {
        if self.pings.len() < 2 {
            return 0.0;
        }

        let total: f64 = self
            .pings
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).abs())
            .sum();

        total / (self.pings.len() - 1) as f64
    }

    pub fn len(&self) -> usize {
        self.pings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_needs_two_pings() {
        let mut history = PingHistory::new();
        assert_eq!(history.jitter(), 0.0);

        history.record(10.0);
        assert_eq!(history.jitter(), 0.0);
    }

    #[test]
    fn test_jitter_is_mean_successive_difference() {
        let mut history = PingHistory::new();
        let mut seen = Vec::new();
        for ping in [10.0, 12.0, 9.0] {
            history.record(ping);
            seen.push(history.jitter());
        }

        assert_eq!(seen, vec![0.0, 2.0, 2.5]);
        assert_eq!(history.len(), 3);
    }
}
