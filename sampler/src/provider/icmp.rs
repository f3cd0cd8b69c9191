//! ICMP latency probing

use anyhow::{Context, Result};
use std::net::IpAddr;
use std::time::Duration;
use surge_ping::{Client, Config as PingConfig, PingIdentifier, PingSequence};
use tracing::debug;

/// Outcome of a burst of echo requests to one host
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResult {
    /// Mean round trip of the replies that came back
    pub avg_rtt_ms: Option<f64>,
    pub loss_pct: f64,
}

pub struct IcmpProbe {
    client: Client,
    count: u32,
    timeout: Duration,
}

impl IcmpProbe {
    pub fn new(count: u32, timeout: Duration) -> Result<Self> {
        let ping_config = PingConfig::default();
        let client = Client::new(&ping_config)
            .context("Failed to create ICMP client (CAP_NET_RAW required)")?;

        Ok(Self {
            client,
            count,
            timeout,
        })
    }

    /// Ping `host` `count` times; resolves hostnames to their first IPv4 address
    pub async fn probe(&self, host: &str) -> Result<ProbeResult> {
        let target = resolve_ipv4(host).await?;
        let payload = [0u8; 56]; // Standard ping payload size
        let mut pinger = self.client.pinger(target, PingIdentifier(rand::random())).await;

        let mut rtts = Vec::new();
        for seq in 0..self.count {
            match tokio::time::timeout(self.timeout, pinger.ping(PingSequence(seq as u16), &payload)).await {
                Ok(Ok((_packet, duration))) => {
                    let rtt_ms = duration.as_secs_f64() * 1000.0; // Convert to milliseconds
                    debug!("ICMP {} seq {} -> {:.2}ms", target, seq, rtt_ms);
                    rtts.push(rtt_ms);
                }
                Ok(Err(e)) => debug!("ICMP {} seq {} -> error: {}", target, seq, e),
                Err(_) => debug!("ICMP {} seq {} -> timeout after {:?}", target, seq, self.timeout),
            }
        }

        Ok(summarize(&rtts, self.count))
    }
}

fn summarize(rtts: &[f64], sent: u32) -> ProbeResult {
    let avg_rtt_ms = if rtts.is_empty() {
        None
    } else {
        Some(rtts.iter().sum::<f64>() / rtts.len() as f64)
    };
    let lost = sent.saturating_sub(rtts.len() as u32);
    let loss_pct = if sent == 0 {
        0.0
    } else {
        lost as f64 / sent as f64 * 100.0
    };

    ProbeResult {
        avg_rtt_ms,
        loss_pct,
    }
}

async fn resolve_ipv4(host: &str) -> Result<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    tokio::net::lookup_host((host, 0))
        .await
        .with_context(|| format!("Failed to resolve {}", host))?
        .map(|addr| addr.ip())
        .find(|ip| ip.is_ipv4())
        .ok_or_else(|| anyhow::anyhow!("No IPv4 address found for {}", host))
}
