//! HTTP speed-test provider
//!
//! Speaks the simple download/upload protocol served by speed.cloudflare.com and
//! compatible servers:
//! - `GET  {base}/__down?bytes=N` returns N bytes
//! - `POST {base}/__up` accepts and discards the body

mod icmp;

pub use icmp::IcmpProbe;

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use speedlog::config::{PingMethod, ProviderConfig};
use speedlog::{EndpointHandle, MeasurementError, MeasurementProvider};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct SpeedTestProvider {
    config: Arc<ProviderConfig>,
    client: Client,
    icmp: Option<IcmpProbe>,
    upload_payload: Vec<u8>,
    last_ping_ms: f64,
    last_loss_pct: Option<f64>,
}

impl SpeedTestProvider {
    pub fn new(config: Arc<ProviderConfig>) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_s);
        let client = Client::builder().timeout(timeout).build()?;

        let icmp = match config.ping_method {
            PingMethod::Icmp => Some(IcmpProbe::new(config.ping_count, Duration::from_secs(2))?),
            PingMethod::Http => None,
        };

        let mut upload_payload = vec![0u8; config.upload_bytes as usize];
        rand::thread_rng().fill(&mut upload_payload[..]);

        info!(
            "Speed-test provider initialized with {} endpoints ({:?} latency probing)",
            config.endpoints.len(),
            config.ping_method
        );

        Ok(Self {
            config,
            client,
            icmp,
            upload_payload,
            last_ping_ms: 0.0,
            last_loss_pct: None,
        })
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_s)
    }

    /// Mean latency to `base` and, for ICMP, the loss seen while probing
    async fn probe(&self, base: &str) -> Result<(f64, Option<f64>), MeasurementError> {
        match &self.icmp {
            Some(icmp) => {
                let host = reqwest::Url::parse(base)
                    .ok()
                    .and_then(|url| url.host_str().map(str::to_string))
                    .ok_or_else(|| MeasurementError::Invalid(format!("no host in {}", base)))?;
                let result = icmp.probe(&host).await.map_err(|e| MeasurementError::Request {
                    endpoint: base.to_string(),
                    reason: e.to_string(),
                })?;
                match result.avg_rtt_ms {
                    Some(rtt) => Ok((rtt, Some(result.loss_pct))),
                    None => Err(MeasurementError::Request {
                        endpoint: base.to_string(),
                        reason: "no ICMP replies".to_string(),
                    }),
                }
            }
            None => {
                let mut rtts = Vec::new();
                for _ in 0..self.config.ping_count {
                    let started = Instant::now();
                    let response = self
                        .client
                        .get(format!("{}/__down?bytes=0", base))
                        .send()
                        .await
                        .and_then(|r| r.error_for_status())
                        .map_err(|e| self.request_error(base, e))?;
                    response.bytes().await.map_err(|e| self.request_error(base, e))?;
                    rtts.push(started.elapsed().as_secs_f64() * 1000.0);
                }
                let avg = rtts.iter().sum::<f64>() / rtts.len().max(1) as f64;
                Ok((avg, None))
            }
        }
    }

    fn request_error(&self, endpoint: &str, e: reqwest::Error) -> MeasurementError {
        if e.is_timeout() {
            MeasurementError::Timeout(self.timeout())
        } else {
            MeasurementError::Request {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl MeasurementProvider for SpeedTestProvider {
    async fn select_best_endpoint(&mut self) -> Result<EndpointHandle, MeasurementError> {
        let mut best: Option<(String, f64, Option<f64>)> = None;

        for endpoint in &self.config.endpoints {
            let base = endpoint.trim_end_matches('/');
            match self.probe(base).await {
                Ok((latency, loss)) => {
                    debug!("Endpoint {} latency {:.2}ms", base, latency);
                    if best.as_ref().map_or(true, |(_, l, _)| latency < *l) {
                        best = Some((base.to_string(), latency, loss));
                    }
                }
                Err(e) => warn!("Endpoint {} unreachable: {}", base, e),
            }
        }

        let (base, latency, loss) = best.ok_or(MeasurementError::NoEndpoint)?;
        self.last_ping_ms = latency;
        self.last_loss_pct = loss;

        let name = reqwest::Url::parse(&base)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| base.clone());

        Ok(EndpointHandle::new(base, name))
    }

    async fn measure_download(&mut self, endpoint: &EndpointHandle) -> Result<f64, MeasurementError> {
        let url = format!("{}/__down?bytes={}", endpoint.address, self.config.download_bytes);
        let started = Instant::now();

        let mut response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.request_error(&endpoint.address, e))?;

        let mut received: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.request_error(&endpoint.address, e))?
        {
            received += chunk.len() as u64;
        }

        let bps = bits_per_second(received, started.elapsed())?;
        debug!("Download from {}: {} bytes, {:.0} bit/s", endpoint, received, bps);
        Ok(bps)
    }

    async fn measure_upload(&mut self, endpoint: &EndpointHandle) -> Result<f64, MeasurementError> {
        let url = format!("{}/__up", endpoint.address);
        let sent = self.upload_payload.len() as u64;
        let started = Instant::now();

        let response = self
            .client
            .post(&url)
            .body(self.upload_payload.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.request_error(&endpoint.address, e))?;
        response
            .bytes()
            .await
            .map_err(|e| self.request_error(&endpoint.address, e))?;

        let bps = bits_per_second(sent, started.elapsed())?;
        debug!("Upload to {}: {} bytes, {:.0} bit/s", endpoint, sent, bps);
        Ok(bps)
    }

    fn last_ping_ms(&self) -> f64 {
        self.last_ping_ms
    }

    fn packet_loss_pct(&self) -> Option<f64> {
        self.last_loss_pct
    }
}

fn bits_per_second(bytes: u64, elapsed: Duration) -> Result<f64, MeasurementError> {
    let secs = elapsed.as_secs_f64();
    if bytes == 0 || secs <= 0.0 {
        return Err(MeasurementError::Invalid(format!(
            "transferred {} bytes in {:?}",
            bytes, elapsed
        )));
    }
    Ok(bytes as f64 * 8.0 / secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Minimal speed-test server: `__down?bytes=N` returns N bytes, anything else
    /// consumes the request body and returns an empty 200.
    async fn spawn_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(handle_connection(stream));
            }
        });

        format!("http://{}", addr)
    }

    async fn handle_connection(mut stream: TcpStream) {
        let mut tmp = [0u8; 8192];
        let mut buf = Vec::new();

        loop {
            let header_end = loop {
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
                match stream.read(&mut tmp).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => buf.extend_from_slice(&tmp[..n]),
                }
            };

            let head = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
            let content_length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);

            while buf.len() < header_end + content_length {
                match stream.read(&mut tmp).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => buf.extend_from_slice(&tmp[..n]),
                }
            }
            buf.drain(..header_end + content_length);

            let request_line = head.lines().next().unwrap_or_default();
            let body_len = request_line
                .split_whitespace()
                .nth(1)
                .and_then(|path| path.split("bytes=").nth(1))
                .and_then(|n| n.parse::<usize>().ok())
                .unwrap_or(0);

            let mut response = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", body_len).into_bytes();
            response.resize(response.len() + body_len, b'x');
            if stream.write_all(&response).await.is_err() {
                return;
            }
        }
    }

    async fn closed_endpoint() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    fn provider(endpoints: Vec<String>) -> SpeedTestProvider {
        SpeedTestProvider::new(Arc::new(ProviderConfig {
            endpoints,
            download_bytes: 200_000,
            upload_bytes: 100_000,
            timeout_s: 5,
            ping_method: PingMethod::Http,
            ping_count: 2,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_selects_reachable_endpoint() {
        let live = spawn_server().await;
        let dead = closed_endpoint().await;
        let mut provider = provider(vec![dead, format!("{}/", live)]);

        let endpoint = provider.select_best_endpoint().await.unwrap();
        assert_eq!(endpoint.address, live);
        assert_eq!(endpoint.name, "127.0.0.1");
        assert!(provider.last_ping_ms() > 0.0);
        assert_eq!(provider.packet_loss_pct(), None);
    }

    #[tokio::test]
    async fn test_no_endpoint_reachable() {
        let mut provider = provider(vec![closed_endpoint().await]);

        let err = provider.select_best_endpoint().await.unwrap_err();
        assert!(matches!(err, MeasurementError::NoEndpoint));
    }

    #[tokio::test]
    async fn test_measures_throughput() {
        let mut provider = provider(vec![spawn_server().await]);
        let endpoint = provider.select_best_endpoint().await.unwrap();

        let down = provider.measure_download(&endpoint).await.unwrap();
        let up = provider.measure_upload(&endpoint).await.unwrap();
        assert!(down > 0.0);
        assert!(up > 0.0);
    }

    #[test]
    fn test_bits_per_second() {
        let bps = bits_per_second(1_000_000, Duration::from_secs(2)).unwrap();
        assert_eq!(bps, 4_000_000.0);
        assert!(bits_per_second(0, Duration::from_secs(1)).is_err());
    }
}
