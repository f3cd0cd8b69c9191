//! Alert sinks: log-only, JSON webhook, and Twilio SMS

use async_trait::async_trait;
use reqwest::Client;
use speedlog::config::{AlertsConfig, SinkKind, TwilioConfig};
use speedlog::{AlertDeliveryError, AlertSink};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const TWILIO_API_BASE: &str = "https://api.twilio.com";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

pub fn build_sink(config: &AlertsConfig) -> Result<Arc<dyn AlertSink>, AlertDeliveryError> {
    match config.sink {
        SinkKind::Log => Ok(Arc::new(LogSink)),
        SinkKind::Webhook => {
            let url = config.webhook_url.clone().ok_or_else(|| {
                AlertDeliveryError::NotConfigured("alerts.webhook_url is required".into())
            })?;
            Ok(Arc::new(WebhookSink::new(url)?))
        }
        SinkKind::Twilio => {
            let twilio = config.twilio.clone().ok_or_else(|| {
                AlertDeliveryError::NotConfigured("[alerts.twilio] section is required".into())
            })?;
            Ok(Arc::new(TwilioSink::new(twilio)?))
        }
    }
}

fn http_client() -> Result<Client, AlertDeliveryError> {
    Client::builder()
        .timeout(SEND_TIMEOUT)
        .build()
        .map_err(|e| AlertDeliveryError::Transport(e.to_string()))
}

async fn check_response(response: reqwest::Response) -> Result<(), AlertDeliveryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    Err(AlertDeliveryError::Rejected {
        status: status.as_u16(),
        body,
    })
}

/// Writes alerts to the application log only
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn send_alert(&self, message: &str) -> Result<(), AlertDeliveryError> {
        warn!(target: "speedwatch::alerts", "{}", message);
        Ok(())
    }
}

/// POSTs `{"text": message}` to a URL (Slack/Mattermost incoming-webhook shape)
pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: String) -> Result<Self, AlertDeliveryError> {
        Ok(Self {
            client: http_client()?,
            url,
        })
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send_alert(&self, message: &str) -> Result<(), AlertDeliveryError> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "text": message }))
            .send()
            .await
            .map_err(|e| AlertDeliveryError::Transport(e.to_string()))?;

        check_response(response).await
    }
}

/// Sends alerts as SMS through the Twilio Messages API
pub struct TwilioSink {
    client: Client,
    config: TwilioConfig,
    api_base: String,
}

impl TwilioSink {
    pub fn new(config: TwilioConfig) -> Result<Self, AlertDeliveryError> {
        Ok(Self {
            client: http_client()?,
            config,
            api_base: TWILIO_API_BASE.to_string(),
        })
    }

    #[cfg(test)]
    fn with_api_base(mut self, api_base: String) -> Self {
        self.api_base = api_base;
        self
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.config.account_sid
        )
    }
}

#[async_trait]
impl AlertSink for TwilioSink {
    fn name(&self) -> &str {
        "twilio"
    }

    async fn send_alert(&self, message: &str) -> Result<(), AlertDeliveryError> {
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", self.config.to.as_str()),
                ("From", self.config.from.as_str()),
                ("Body", message),
            ])
            .send()
            .await
            .map_err(|e| AlertDeliveryError::Transport(e.to_string()))?;

        check_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Accept one request, reply with `status`, and hand back the raw request text
    async fn capture_one(status: u16) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut tmp = [0u8; 4096];

            loop {
                let n = stream.read(&mut tmp).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&tmp[..n]);

                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
                        .and_then(|v| v.parse::<usize>().ok())
                        .unwrap_or(0);
                    if buf.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 {} Test\r\nContent-Length: 4\r\nConnection: close\r\n\r\nnope",
                status
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = tx.send(String::from_utf8_lossy(&buf).to_string());
        });

        (format!("http://{}", addr), rx)
    }

    #[tokio::test]
    async fn test_webhook_posts_message() {
        let (url, request) = capture_one(200).await;
        let sink = WebhookSink::new(format!("{}/hook", url)).unwrap();

        sink.send_alert("Low Download Speed: 4.00 Mbps").await.unwrap();

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /hook"));
        assert!(request.contains(r#"{"text":"Low Download Speed: 4.00 Mbps"}"#));
    }

    #[tokio::test]
    async fn test_webhook_rejection() {
        let (url, _request) = capture_one(500).await;
        let sink = WebhookSink::new(url).unwrap();

        let err = sink.send_alert("x").await.unwrap_err();
        assert!(matches!(err, AlertDeliveryError::Rejected { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_twilio_form_request() {
        let (url, request) = capture_one(201).await;
        let sink = TwilioSink::new(TwilioConfig {
            account_sid: "AC123".into(),
            auth_token: "token".into(),
            from: "+15550000000".into(),
            to: "+15551111111".into(),
        })
        .unwrap()
        .with_api_base(url);

        sink.send_alert("Low Upload Speed: 1.00 Mbps").await.unwrap();

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /2010-04-01/Accounts/AC123/Messages.json"));
        assert!(request.to_ascii_lowercase().contains("authorization: basic"));
        assert!(request.contains("Body=Low+Upload+Speed%3A+1.00+Mbps"));
        assert!(request.contains("To=%2B15551111111"));
    }

    #[test]
    fn test_build_sink_requires_settings() {
        let config = AlertsConfig {
            sink: SinkKind::Webhook,
            ..Default::default()
        };
        assert!(matches!(
            build_sink(&config),
            Err(AlertDeliveryError::NotConfigured(_))
        ));

        let sink = build_sink(&AlertsConfig::default()).unwrap();
        assert_eq!(sink.name(), "log");
    }
}
