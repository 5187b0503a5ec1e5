//! Downlink transport for sending encoded payloads to devices.
//!
//! The gateway is store-and-forward: a successful send only means the
//! payload was accepted for delivery, not that the device executed it.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::TransportError;

/// Transport boundary used by the dispatcher.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Hand a payload to the delivery path.
    ///
    /// Returns `Ok(false)` when the payload was not accepted (timeout,
    /// rejected, unreachable). `Err` is reserved for faults that make the
    /// transport itself unusable.
    async fn send(&self, device_id: &str, payload: Bytes) -> Result<bool, TransportError>;
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpGatewayConfig {
    /// Gateway base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token (optional)
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for HttpGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Request body posted to the gateway.
#[derive(Debug, Serialize)]
struct GatewayRequest<'a> {
    device_id: &'a str,
    /// Base64 of the raw payload bytes
    payload: String,
}

/// Transport that posts payloads to the device gateway over HTTP.
pub struct HttpGatewayTransport {
    config: HttpGatewayConfig,
    base_url: Url,
    client: Client,
}

impl HttpGatewayTransport {
    /// Create a new HTTP gateway transport.
    pub fn new(config: HttpGatewayConfig) -> Result<Self, TransportError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| TransportError::InvalidEndpoint(format!("{}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::InvalidEndpoint(config.base_url.clone()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TransportError::Other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            base_url,
            client,
        })
    }

    pub fn config(&self) -> &HttpGatewayConfig {
        &self.config
    }

    /// Build the command URL for a device. The device id is percent-encoded
    /// as a single path segment.
    pub fn command_url(&self, device_id: &str) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidEndpoint(self.config.base_url.clone()))?
            .pop_if_empty()
            .extend(["devices", device_id, "commands"]);
        Ok(url)
    }
}

#[async_trait]
impl DeviceTransport for HttpGatewayTransport {
    async fn send(&self, device_id: &str, payload: Bytes) -> Result<bool, TransportError> {
        let url = self.command_url(device_id)?;
        let body = GatewayRequest {
            device_id,
            payload: BASE64.encode(&payload),
        };

        let mut request = self.client.post(url.clone()).json(&body);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                debug!(
                    device_id = %device_id,
                    bytes = payload.len(),
                    "Payload accepted by gateway"
                );
                Ok(true)
            }
            Ok(response) => {
                warn!(
                    device_id = %device_id,
                    status = %response.status(),
                    "Gateway rejected payload"
                );
                Ok(false)
            }
            Err(e) if e.is_builder() => Err(TransportError::Request(e.to_string())),
            Err(e) => {
                warn!(device_id = %device_id, url = %url, "Gateway send failed: {}", e);
                Ok(false)
            }
        }
    }
}
