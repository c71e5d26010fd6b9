//! HTTP client transport for envelope exchanges.

use std::time::Duration;

use protocol::{Envelope, ProtocolError, Result, Transport, TransportFuture};
use reqwest::Client;
use tracing::debug;

use crate::config::ClientConfig;
use crate::server::ErrorBody;

/// Posts sealed envelopes to a backend URL and returns the reply envelope.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    url: String,
}

impl HttpTransport {
    /// Create a transport posting to `url` with the given request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProtocolError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Create a transport from the `[client]` configuration section.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(config.backend_url.clone(), config.timeout())
    }

    /// The URL requests are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, request: Envelope) -> Result<Envelope> {
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ProtocolError::Transport(format!("cannot connect to {}: {}", self.url, e))
                } else {
                    ProtocolError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ProtocolError::Transport(e.to_string()))?;

        if !status.is_success() {
            let mut message = format!("unexpected response code: {}", status.as_u16());
            if let Ok(ErrorBody { error }) = serde_json::from_slice::<ErrorBody>(&body) {
                message.push_str(&format!(" ({})", error));
            }
            return Err(ProtocolError::Transport(message));
        }

        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(ProtocolError::Transport("empty response".to_string()));
        }

        let envelope: Envelope = serde_json::from_slice(&body)?;
        debug!(
            nonce = %envelope.nonce,
            cipher_text = %envelope.cipher_text,
            auth_tag = %envelope.auth_tag,
            "Received envelope"
        );
        Ok(envelope)
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: Envelope) -> TransportFuture<'_> {
        Box::pin(self.post(request))
    }
}
