//! Best-effort delivery of anomalies to a remote HTTP collector.

use std::time::Duration;

use reqwest::Client;
use thiserror::Error;

use crate::detect::Anomaly;

/// Default request timeout for collector calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("collector request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("collector responded with status {0}")]
    Status(u16),
}

/// POSTs each anomaly as a JSON body to a fixed collector URL.
///
/// No retry and no queue: a failed delivery is returned to the caller, which
/// logs it and moves on.
pub struct Forwarder {
    client: Client,
    url: String,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ForwardError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ForwardError::Client)?;
        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Per-request timeout the client was built with.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn forward(&self, anomaly: &Anomaly) -> Result<(), ForwardError> {
        let resp = self
            .client
            .post(&self.url)
            .json(anomaly)
            .send()
            .await
            .map_err(ForwardError::Transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ForwardError::Status(status.as_u16()));
        }
        tracing::debug!(id = %anomaly.id, url = %self.url, "anomaly forwarded");
        Ok(())
    }
}
