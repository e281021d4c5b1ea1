//! Receipt retrieval and polling.
//!
//! The `/blob/accept` task completes asynchronously; its receipt is
//! fetched from a separate receipt endpoint, polled until available or
//! until the configured window closes. Cancellation is cooperative:
//! dropping the poll future aborts the wait immediately.

use async_trait::async_trait;
use creel_ucan::codec::CodecError;
use ipld_core::cid::Cid;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::channel::{ChannelError, ExecutionResponse};

/// Retry policy for receipt polling.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Pause between attempts.
    pub interval: Duration,

    /// Total time to keep polling before giving up.
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Fetches receipt bundles by task link.
#[async_trait]
pub trait ReceiptEndpoint {
    /// Fetch the receipt bundle for `task`, or `None` when the task has
    /// not completed yet.
    async fn fetch(&self, task: &Cid) -> Result<Option<ExecutionResponse>, ChannelError>;
}

/// A [`ReceiptEndpoint`] served over HTTP GET at
/// `{service}/receipt/{task}`.
#[derive(Debug, Clone)]
pub struct HttpReceiptEndpoint {
    url: Url,
    client: reqwest::Client,
}

impl HttpReceiptEndpoint {
    /// An endpoint rooted at the given service URL.
    #[must_use]
    pub fn new(service_url: Url) -> Self {
        Self {
            url: service_url,
            client: reqwest::Client::new(),
        }
    }

    fn receipt_url(&self, task: &Cid) -> Result<Url, ChannelError> {
        let mut url = self.url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ChannelError::Codec(CodecError::Encode(format!(
                    "service URL {} cannot carry a receipt path",
                    self.url
                )))
            })?
            .pop_if_empty()
            .extend(["receipt", &task.to_string()]);
        Ok(url)
    }
}

#[async_trait]
impl ReceiptEndpoint for HttpReceiptEndpoint {
    async fn fetch(&self, task: &Cid) -> Result<Option<ExecutionResponse>, ChannelError> {
        let url = self.receipt_url(task)?;
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::ACCEPTED {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        Ok(Some(ExecutionResponse::from_bytes(&bytes)?))
    }
}

/// Polls a [`ReceiptEndpoint`] until a task's receipt is available.
#[derive(Debug, Clone)]
pub struct ReceiptClient<E> {
    endpoint: E,
    config: PollConfig,
}

impl<E: ReceiptEndpoint + Sync> ReceiptClient<E> {
    /// A client polling `endpoint` under the given policy.
    pub fn new(endpoint: E, config: PollConfig) -> Self {
        Self { endpoint, config }
    }

    /// Poll until the receipt bundle for `task` is available.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptError::Timeout`] when the polling window closes
    /// without a receipt, or a [`ChannelError`] from the endpoint.
    pub async fn poll(&self, task: &Cid) -> Result<ExecutionResponse, ReceiptError> {
        let deadline = tokio::time::Instant::now() + self.config.timeout;
        loop {
            if let Some(bundle) = self.endpoint.fetch(task).await? {
                return Ok(bundle);
            }
            if tokio::time::Instant::now() + self.config.interval >= deadline {
                return Err(ReceiptError::Timeout {
                    task: *task,
                    waited: self.config.timeout,
                });
            }
            debug!(task = %task, "receipt not ready, waiting");
            tokio::time::sleep(self.config.interval).await;
        }
    }
}

/// Errors produced while polling for a receipt.
#[derive(Debug, Error)]
pub enum ReceiptError {
    /// The polling window closed without a receipt appearing.
    #[error("no receipt for task {task} within {waited:?}")]
    Timeout {
        /// The task polled for.
        task: Cid,
        /// How long the client waited.
        waited: Duration,
    },

    /// The endpoint failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}
