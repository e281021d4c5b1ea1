//! The capability execution channel.
//!
//! Requests are UCAN containers (an invocation plus the delegations
//! backing it, or a bare receipt); responses are containers mixing the
//! receipts and sub-invocations the service produced while handling the
//! request.

use async_trait::async_trait;
use creel_ucan::{
    Command, Delegation, Did, Invocation, Receipt,
    codec::CodecError,
    container::{Container, Token},
};
use ipld_core::cid::Cid;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::blob::BlobAddress;
use crate::upload::UploadError;

/// The identity and location of a remote capability service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// The service's DID — the audience of invocations sent to it.
    pub id: Did,

    /// The service's HTTP endpoint.
    pub url: Url,
}

/// A container-shaped request to a capability service.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    container: Container,
}

impl ExecutionRequest {
    /// A request executing `invocation`, bundled with its proof chain
    /// and any extra delegations the service will need for derived
    /// tasks.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if a token fails to encode.
    pub fn invoke(
        invocation: &Invocation,
        proofs: &[Delegation],
        delegations: &[Delegation],
    ) -> Result<Self, CodecError> {
        let mut container = Container::default();
        container.push(invocation.to_bytes()?);
        for delegation in proofs.iter().chain(delegations) {
            container.push(delegation.to_bytes()?);
        }
        Ok(Self { container })
    }

    /// A request submitting a completion receipt.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the receipt fails to encode.
    pub fn submit_receipt(receipt: &Receipt) -> Result<Self, CodecError> {
        Ok(Self {
            container: Container::new(vec![receipt.to_bytes()?]),
        })
    }

    /// Encode the request to container bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        self.container.to_bytes()
    }
}

/// A decoded service response: the receipts and sub-invocations the
/// service delivered, in container order.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResponse {
    receipts: Vec<Receipt>,
    invocations: Vec<Invocation>,
}

impl ExecutionResponse {
    /// Assemble a response from already-decoded tokens. Mostly useful
    /// for fakes in tests; the wire path goes through [`from_bytes`].
    ///
    /// [`from_bytes`]: ExecutionResponse::from_bytes
    #[must_use]
    pub fn new(receipts: Vec<Receipt>, invocations: Vec<Invocation>) -> Self {
        Self {
            receipts,
            invocations,
        }
    }

    /// Decode a response from container bytes. Delegation tokens are
    /// tolerated and ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the container or a token fails to
    /// decode.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut response = Self::default();
        for token in Container::from_bytes(bytes)?.decode_tokens()? {
            match token {
                Token::Receipt(receipt) => response.receipts.push(receipt),
                Token::Invocation(invocation) => response.invocations.push(invocation),
                Token::Delegation(_) => {}
            }
        }
        Ok(response)
    }

    /// Encode this response to container bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if a token fails to encode.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut container = Container::default();
        for receipt in &self.receipts {
            container.push(receipt.to_bytes()?);
        }
        for invocation in &self.invocations {
            container.push(invocation.to_bytes()?);
        }
        container.to_bytes()
    }

    /// The receipts in this response.
    #[must_use]
    pub fn receipts(&self) -> &[Receipt] {
        &self.receipts
    }

    /// The invocations in this response.
    #[must_use]
    pub fn invocations(&self) -> &[Invocation] {
        &self.invocations
    }

    /// The receipt completing the task named by `task`, if any.
    #[must_use]
    pub fn receipt_for_task(&self, task: &Cid) -> Option<&Receipt> {
        self.receipts.iter().find(|receipt| receipt.ran() == task)
    }

    /// The first invocation for `command`, if any.
    #[must_use]
    pub fn find_invocation(&self, command: &Command) -> Option<&Invocation> {
        self.invocations
            .iter()
            .find(|invocation| invocation.command() == command)
    }

    /// The invocation whose content link is `link`, if any.
    #[must_use]
    pub fn invocation_with_link(&self, link: &Cid) -> Option<&Invocation> {
        self.invocations
            .iter()
            .find(|invocation| invocation.to_link().is_ok_and(|l| &l == link))
    }
}

/// Executes container requests against a capability service.
#[async_trait]
pub trait Channel {
    /// Send the request and decode the service's response.
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResponse, ChannelError>;
}

/// A [`Channel`] speaking DAG-CBOR containers over HTTP POST.
#[derive(Debug, Clone)]
pub struct HttpChannel {
    url: Url,
    client: reqwest::Client,
}

/// Content type of container payloads.
pub const DAG_CBOR_CONTENT_TYPE: &str = "application/vnd.ipld.dag-cbor";

impl HttpChannel {
    /// A channel POSTing containers to `url`.
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Channel for HttpChannel {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResponse, ChannelError> {
        debug!(url = %self.url, "executing request");
        let response = self
            .client
            .post(self.url.clone())
            .header(reqwest::header::CONTENT_TYPE, DAG_CBOR_CONTENT_TYPE)
            .body(request.to_bytes()?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        Ok(ExecutionResponse::from_bytes(&bytes)?)
    }
}

/// Errors produced while talking to a capability service.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The service answered with a non-2xx status.
    #[error("service returned status {status}: {body}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The response body, for diagnostics.
        body: String,
    },

    /// The request never completed.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// A container or token failed to encode or decode.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Performs the physical byte transfer of an upload.
#[async_trait]
pub trait BlobTransport {
    /// PUT `data` to the service-supplied address, with exactly the
    /// headers it specified.
    async fn put(&self, address: &BlobAddress, data: &[u8]) -> Result<(), UploadError>;
}

/// A [`BlobTransport`] using plain HTTP PUT.
#[derive(Debug, Clone, Default)]
pub struct HttpBlobTransport {
    client: reqwest::Client,
}

impl HttpBlobTransport {
    /// A transport with a fresh HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobTransport for HttpBlobTransport {
    async fn put(&self, address: &BlobAddress, data: &[u8]) -> Result<(), UploadError> {
        let mut request = self.client.put(address.url.clone()).body(data.to_vec());
        for (name, value) in &address.headers {
            request = request.header(name, value);
        }
        let response = request.send().await.map_err(ChannelError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::TransferFailed {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
