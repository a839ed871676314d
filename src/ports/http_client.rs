use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderValue, StatusCode};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Custom error type for upstream client operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum UpstreamError {
    /// The cancellation token fired before the exchange completed
    #[error("Upstream request was cancelled")]
    Cancelled,

    /// Error when the request could not be built (e.g. the target is not a URI)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Error when connecting to, or talking to, the backend fails
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type alias for upstream client operations
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// A fully read upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    /// `Content-Type` exactly as the backend sent it, if it sent one
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

/// UpstreamClient defines the port (interface) for the single outbound call
/// made per inbound request
#[async_trait]
pub trait UpstreamClient: Send + Sync + 'static {
    /// POST a JSON body to `url` and read the full response
    ///
    /// # Arguments
    /// * `url` - Absolute target URL
    /// * `body` - Serialized JSON payload, sent with `Content-Type: application/json`
    /// * `cancel` - Token whose cancellation aborts the whole exchange
    ///
    /// # Returns
    /// The upstream response for any status code, or an error when no
    /// response could be obtained
    async fn post_json(
        &self,
        url: &str,
        body: Bytes,
        cancel: CancellationToken,
    ) -> UpstreamResult<UpstreamResponse>;
}
