use axum::body::Body as AxumBody;
use hyper::{Request, Response};
use thiserror::Error;

/// Error type for HTTP handler operations
///
/// These never reach the caller as-is; the router boundary renders an oversized
/// body as 413 and everything else as a plain 500.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HandlerError {
    /// The inbound body could not be read or is not JSON
    #[error("Request handling error: {0}")]
    RequestError(String),
    /// The inbound body is larger than the configured limit
    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// HttpHandler defines the port for handling HTTP requests
pub trait HttpHandler: Send + Sync + 'static {
    /// Handle an incoming HTTP request
    ///
    /// # Arguments
    /// * `req` - The HTTP request to handle
    ///
    /// # Returns
    /// A future that resolves to an HTTP response or an error
    fn handle_request(
        &self,
        req: Request<AxumBody>,
    ) -> impl std::future::Future<Output = Result<Response<AxumBody>, HandlerError>> + Send;
}
