use async_trait::async_trait;
use bytes::Bytes;
use eyre::Result;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, Uri, Version, header};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls_native_certs::load_native_certs;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::ports::http_client::{UpstreamClient, UpstreamError, UpstreamResponse, UpstreamResult};

const USER_AGENT: &str = concat!("incident-relay/", env!("CARGO_PKG_VERSION"));

/// Upstream client adapter using Hyper with Rustls (HTTP/1.1, plain or TLS).
///
/// Responsibilities:
/// * Builds the outbound JSON POST (content type, user agent, host)
/// * Races connect, send and full body read against the caller's cancellation token
/// * Classifies failures into cancelled / invalid request / transport
///
/// The underlying connection pool is shared across requests; no retries are made.
pub struct HyperUpstreamClient {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl HyperUpstreamClient {
    /// Create a new upstream client adapter.
    pub fn new() -> Result<Self> {
        // Install default crypto provider for rustls if not already set
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false); // Allow HTTPS URLs

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();

        if !native_certs.certs.is_empty() {
            for cert in native_certs.certs {
                if root_cert_store.add(cert).is_err() {
                    tracing::warn!("Failed to add native certificate to rustls RootCertStore");
                }
            }
            tracing::debug!("Loaded {} native root certificates.", root_cert_store.len());
        }

        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "Some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new()).build::<_, Full<Bytes>>(https_connector);

        tracing::info!("Created upstream HTTP client");
        Ok(Self { client })
    }

    /// Build the outbound POST for `url`.
    fn build_request(url: &str, body: Bytes) -> UpstreamResult<Request<Full<Bytes>>> {
        let uri: Uri = url
            .parse()
            .map_err(|e| UpstreamError::InvalidRequest(format!("invalid target URL {url}: {e}")))?;

        let host = uri
            .host()
            .ok_or_else(|| UpstreamError::InvalidRequest(format!("target URL {url} has no host")))?;
        let host_header = match uri.port() {
            Some(port) => format!("{host}:{}", port.as_u16()),
            None => host.to_string(),
        };

        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .version(Version::HTTP_11)
            .header(header::HOST, host_header)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, USER_AGENT)
            .body(Full::new(body))
            .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))
    }

    async fn exchange(&self, request: Request<Full<Bytes>>) -> UpstreamResult<UpstreamResponse> {
        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| UpstreamError::Transport(describe_client_error(&e)))?;

        let (parts, body) = response.into_parts();
        // Kept as raw bytes so obs-text values survive the relay.
        let content_type = parts.headers.get(header::CONTENT_TYPE).cloned();

        let body = body
            .collect()
            .await
            .map_err(|e| UpstreamError::Transport(format!("failed to read response body: {e}")))?
            .to_bytes();

        Ok(UpstreamResponse {
            status: parts.status,
            content_type,
            body,
        })
    }
}

/// Legacy client errors hide the interesting part (e.g. "connection refused")
/// in their source chain.
fn describe_client_error(err: &hyper_util::client::legacy::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[async_trait]
impl UpstreamClient for HyperUpstreamClient {
    async fn post_json(
        &self,
        url: &str,
        body: Bytes,
        cancel: CancellationToken,
    ) -> UpstreamResult<UpstreamResponse> {
        let request = Self::build_request(url, body)?;

        let span = tracing::info_span!(
            "backend_request",
            backend.url = %url,
            http.method = "POST",
            http.status_code = tracing::field::Empty,
        );

        let result = async {
            tracing::debug!("Sending request: POST {}", url);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(UpstreamError::Cancelled),
                result = self.exchange(request) => result,
            }
        }
        .instrument(span.clone())
        .await;

        match &result {
            Ok(response) => {
                span.record("http.status_code", response.status.as_u16());
            }
            Err(e) => {
                span.record("http.status_code", 599u16);
                tracing::warn!(parent: &span, "Request to backend {} failed: {}", url, e);
            }
        }

        result
    }
}
