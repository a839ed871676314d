//! Cross-cutting helpers for the relay's router.
//!
//! CORS headers are permissive and fixed; they are written on every response
//! the gateway produces, including the 500 rendered at the router boundary.
use std::time::Instant;

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "POST,OPTIONS";
pub const ALLOW_HEADERS: &str = "Content-Type,Authorization";

pub const X_REQUEST_ID: &str = "x-request-id";

/// Write the permissive CORS headers, replacing any existing values.
pub fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(ALLOW_ORIGIN),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
}

/// Assign a request id, run the request inside a `request` span and log its
/// start, end and latency.
///
/// An inbound `X-Request-ID` is reused; otherwise a UUID v4 is generated. The id
/// is echoed on the response.
pub async fn request_timing_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    let request_id = req
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = crate::tracing_setup::create_request_span(method.as_str(), uri.path(), &request_id);

    let mut response = async {
        tracing::info!("Started processing {} {}", method, uri);
        next.run(req).await
    }
    .instrument(span.clone())
    .await;

    let duration = start.elapsed();
    span.record("http.status_code", response.status().as_u16());
    span.record("duration_ms", duration.as_millis() as u64);
    tracing::info!(
        parent: &span,
        "Completed {} {} - {} in {:?}",
        method,
        uri,
        response.status(),
        duration
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }

    response
}
