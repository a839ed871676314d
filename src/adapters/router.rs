//! Axum router wiring: every path and method goes to one [`HttpHandler`].
use std::sync::Arc;

use axum::{
    Router,
    body::Body as AxumBody,
    extract::Request,
    http::{StatusCode, header},
    middleware,
    response::Response,
    routing::{MethodRouter, any},
};
use tower_http::trace::TraceLayer;

use crate::{
    adapters::middleware::{apply_cors_headers, request_timing_middleware},
    core::outcome::{ErrorBody, PAYLOAD_TOO_LARGE},
    ports::http_server::{HandlerError, HttpHandler},
};

/// Build the application router around `handler`.
pub fn build_router<H: HttpHandler>(handler: Arc<H>) -> Router {
    Router::new()
        .route("/", forward_all(handler.clone()))
        .route("/{*path}", forward_all(handler))
        .layer(middleware::from_fn(request_timing_middleware))
        .layer(TraceLayer::new_for_http())
}

fn forward_all<H: HttpHandler>(handler: Arc<H>) -> MethodRouter {
    any(move |req: Request| {
        let handler = handler.clone();
        async move {
            match handler.handle_request(req).await {
                Ok(response) => response,
                Err(e) => handler_error_response(&e),
            }
        }
    })
}

/// Render a handler failure; every variant stays CORS-compliant.
pub fn handler_error_response(err: &HandlerError) -> Response<AxumBody> {
    match err {
        HandlerError::PayloadTooLarge { .. } => payload_too_large_response(err),
        _ => internal_error_response(err),
    }
}

fn payload_too_large_response(err: &HandlerError) -> Response<AxumBody> {
    tracing::warn!("Rejecting request: {}", err);

    let body = ErrorBody {
        error: PAYLOAD_TOO_LARGE,
        detail: Some(err.to_string()),
        target: None,
    };
    let json = serde_json::to_vec(&body).unwrap_or_else(|_| b"{}".to_vec());

    let mut response = Response::new(AxumBody::from(json));
    *response.status_mut() = StatusCode::PAYLOAD_TOO_LARGE;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    apply_cors_headers(response.headers_mut());
    response
}

/// Plain 500 used when the handler itself fails.
fn internal_error_response(err: &HandlerError) -> Response<AxumBody> {
    tracing::error!("Request handling error: {}", err);

    let mut response = Response::new(AxumBody::from("Internal Server Error"));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    apply_cors_headers(response.headers_mut());
    response
}
