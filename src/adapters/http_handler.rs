use std::{sync::Arc, time::Duration};

use axum::{
    body::Body as AxumBody,
    http::{Method, StatusCode, header},
};
use bytes::Bytes;
use http_body_util::LengthLimitError;
use hyper::{Request, Response};

use crate::{
    adapters::middleware::apply_cors_headers,
    config::models::ServerConfig,
    core::{
        ForwardDeadline,
        endpoint::{EndpointResolver, build_target_url},
        outcome::{ErrorBody, ForwardOutcome, METHOD_NOT_ALLOWED},
    },
    ports::{
        http_client::{UpstreamClient, UpstreamError},
        http_server::{HandlerError, HttpHandler},
    },
};

/// Forwards incident runs to the resolved backend.
///
/// Per request: answer CORS preflight, reject anything but POST, resolve the
/// backend, then make exactly one bounded POST and translate the outcome.
/// Every response carries the permissive CORS headers.
#[derive(Clone)]
pub struct IncidentHandler {
    resolver: Arc<EndpointResolver>,
    upstream: Arc<dyn UpstreamClient>,
    timeout: Duration,
    max_body_bytes: usize,
}

impl IncidentHandler {
    pub fn new(
        resolver: EndpointResolver,
        upstream: Arc<dyn UpstreamClient>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            resolver: Arc::new(resolver),
            upstream,
            timeout: config.backend.timeout(),
            max_body_bytes: config.server.max_body_bytes,
        }
    }

    pub fn resolver(&self) -> &EndpointResolver {
        &self.resolver
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the request through preflight, method gate, configuration gate and forward.
    pub async fn handle(&self, req: Request<AxumBody>) -> Result<Response<AxumBody>, HandlerError> {
        let method = req.method().clone();

        if method == Method::OPTIONS {
            tracing::debug!("Answering CORS preflight");
            return Self::preflight_response();
        }

        if method != Method::POST {
            tracing::info!("Rejecting {} request", method);
            return Self::json_response(
                StatusCode::METHOD_NOT_ALLOWED,
                &ErrorBody::code(METHOD_NOT_ALLOWED),
            );
        }

        let Some(base) = self.resolver.resolve() else {
            tracing::warn!(
                sources = ?self.resolver.sources().names().collect::<Vec<_>>(),
                "No backend URL configured"
            );
            return Self::render(ForwardOutcome::Misconfigured {
                detail: self.resolver.setup_guidance(),
            });
        };

        let target = build_target_url(&base);
        let payload = self.read_payload(req.into_body()).await?;
        let outcome = self.forward(&target, payload).await;
        Self::render(outcome)
    }

    /// Read the inbound body and re-serialize it as compact JSON.
    ///
    /// An absent, blank or `null` body is sent as `{}`.
    async fn read_payload(&self, body: AxumBody) -> Result<Bytes, HandlerError> {
        let bytes = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| {
                if exceeds_length_limit(&e) {
                    HandlerError::PayloadTooLarge {
                        limit: self.max_body_bytes,
                    }
                } else {
                    HandlerError::RequestError(format!("failed to read request body: {e}"))
                }
            })?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Bytes::from_static(b"{}"));
        }

        let value: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
            HandlerError::RequestError(format!("request body is not valid JSON: {e}"))
        })?;
        if value.is_null() {
            return Ok(Bytes::from_static(b"{}"));
        }

        serde_json::to_vec(&value)
            .map(Bytes::from)
            .map_err(|e| HandlerError::InternalError(format!("failed to serialize payload: {e}")))
    }

    /// Make the single outbound attempt under the configured deadline.
    pub async fn forward(&self, target: &str, payload: Bytes) -> ForwardOutcome {
        let deadline = ForwardDeadline::start(self.timeout);
        let token = deadline.token();

        tracing::info!(upstream = %target, timeout_ms = self.timeout.as_millis() as u64, "Forwarding incident run");

        let result = tokio::select! {
            biased;
            result = self.upstream.post_json(target, payload, token.clone()) => result,
            _ = token.cancelled() => Err(UpstreamError::Cancelled),
        };

        let outcome = match result {
            Ok(response) => {
                ForwardOutcome::relayed(response.status, response.content_type, response.body)
            }
            Err(UpstreamError::Cancelled) => ForwardOutcome::UpstreamTimeout {
                detail: format!(
                    "upstream did not respond within {} ms",
                    deadline.timeout().as_millis()
                ),
                target: target.to_string(),
            },
            Err(e) => ForwardOutcome::UpstreamError {
                detail: e.to_string(),
                target: target.to_string(),
            },
        };

        match &outcome {
            ForwardOutcome::Success { status, .. } => {
                tracing::info!(upstream = %target, status = status.as_u16(), "Relayed upstream response");
            }
            other => {
                tracing::warn!(upstream = %target, outcome = other.kind(), "Forwarding failed");
            }
        }

        outcome
    }

    /// Translate an outcome into the response sent to the caller.
    fn render(outcome: ForwardOutcome) -> Result<Response<AxumBody>, HandlerError> {
        match outcome {
            ForwardOutcome::Success {
                status,
                content_type,
                body,
            } => Self::finish(
                Response::builder()
                    .status(status)
                    .header(header::CONTENT_TYPE, content_type)
                    .body(AxumBody::from(body)),
            ),
            failure => {
                let body = failure.error_body().ok_or_else(|| {
                    HandlerError::InternalError("failure outcome without error body".to_string())
                })?;
                Self::json_response(failure.status(), &body)
            }
        }
    }

    fn preflight_response() -> Result<Response<AxumBody>, HandlerError> {
        Self::finish(
            Response::builder()
                .status(StatusCode::NO_CONTENT)
                .body(AxumBody::empty()),
        )
    }

    fn json_response(
        status: StatusCode,
        body: &ErrorBody,
    ) -> Result<Response<AxumBody>, HandlerError> {
        let json = serde_json::to_vec(body)
            .map_err(|e| HandlerError::InternalError(format!("failed to encode error body: {e}")))?;
        Self::finish(
            Response::builder()
                .status(status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(AxumBody::from(json)),
        )
    }

    fn finish(
        built: Result<Response<AxumBody>, axum::http::Error>,
    ) -> Result<Response<AxumBody>, HandlerError> {
        let mut response = built
            .map_err(|e| HandlerError::InternalError(format!("failed to build response: {e}")))?;
        apply_cors_headers(response.headers_mut());
        Ok(response)
    }
}

/// True when reading the body stopped at the configured size limit.
fn exceeds_length_limit(err: &axum::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if cause.is::<LengthLimitError>() {
            return true;
        }
        source = cause.source();
    }
    false
}

impl HttpHandler for IncidentHandler {
    fn handle_request(
        &self,
        req: Request<AxumBody>,
    ) -> impl std::future::Future<Output = Result<Response<AxumBody>, HandlerError>> + Send {
        self.handle(req)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{
        core::endpoint::{DEFAULT_SOURCE_VARS, EndpointSources},
        ports::http_client::{UpstreamResponse, UpstreamResult},
    };

    enum Script {
        Respond(UpstreamResponse),
        Refuse,
        Hang,
        IgnoreCancel,
    }

    struct ScriptedUpstream {
        script: Script,
        calls: AtomicUsize,
        last: Mutex<Option<(String, Bytes)>>,
    }

    impl ScriptedUpstream {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicUsize::new(0),
                last: Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl UpstreamClient for ScriptedUpstream {
        async fn post_json(
            &self,
            url: &str,
            body: Bytes,
            cancel: CancellationToken,
        ) -> UpstreamResult<UpstreamResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some((url.to_string(), body));
            match &self.script {
                Script::Respond(response) => Ok(response.clone()),
                Script::Refuse => Err(UpstreamError::Transport(
                    "client error (Connect): tcp connect error: Connection refused".into(),
                )),
                Script::Hang => {
                    cancel.cancelled().await;
                    Err(UpstreamError::Cancelled)
                }
                Script::IgnoreCancel => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    fn configured(base: Option<&str>) -> EndpointResolver {
        let base = base.map(str::to_string);
        EndpointResolver::new(EndpointSources::capture(&DEFAULT_SOURCE_VARS, |name| {
            (name == "AGENTS_API_URL").then(|| base.clone()).flatten()
        }))
    }

    fn build_handler(
        base: Option<&str>,
        upstream: Arc<ScriptedUpstream>,
        timeout_ms: u64,
    ) -> IncidentHandler {
        let config = ServerConfig::builder().timeout_ms(timeout_ms).build();
        IncidentHandler::new(configured(base), upstream, &config)
    }

    fn build_handler_with_limit(
        upstream: Arc<ScriptedUpstream>,
        max_body_bytes: usize,
    ) -> IncidentHandler {
        let config = ServerConfig::builder()
            .max_body_bytes(max_body_bytes)
            .build();
        IncidentHandler::new(configured(Some("http://backend")), upstream, &config)
    }

    fn request(method: Method, body: &str) -> Request<AxumBody> {
        Request::builder()
            .method(method)
            .uri("/api/incidents/run")
            .header(header::CONTENT_TYPE, "application/json")
            .body(AxumBody::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response<AxumBody>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn assert_cors(response: &Response<AxumBody>) {
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "POST,OPTIONS");
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_HEADERS],
            "Content-Type,Authorization"
        );
    }

    fn created_upstream() -> Arc<ScriptedUpstream> {
        ScriptedUpstream::new(Script::Respond(UpstreamResponse {
            status: StatusCode::CREATED,
            content_type: Some(HeaderValue::from_static("application/json")),
            body: Bytes::from_static(br#"{"id":"abc"}"#),
        }))
    }

    #[tokio::test]
    async fn test_preflight_is_empty_204_and_never_forwards() {
        let upstream = created_upstream();
        let handler = build_handler(Some("http://backend"), upstream.clone(), 15_000);

        let response = handler.handle(request(Method::OPTIONS, "{}")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
        assert_cors(&response);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test]
    async fn test_non_post_is_405_regardless_of_configuration() {
        for base in [Some("http://backend"), None] {
            for method in [Method::GET, Method::PUT, Method::DELETE, Method::PATCH] {
                let upstream = created_upstream();
                let handler = build_handler(base, upstream.clone(), 15_000);

                let response = handler.handle(request(method, "{}")).await.unwrap();

                assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
                assert_cors(&response);
                assert_eq!(body_json(response).await, json!({"error": "method_not_allowed"}));
                assert_eq!(upstream.calls(), 0);
            }
        }
    }

    #[tokio::test]
    async fn test_unconfigured_post_is_503_without_outbound_call() {
        let upstream = created_upstream();
        let handler = build_handler(None, upstream.clone(), 15_000);

        let response = handler
            .handle(request(Method::POST, r#"{"service":"checkout"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_cors(&response);
        let body = body_json(response).await;
        assert_eq!(body["error"], "backend_not_configured");
        assert!(body["detail"].as_str().unwrap().contains("INCIDENT_BACKEND_URL"));
        assert!(body.get("target").is_none());
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test]
    async fn test_success_is_relayed_verbatim() {
        let upstream = created_upstream();
        let handler = build_handler(Some("http://backend:8000/"), upstream.clone(), 15_000);

        let response = handler
            .handle(request(Method::POST, r#"{"service":"checkout","severity":"high"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_cors(&response);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], br#"{"id":"abc"}"#);

        let (url, sent) = upstream.last.lock().unwrap().clone().unwrap();
        assert_eq!(url, "http://backend:8000/incidents/run");
        assert_eq!(&sent[..], br#"{"service":"checkout","severity":"high"}"#);
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test]
    async fn test_upstream_error_status_and_missing_content_type() {
        let upstream = ScriptedUpstream::new(Script::Respond(UpstreamResponse {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            content_type: None,
            body: Bytes::from_static(b"not json at all"),
        }));
        let handler = build_handler(Some("http://backend"), upstream, 15_000);

        let response = handler.handle(request(Method::POST, "{}")).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"not json at all");
    }

    #[tokio::test]
    async fn test_non_ascii_content_type_is_relayed_byte_for_byte() {
        let content_type = HeaderValue::from_bytes(b"text/plain; name=\xe9t\xe9").unwrap();
        let upstream = ScriptedUpstream::new(Script::Respond(UpstreamResponse {
            status: StatusCode::OK,
            content_type: Some(content_type.clone()),
            body: Bytes::from_static(b"ok"),
        }));
        let handler = build_handler(Some("http://backend"), upstream, 15_000);

        let response = handler.handle(request(Method::POST, "{}")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], content_type);
    }

    #[tokio::test]
    async fn test_body_over_limit_is_payload_too_large() {
        let upstream = created_upstream();
        let handler = build_handler_with_limit(upstream.clone(), 64);
        let body = format!(r#"{{"summary":"{}"}}"#, "x".repeat(256));

        let result = handler.handle(request(Method::POST, &body)).await;

        assert!(matches!(
            result,
            Err(HandlerError::PayloadTooLarge { limit: 64 })
        ));
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test]
    async fn test_body_at_limit_is_forwarded() {
        let upstream = created_upstream();
        let body = r#"{"summary":"fits"}"#;
        let handler = build_handler_with_limit(upstream.clone(), body.len());

        let response = handler.handle(request(Method::POST, body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_body_is_forwarded_as_empty_object() {
        let upstream = created_upstream();
        let handler = build_handler(Some("http://backend"), upstream.clone(), 15_000);

        handler.handle(request(Method::POST, "")).await.unwrap();
        let (_, sent) = upstream.last.lock().unwrap().clone().unwrap();
        assert_eq!(&sent[..], b"{}");

        handler.handle(request(Method::POST, "null")).await.unwrap();
        let (_, sent) = upstream.last.lock().unwrap().clone().unwrap();
        assert_eq!(&sent[..], b"{}");
    }

    #[tokio::test]
    async fn test_payload_is_compacted_with_key_order_preserved() {
        let upstream = created_upstream();
        let handler = build_handler(Some("http://backend"), upstream.clone(), 15_000);

        handler
            .handle(request(
                Method::POST,
                "{\n  \"summary\": \"p99 up\",\n  \"service\": \"api\",\n  \"signals\": [\"5xx\"]\n}",
            ))
            .await
            .unwrap();

        let (_, sent) = upstream.last.lock().unwrap().clone().unwrap();
        assert_eq!(
            &sent[..],
            br#"{"summary":"p99 up","service":"api","signals":["5xx"]}"#
        );
    }

    #[tokio::test]
    async fn test_invalid_json_body_is_a_handler_error() {
        let upstream = created_upstream();
        let handler = build_handler(Some("http://backend"), upstream.clone(), 15_000);

        let result = handler.handle(request(Method::POST, "{not json")).await;

        assert!(matches!(result, Err(HandlerError::RequestError(_))));
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test]
    async fn test_timeout_is_504_with_target() {
        let upstream = ScriptedUpstream::new(Script::Hang);
        let handler = build_handler(Some("http://slow-backend"), upstream.clone(), 50);

        let response = handler.handle(request(Method::POST, "{}")).await.unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_cors(&response);
        let body = body_json(response).await;
        assert_eq!(body["error"], "upstream_timeout");
        assert_eq!(body["target"], "http://slow-backend/incidents/run");
        assert!(body["detail"].as_str().unwrap().contains("50 ms"));
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test]
    async fn test_timeout_applies_even_if_client_ignores_token() {
        let upstream = ScriptedUpstream::new(Script::IgnoreCancel);
        let handler = build_handler(Some("http://stuck"), upstream, 50);

        let response = tokio::time::timeout(
            Duration::from_secs(5),
            handler.handle(request(Method::POST, "{}")),
        )
        .await
        .expect("deadline must bound the call")
        .unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_transport_failure_is_502_with_target() {
        let upstream = ScriptedUpstream::new(Script::Refuse);
        let handler = build_handler(Some("http://127.0.0.1:1/"), upstream, 15_000);

        let response = handler.handle(request(Method::POST, "{}")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_cors(&response);
        let body = body_json(response).await;
        assert_eq!(body["error"], "upstream_error");
        assert_eq!(body["target"], "http://127.0.0.1:1/incidents/run");
        assert!(body["detail"].as_str().unwrap().contains("Connection refused"));
    }

    #[tokio::test]
    async fn test_handler_port_delegates() {
        let upstream = created_upstream();
        let handler = build_handler(Some("http://backend"), upstream, 15_000);

        let response = HttpHandler::handle_request(&handler, request(Method::POST, "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}
