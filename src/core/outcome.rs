//! Result of one forwarding attempt and the JSON error bodies the gateway emits.
use bytes::Bytes;
use http::{HeaderValue, StatusCode};
use serde::Serialize;

/// Content type assumed when the backend does not send one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

pub const METHOD_NOT_ALLOWED: &str = "method_not_allowed";
pub const BACKEND_NOT_CONFIGURED: &str = "backend_not_configured";
pub const UPSTREAM_TIMEOUT: &str = "upstream_timeout";
pub const UPSTREAM_ERROR: &str = "upstream_error";
pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";

/// Error body shared by every synthesized failure response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl ErrorBody {
    pub fn code(error: &'static str) -> Self {
        Self {
            error,
            detail: None,
            target: None,
        }
    }
}

/// What happened to a POST once it passed the method gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// The backend answered; relayed verbatim whatever the status.
    Success {
        status: StatusCode,
        content_type: HeaderValue,
        body: Bytes,
    },
    /// No endpoint source is set.
    Misconfigured { detail: String },
    /// The deadline fired before the backend answered.
    UpstreamTimeout { detail: String, target: String },
    /// Any other transport failure.
    UpstreamError { detail: String, target: String },
}

impl ForwardOutcome {
    /// Build a success outcome, defaulting the content type.
    pub fn relayed(status: StatusCode, content_type: Option<HeaderValue>, body: Bytes) -> Self {
        Self::Success {
            status,
            content_type: content_type
                .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE)),
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Success { status, .. } => *status,
            Self::Misconfigured { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamError { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Error body for the synthesized outcomes; `None` for relayed responses.
    pub fn error_body(&self) -> Option<ErrorBody> {
        match self {
            Self::Success { .. } => None,
            Self::Misconfigured { detail } => Some(ErrorBody {
                error: BACKEND_NOT_CONFIGURED,
                detail: Some(detail.clone()),
                target: None,
            }),
            Self::UpstreamTimeout { detail, target } => Some(ErrorBody {
                error: UPSTREAM_TIMEOUT,
                detail: Some(detail.clone()),
                target: Some(target.clone()),
            }),
            Self::UpstreamError { detail, target } => Some(ErrorBody {
                error: UPSTREAM_ERROR,
                detail: Some(detail.clone()),
                target: Some(target.clone()),
            }),
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success { .. } => "relayed",
            Self::Misconfigured { .. } => BACKEND_NOT_CONFIGURED,
            Self::UpstreamTimeout { .. } => UPSTREAM_TIMEOUT,
            Self::UpstreamError { .. } => UPSTREAM_ERROR,
        }
    }
}
