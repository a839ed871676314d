pub mod http_client;
pub mod http_handler;
pub mod middleware;
pub mod router;

/// Re-export commonly used types from adapters
pub use http_client::HyperUpstreamClient;
pub use http_handler::IncidentHandler;
pub use middleware::{apply_cors_headers, request_timing_middleware};
pub use router::build_router;
