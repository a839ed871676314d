//! Incident Relay - a single-purpose forwarding gateway for incident runs.
//!
//! The gateway accepts a JSON incident submission over HTTP, resolves the agents
//! backend from the environment, POSTs the payload to `{backend}/incidents/run`
//! with a bounded deadline, and relays the backend's answer. Failures are mapped
//! to a small set of structured JSON errors, and every response is CORS-enabled
//! so a browser UI on another origin can call it directly.
//!
//! # Features
//! - CORS preflight handling and a POST-only method gate
//! - Backend resolution from an ordered list of environment variables
//! - One outbound request per submission, cancelled at the deadline
//! - Structured errors: `method_not_allowed`, `backend_not_configured`,
//!   `upstream_timeout`, `upstream_error`
//! - Layered configuration (file + `INCIDENT_RELAY__*` environment overrides)
//! - Structured tracing via `tracing` with per-request spans
//! - A small submission client used by the `submit` subcommand
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use incident_relay::{
//!     EndpointResolver, EndpointSources, HyperUpstreamClient, IncidentHandler, build_router,
//!     config::ServerConfig,
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = ServerConfig::default();
//! let resolver = EndpointResolver::new(EndpointSources::from_env(&config.backend.source_vars));
//! let handler = IncidentHandler::new(resolver, Arc::new(HyperUpstreamClient::new()?), &config);
//! let app = build_router(Arc::new(handler));
//! let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
//! axum::serve(listener, app).await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! Ports (traits) live in `ports`, their implementations in `adapters`, and the
//! transport-independent pieces (endpoint resolution, deadlines, outcomes) in
//! `core`. The handler only talks to the outbound HTTP stack through
//! [`UpstreamClient`], so tests substitute scripted clients.
//!
//! # Error Handling
//! Plumbing returns `eyre::Result<T>` with `WrapErr` context; the request path
//! uses `thiserror` enums and never surfaces a panic to the caller.
pub mod config;
pub mod ports;
pub mod submission;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

pub use crate::{
    adapters::{HyperUpstreamClient, IncidentHandler, build_router},
    config::ServerConfig,
    core::{EndpointResolver, EndpointSources},
    ports::http_client::UpstreamClient,
    utils::GracefulShutdown,
};
