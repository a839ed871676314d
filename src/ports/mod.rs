pub mod http_client;
pub mod http_server;

pub use http_client::{UpstreamClient, UpstreamError, UpstreamResponse, UpstreamResult};
pub use http_server::{HandlerError, HttpHandler};
