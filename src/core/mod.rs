pub mod deadline;
pub mod endpoint;
pub mod outcome;

pub use deadline::ForwardDeadline;
pub use endpoint::{
    DEFAULT_SOURCE_VARS, EndpointResolver, EndpointSources, INCIDENTS_RUN_PATH, build_target_url,
    resolve_endpoint,
};
pub use outcome::{ErrorBody, ForwardOutcome};
