//! Upstream endpoint resolution.
//!
//! The backend base URL comes from an ordered list of named sources (by
//! default three environment variables). The sources are captured once, when
//! the resolver is built, through an injected lookup function; nothing in this
//! module reads process state afterwards.
use std::env::VarError;

/// Route appended to the resolved base URL.
pub const INCIDENTS_RUN_PATH: &str = "/incidents/run";

/// Default source names, highest priority first.
pub const DEFAULT_SOURCE_VARS: [&str; 3] = ["INCIDENT_BACKEND_URL", "AGENTS_API_URL", "BACKEND_URL"];

/// Return the first source whose trimmed value is non-empty, trimmed.
///
/// An empty string means "not configured"; callers must not treat it as a host.
pub fn resolve_endpoint<I, S>(sources: I) -> String
where
    I: IntoIterator<Item = Option<S>>,
    S: AsRef<str>,
{
    sources
        .into_iter()
        .flatten()
        .map(|value| value.as_ref().trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_default()
}

/// Strip exactly one trailing `/` from `base` and append [`INCIDENTS_RUN_PATH`].
///
/// The base is not otherwise validated; a malformed value surfaces later as an
/// upstream error.
pub fn build_target_url(base: &str) -> String {
    let normalized = base.strip_suffix('/').unwrap_or(base);
    format!("{normalized}{INCIDENTS_RUN_PATH}")
}

/// A named configuration source and the value it held at capture time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSource {
    pub name: String,
    pub value: Option<String>,
}

/// Ordered snapshot of the endpoint sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointSources {
    sources: Vec<EndpointSource>,
}

impl EndpointSources {
    /// Capture each named source through `lookup`, keeping the given order.
    pub fn capture<N, F>(names: &[N], mut lookup: F) -> Self
    where
        N: AsRef<str>,
        F: FnMut(&str) -> Option<String>,
    {
        let sources = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                EndpointSource {
                    name: name.to_string(),
                    value: lookup(name),
                }
            })
            .collect();
        Self { sources }
    }

    /// Capture the named sources from the process environment.
    pub fn from_env<N: AsRef<str>>(names: &[N]) -> Self {
        Self::capture(names, |name| env_value(name, std::env::var(name)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &EndpointSource> {
        self.sources.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Unset is silent; a value that is not UTF-8 is skipped with a warning so the
/// operator can see why a lower-priority source won.
fn env_value(name: &str, value: Result<String, VarError>) -> Option<String> {
    match value {
        Ok(value) => Some(value),
        Err(VarError::NotPresent) => None,
        Err(VarError::NotUnicode(_)) => {
            tracing::warn!(variable = name, "Ignoring endpoint source: value is not valid UTF-8");
            None
        }
    }
}

/// Resolves the upstream target from a captured [`EndpointSources`].
#[derive(Debug, Clone)]
pub struct EndpointResolver {
    sources: EndpointSources,
}

impl EndpointResolver {
    pub fn new(sources: EndpointSources) -> Self {
        Self { sources }
    }

    /// The winning base URL, or `None` when every source is empty.
    pub fn resolve(&self) -> Option<String> {
        let base = resolve_endpoint(self.sources.iter().map(|s| s.value.as_deref()));
        (!base.is_empty()).then_some(base)
    }

    /// Name of the source that supplied the current base URL.
    pub fn resolved_source(&self) -> Option<&str> {
        self.sources
            .iter()
            .find(|s| s.value.as_deref().is_some_and(|v| !v.trim().is_empty()))
            .map(|s| s.name.as_str())
    }

    /// Full target URL for the incident run route.
    pub fn target_url(&self) -> Option<String> {
        self.resolve().map(|base| build_target_url(&base))
    }

    /// Remediation text shown to callers when nothing is configured.
    pub fn setup_guidance(&self) -> String {
        let mut names = self.sources.names();
        match names.next() {
            None => "Configure at least one backend URL source for the gateway.".to_string(),
            Some(first) => {
                let rest: Vec<&str> = names.collect();
                if rest.is_empty() {
                    format!("Set {first} in the gateway environment.")
                } else {
                    format!("Set {first} (or {}) in the gateway environment.", rest.join("/"))
                }
            }
        }
    }

    pub fn sources(&self) -> &EndpointSources {
        &self.sources
    }
}
