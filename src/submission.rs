//! Client side of an incident run: the payload the form produces and where it
//! is sent.
//!
//! The gateway never inspects this payload; these types exist for the `submit`
//! subcommand and for callers embedding the client.
use std::{fmt, str::FromStr};

use eyre::{Result, WrapErr, eyre};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::endpoint::{INCIDENTS_RUN_PATH, build_target_url};

/// Backend address used when the caller runs against a local origin.
pub const LOCAL_DEVELOPMENT_URL: &str = "http://localhost:8000";

/// Route the gateway is mounted on when deployed next to the UI.
pub const SAME_ORIGIN_PATH: &str = "/api/incidents/run";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl FromStr for Severity {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(eyre!(
                "unknown severity '{other}' (expected low, medium, high or critical)"
            )),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Body of an incident run request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentSubmission {
    pub service: String,
    pub severity: Severity,
    pub summary: String,
    pub signals: Vec<String>,
    pub recent_deploy_sha: Option<String>,
}

impl IncidentSubmission {
    /// Build a submission from raw form values, trimming text fields.
    ///
    /// A blank deploy SHA becomes `None`.
    pub fn from_form(
        service: &str,
        severity: Severity,
        summary: &str,
        signals: &str,
        recent_deploy_sha: Option<&str>,
    ) -> Self {
        Self {
            service: service.trim().to_string(),
            severity,
            summary: summary.trim().to_string(),
            signals: parse_signals(signals),
            recent_deploy_sha: recent_deploy_sha
                .map(str::trim)
                .filter(|sha| !sha.is_empty())
                .map(str::to_string),
        }
    }
}

/// Split a comma separated list, trimming entries and dropping empty ones.
pub fn parse_signals(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Where a submission is posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitTarget {
    /// An explicit backend base URL was given.
    Override(String),
    /// The caller's origin is local; talk to the development backend directly.
    LocalDevelopment(String),
    /// Go through the gateway mounted on the caller's own origin.
    SameOrigin(String),
}

impl SubmitTarget {
    /// Pick the endpoint: explicit override, else the local development
    /// backend for a localhost origin, else the same-origin gateway route.
    pub fn resolve(override_base: Option<&str>, origin: &str) -> Result<Self> {
        if let Some(base) = override_base.map(str::trim).filter(|b| !b.is_empty()) {
            return Ok(Self::Override(build_target_url(base)));
        }

        let origin = Url::parse(origin).wrap_err_with(|| format!("Invalid origin: {origin}"))?;
        if matches!(origin.host_str(), Some("localhost" | "127.0.0.1" | "[::1]")) {
            return Ok(Self::LocalDevelopment(format!(
                "{LOCAL_DEVELOPMENT_URL}{INCIDENTS_RUN_PATH}"
            )));
        }

        let url = origin
            .join(SAME_ORIGIN_PATH)
            .wrap_err("Failed to build same-origin gateway URL")?;
        Ok(Self::SameOrigin(url.to_string()))
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Override(url) | Self::LocalDevelopment(url) | Self::SameOrigin(url) => url,
        }
    }
}

/// Reply to a submission.
#[derive(Debug, Clone)]
pub struct SubmissionReply {
    pub status: u16,
    pub body: String,
}

impl SubmissionReply {
    /// Pretty-print the body when it is JSON, otherwise return it unchanged.
    pub fn pretty_body(&self) -> String {
        serde_json::from_str::<serde_json::Value>(&self.body)
            .ok()
            .and_then(|value| serde_json::to_string_pretty(&value).ok())
            .unwrap_or_else(|| self.body.clone())
    }
}

/// POST `submission` to `url`; non-2xx replies are errors.
pub async fn submit_incident(
    client: &reqwest::Client,
    url: &str,
    submission: &IncidentSubmission,
) -> Result<SubmissionReply> {
    tracing::debug!(url = %url, service = %submission.service, "Submitting incident");

    let response = client
        .post(url)
        .json(submission)
        .send()
        .await
        .wrap_err_with(|| format!("Failed to reach {url}"))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .wrap_err("Failed to read response body")?;

    if !status.is_success() {
        tracing::warn!(status = status.as_u16(), body = %body, "Incident submission rejected");
        return Err(eyre!("API failed: {}", status.as_u16()));
    }

    Ok(SubmissionReply {
        status: status.as_u16(),
        body,
    })
}
