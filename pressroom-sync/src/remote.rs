//! Remote history client: the CI system's view of deployments.
//!
//! The CI status proxy exposes two read-only endpoints under one base URL:
//!
//! | Endpoint            | Response                                                      |
//! |---------------------|---------------------------------------------------------------|
//! | `GET status?sha=..` | `{status, conclusion, message, commitSha, workflowUrl, startedAt, updatedAt}` |
//! | `GET history`       | `{deployments: [DeploymentRecord]}`                            |
//!
//! A commit with no run yet answers `{status: "pending", message, commitSha}`.
//! Run states arrive either already normalized (`failed`, `skipped`) or as
//! GitHub Actions `status` + `conclusion` pairs; both map onto
//! [`DeploymentStatus`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pressroom_core::{CommitSha, DeploymentRecord, DeploymentStatus, RemoteSettings};

use crate::error::RemoteError;

/// Read-only access to the CI system. Implementations block; async callers
/// run them on `spawn_blocking`.
pub trait RemoteHistory: Send + Sync {
    /// Current run state for one commit.
    fn status(&self, sha: &CommitSha) -> Result<RemoteStatus, RemoteError>;

    /// Recent runs, remote-origin records.
    fn history(&self) -> Result<Vec<DeploymentRecord>, RemoteError>;
}

/// Run state for one commit as reported by the CI system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteStatus {
    pub commit_sha: CommitSha,
    pub status: DeploymentStatus,
    pub message: Option<String>,
    pub workflow_url: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Wire payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusPayload {
    status: String,
    #[serde(default)]
    conclusion: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    commit_sha: Option<String>,
    #[serde(default)]
    workflow_url: Option<String>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct HistoryPayload {
    #[serde(default)]
    deployments: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunPayload {
    commit_sha: String,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    item_id: Option<String>,
    status: String,
    #[serde(default)]
    conclusion: Option<String>,
    started_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    duration: Option<u64>,
    #[serde(default)]
    workflow_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// Map a CI `status` (+ optional `conclusion`) onto a deployment status.
///
/// Unknown non-terminal states map to `Pending` so the record keeps polling;
/// unknown conclusions of a completed run map to `Failed`.
pub fn map_run_status(status: &str, conclusion: Option<&str>) -> DeploymentStatus {
    let status = status.trim().to_ascii_lowercase();
    let conclusion = conclusion.map(|c| c.trim().to_ascii_lowercase());

    if status == "completed" {
        return match conclusion.as_deref() {
            None | Some("") | Some("success") | Some("neutral") => DeploymentStatus::Completed,
            Some("cancelled") | Some("stale") => DeploymentStatus::Cancelled,
            Some("skipped") => DeploymentStatus::Skipped,
            Some(other) => {
                if other != "failure" && other != "timed_out" && other != "startup_failure" {
                    tracing::debug!(conclusion = other, "unrecognised run conclusion");
                }
                DeploymentStatus::Failed
            }
        };
    }

    match status.as_str() {
        "pending" | "requested" => DeploymentStatus::Pending,
        "queued" | "waiting" => DeploymentStatus::Queued,
        "in_progress" | "running" => DeploymentStatus::InProgress,
        "success" => DeploymentStatus::Completed,
        "failure" | "error" | "failed" => DeploymentStatus::Failed,
        "cancelled" => DeploymentStatus::Cancelled,
        "skipped" => DeploymentStatus::Skipped,
        other => {
            tracing::debug!(status = other, "unrecognised run status; treating as pending");
            DeploymentStatus::Pending
        }
    }
}

/// Decode a `status?sha=` body. The requested sha fills in a missing
/// `commitSha`.
pub fn parse_status(sha: &CommitSha, body: &str) -> Result<RemoteStatus, serde_json::Error> {
    let payload: StatusPayload = serde_json::from_str(body)?;
    Ok(RemoteStatus {
        commit_sha: payload
            .commit_sha
            .filter(|s| !s.trim().is_empty())
            .map(CommitSha::from)
            .unwrap_or_else(|| sha.clone()),
        status: map_run_status(&payload.status, payload.conclusion.as_deref()),
        message: payload.message,
        workflow_url: payload.workflow_url,
        started_at: payload.started_at,
        updated_at: payload.updated_at,
    })
}

/// Decode a `history` body. Entries that do not decode or that break the
/// record invariants are dropped with a warning.
pub fn parse_history(body: &str) -> Result<Vec<DeploymentRecord>, serde_json::Error> {
    let payload: HistoryPayload = serde_json::from_str(body)?;
    let mut records = Vec::with_capacity(payload.deployments.len());
    for entry in payload.deployments {
        let run: RunPayload = match serde_json::from_value(entry) {
            Ok(run) => run,
            Err(err) => {
                tracing::warn!(error = %err, "skipping undecodable remote run");
                continue;
            }
        };
        let record = run_to_record(run);
        match record.validate() {
            Ok(()) => records.push(record),
            Err(err) => tracing::warn!(error = %err, "skipping invalid remote run"),
        }
    }
    Ok(records)
}

fn run_to_record(run: RunPayload) -> DeploymentRecord {
    let status = map_run_status(&run.status, run.conclusion.as_deref());
    let mut record = DeploymentRecord {
        commit_sha: CommitSha::from(run.commit_sha),
        action: run.action.or(run.message).unwrap_or_default(),
        item_id: run.item_id,
        status,
        started_at: run.started_at,
        updated_at: run.updated_at,
        completed_at: None,
        duration: None,
        workflow_url: run.workflow_url,
    };
    if status.is_terminal() {
        let completed_at = run
            .completed_at
            .or(run.updated_at)
            .unwrap_or(run.started_at)
            .max(run.started_at);
        record.completed_at = Some(completed_at);
        record.duration = Some(run.duration.unwrap_or_else(|| record.elapsed_secs(completed_at)));
    }
    record
}

/// Classify a non-2xx answer. The proxy reports missing CI credentials with
/// `code: "not_configured"` or an error message mentioning it.
pub fn classify_failure(url: &str, code: u16, body: &str) -> RemoteError {
    let payload: ErrorPayload = serde_json::from_str(body).unwrap_or_default();
    let not_configured = payload.code.as_deref() == Some("not_configured")
        || payload
            .error
            .as_deref()
            .map(|e| e.to_ascii_lowercase().contains("not configured"))
            .unwrap_or(false);
    if not_configured {
        return RemoteError::NotConfigured(
            payload
                .error
                .unwrap_or_else(|| "CI proxy has no credentials".to_string()),
        );
    }
    RemoteError::Status {
        url: url.to_string(),
        code,
        body: payload.error.unwrap_or_else(|| truncate(body, 200)),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// [`RemoteHistory`] over HTTP with `ureq`.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    agent: ureq::Agent,
    base_url: Option<String>,
    token: Option<String>,
}

impl HttpRemote {
    pub fn from_settings(settings: &RemoteSettings) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build();
        Self {
            agent,
            base_url: settings
                .base_url
                .as_deref()
                .map(|url| url.trim().trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            token: settings.token.clone().filter(|t| !t.trim().is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    fn endpoint(&self, path: &str) -> Result<String, RemoteError> {
        let base = self.base_url.as_deref().ok_or_else(|| {
            RemoteError::NotConfigured("remote.base_url is not set".to_string())
        })?;
        Ok(format!("{base}/{path}"))
    }

    fn get_body(
        &self,
        path: &str,
        query: Option<(&str, &str)>,
    ) -> Result<(String, String), RemoteError> {
        let url = self.endpoint(path)?;
        let mut request = self.agent.get(&url).set("Accept", "application/json");
        if let Some((key, value)) = query {
            request = request.query(key, value);
        }
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }

        match request.call() {
            Ok(response) => {
                let body = response.into_string().map_err(|err| RemoteError::Transport {
                    url: url.clone(),
                    message: err.to_string(),
                })?;
                Ok((url, body))
            }
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                Err(classify_failure(&url, code, &body))
            }
            Err(ureq::Error::Transport(transport)) => Err(RemoteError::Transport {
                url,
                message: transport.to_string(),
            }),
        }
    }
}

fn decode<T>(
    url: &str,
    body: &str,
    parse: impl FnOnce(&str) -> Result<T, serde_json::Error>,
) -> Result<T, RemoteError> {
    parse(body).map_err(|err| RemoteError::Decode {
        url: url.to_string(),
        message: err.to_string(),
    })
}

impl RemoteHistory for HttpRemote {
    fn status(&self, sha: &CommitSha) -> Result<RemoteStatus, RemoteError> {
        let (url, body) = self.get_body("status", Some(("sha", sha.as_str())))?;
        decode(&url, &body, |body| parse_status(sha, body))
    }

    fn history(&self) -> Result<Vec<DeploymentRecord>, RemoteError> {
        let (url, body) = self.get_body("history", None)?;
        decode(&url, &body, parse_history)
    }
}
