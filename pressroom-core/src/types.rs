//! Domain types for Pressroom deployment tracking.
//!
//! All timestamps are `DateTime<Utc>`. Records serialize with camelCase field
//! names so the persisted `deploymentHistory` document and the CI proxy's
//! `history` payload share one shape.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RecordError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Commit identifier correlating a local publish with a CI run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitSha(pub String);

impl CommitSha {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blank or whitespace-only shas never identify a CI run.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// First seven characters, the conventional abbreviated form.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(7) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for CommitSha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for CommitSha {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CommitSha {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle of one deployment.
///
/// `Pending → Queued → InProgress → {Completed, Failed, Cancelled, Skipped}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    #[default]
    Pending,
    Queued,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    Skipped,
}

impl DeploymentStatus {
    pub const ALL: [DeploymentStatus; 7] = [
        DeploymentStatus::Pending,
        DeploymentStatus::Queued,
        DeploymentStatus::InProgress,
        DeploymentStatus::Completed,
        DeploymentStatus::Failed,
        DeploymentStatus::Cancelled,
        DeploymentStatus::Skipped,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeploymentStatus::Completed
                | DeploymentStatus::Failed
                | DeploymentStatus::Cancelled
                | DeploymentStatus::Skipped
        )
    }

    /// Superseded runs: the CI system dropped them in favour of a newer commit.
    pub fn is_superseded(self) -> bool {
        matches!(self, DeploymentStatus::Cancelled | DeploymentStatus::Skipped)
    }

    fn stage(self) -> u8 {
        match self {
            DeploymentStatus::Pending => 0,
            DeploymentStatus::Queued => 1,
            DeploymentStatus::InProgress => 2,
            _ => 3,
        }
    }

    /// Whether a record currently in `self` may move to `next`.
    pub fn can_advance_to(self, next: DeploymentStatus) -> bool {
        !self.is_terminal() && next.stage() >= self.stage()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Queued => "queued",
            DeploymentStatus::InProgress => "in_progress",
            DeploymentStatus::Completed => "completed",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Cancelled => "cancelled",
            DeploymentStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        DeploymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| format!("unknown deployment status '{s}'"))
    }
}

/// Outcome of applying a reported status to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Same status reported again; only `updated_at` moved.
    Unchanged,
    /// Moved forward to another non-terminal status.
    Advanced,
    /// Reached a terminal status.
    Settled,
    /// Backwards or post-terminal report, dropped.
    Ignored,
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One publish attempt, local or remote in origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub commit_sha: CommitSha,
    #[serde(default)]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(default)]
    pub status: DeploymentStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Whole seconds from start to completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_url: Option<String>,
}

impl DeploymentRecord {
    /// A freshly tracked local publish.
    pub fn pending(
        commit_sha: CommitSha,
        action: impl Into<String>,
        item_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            commit_sha,
            action: action.into(),
            item_id,
            status: DeploymentStatus::Pending,
            started_at: now,
            updated_at: None,
            completed_at: None,
            duration: None,
            workflow_url: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Seconds since tracking began, clamped at zero for clock skew.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        now.signed_duration_since(self.started_at)
            .num_seconds()
            .max(0) as u64
    }

    /// Key used for newest-first ordering: completion time, else start time.
    pub fn sort_key(&self) -> DateTime<Utc> {
        self.completed_at.unwrap_or(self.started_at)
    }

    /// Apply a status reported by the CI system. Only forward moves stick.
    pub fn apply_status(
        &mut self,
        next: DeploymentStatus,
        updated_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Transition {
        if !self.status.can_advance_to(next) {
            return Transition::Ignored;
        }
        self.updated_at = Some(updated_at.unwrap_or(now));
        if next == self.status {
            return Transition::Unchanged;
        }
        if next.is_terminal() {
            self.settle(next, now);
            return Transition::Settled;
        }
        self.status = next;
        Transition::Advanced
    }

    /// Force a terminal status, stamping completion time and duration.
    ///
    /// No-op on a record that is already terminal.
    pub fn settle(&mut self, status: DeploymentStatus, now: DateTime<Utc>) {
        if self.is_terminal() || !status.is_terminal() {
            return;
        }
        let completed_at = now.max(self.started_at);
        self.status = status;
        self.completed_at = Some(completed_at);
        self.duration = Some(self.elapsed_secs(completed_at));
    }

    /// Check the record invariants.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.commit_sha.is_blank() {
            return Err(RecordError::EmptySha);
        }
        if !self.is_terminal() {
            if self.duration.is_some() {
                return Err(RecordError::DurationBeforeTerminal {
                    sha: self.commit_sha.to_string(),
                    status: self.status.to_string(),
                });
            }
            if self.completed_at.is_some() {
                return Err(RecordError::CompletedBeforeTerminal {
                    sha: self.commit_sha.to_string(),
                    status: self.status.to_string(),
                });
            }
        }
        if let Some(completed_at) = self.completed_at {
            if completed_at < self.started_at {
                return Err(RecordError::CompletedBeforeStart {
                    sha: self.commit_sha.to_string(),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(now: DateTime<Utc>) -> DeploymentRecord {
        DeploymentRecord::pending(
            CommitSha::from("abc1234def"),
            "Create post: hello.md",
            Some("hello.md".to_string()),
            now,
        )
    }

    #[test]
    fn sha_short_and_blank() {
        assert_eq!(CommitSha::from("abc1234def").short(), "abc1234");
        assert_eq!(CommitSha::from("abc").short(), "abc");
        assert!(CommitSha::from("  ").is_blank());
        assert!(!CommitSha::from("a").is_blank());
    }

    #[test]
    fn status_serde_uses_snake_case() {
        let json = serde_json::to_string(&DeploymentStatus::InProgress).expect("serialize");
        assert_eq!(json, "\"in_progress\"");
        let parsed: DeploymentStatus = serde_json::from_str("\"skipped\"").expect("deserialize");
        assert_eq!(parsed, DeploymentStatus::Skipped);
    }

    #[test]
    fn status_from_str_accepts_dashes() {
        assert_eq!(
            "In-Progress".parse::<DeploymentStatus>(),
            Ok(DeploymentStatus::InProgress)
        );
        assert!("exploded".parse::<DeploymentStatus>().is_err());
    }

    #[test]
    fn forward_transitions_apply() {
        let now = Utc::now();
        let mut rec = record(now);
        assert_eq!(
            rec.apply_status(DeploymentStatus::Queued, None, now),
            Transition::Advanced
        );
        assert_eq!(
            rec.apply_status(DeploymentStatus::InProgress, None, now),
            Transition::Advanced
        );
        assert_eq!(
            rec.apply_status(DeploymentStatus::InProgress, None, now),
            Transition::Unchanged
        );
        let later = now + Duration::seconds(42);
        assert_eq!(
            rec.apply_status(DeploymentStatus::Completed, None, later),
            Transition::Settled
        );
        assert_eq!(rec.status, DeploymentStatus::Completed);
        assert_eq!(rec.duration, Some(42));
        assert_eq!(rec.completed_at, Some(later));
    }

    #[test]
    fn backwards_and_post_terminal_reports_are_ignored() {
        let now = Utc::now();
        let mut rec = record(now);
        rec.apply_status(DeploymentStatus::InProgress, None, now);
        assert_eq!(
            rec.apply_status(DeploymentStatus::Queued, None, now),
            Transition::Ignored
        );
        assert_eq!(rec.status, DeploymentStatus::InProgress);

        rec.settle(DeploymentStatus::Failed, now);
        assert_eq!(
            rec.apply_status(DeploymentStatus::Completed, None, now),
            Transition::Ignored
        );
        assert_eq!(rec.status, DeploymentStatus::Failed);
    }

    #[test]
    fn settle_clamps_duration_under_clock_skew() {
        let now = Utc::now();
        let mut rec = record(now);
        rec.settle(DeploymentStatus::Completed, now - Duration::seconds(30));
        assert_eq!(rec.duration, Some(0));
        assert!(rec.validate().is_ok());
    }

    #[test]
    fn validate_rejects_duration_on_active_record() {
        let now = Utc::now();
        let mut rec = record(now);
        rec.duration = Some(3);
        assert!(matches!(
            rec.validate(),
            Err(RecordError::DurationBeforeTerminal { .. })
        ));
    }

    #[test]
    fn record_json_uses_camel_case_and_skips_empty_fields() {
        let now = Utc::now();
        let rec = record(now);
        let value = serde_json::to_value(&rec).expect("serialize");
        assert_eq!(value["commitSha"], "abc1234def");
        assert_eq!(value["itemId"], "hello.md");
        assert!(value.get("completedAt").is_none());
        assert!(value.get("workflowUrl").is_none());
    }
}
