//! Active deployment tracker.
//!
//! Holds the records still publishing, oldest first, each tagged with a
//! process-local [`TrackingId`]. Results are applied by id, so a record
//! removed by one poller is never resurrected by a late answer from another.
//! The tracker is never persisted; recovery rebuilds it from remote history.
//!
//! A *burst* is everything tracked between two moments when the active list
//! is empty. When the last record settles the burst drains and is reported
//! as a whole: it failed if any record in it settled `failed`.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pressroom_core::{CommitSha, DeploymentRecord, DeploymentStatus, Transition};
use pressroom_sync::RemoteStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingId(pub u64);

impl fmt::Display for TrackingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveDeployment {
    pub id: TrackingId,
    pub record: DeploymentRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    Tracked(TrackingId),
    /// Empty sha; nothing recorded.
    Ignored,
    /// Dedup is on and the sha is already active.
    AlreadyActive(TrackingId),
}

/// The active list emptied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Drained {
    pub success: bool,
    pub records: Vec<DeploymentRecord>,
}

/// Result of applying a status or a timeout to one tracked record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub id: TrackingId,
    pub transition: Transition,
    pub record: DeploymentRecord,
    /// Set when this step settled the last active record.
    pub drained: Option<Drained>,
}

/// Shas settled by this process that adoption must skip even when CI still
/// reports them running.
const RECENT_SETTLED: usize = 64;

#[derive(Debug)]
pub struct TrackerState {
    next_id: u64,
    active: Vec<ActiveDeployment>,
    burst: Vec<DeploymentRecord>,
    recent: VecDeque<CommitSha>,
    dedup: bool,
    timeout: Duration,
}

impl TrackerState {
    pub fn new(dedup: bool, timeout: Duration) -> Self {
        Self {
            next_id: 1,
            active: Vec::new(),
            burst: Vec::new(),
            recent: VecDeque::with_capacity(RECENT_SETTLED),
            dedup,
            timeout,
        }
    }

    pub fn set_policy(&mut self, dedup: bool, timeout: Duration) {
        self.dedup = dedup;
        self.timeout = timeout;
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn active(&self) -> &[ActiveDeployment] {
        &self.active
    }

    /// Active records, oldest first.
    pub fn records(&self) -> Vec<DeploymentRecord> {
        self.active.iter().map(|a| a.record.clone()).collect()
    }

    pub fn find(&self, sha: &CommitSha) -> Option<TrackingId> {
        self.active
            .iter()
            .find(|a| &a.record.commit_sha == sha)
            .map(|a| a.id)
    }

    /// Seconds since the oldest active record started.
    pub fn oldest_elapsed_secs(&self, now: DateTime<Utc>) -> Option<u64> {
        self.active.first().map(|a| a.record.elapsed_secs(now))
    }

    /// Register a locally initiated publish.
    pub fn track(
        &mut self,
        sha: CommitSha,
        action: impl Into<String>,
        item_id: Option<String>,
        now: DateTime<Utc>,
    ) -> TrackOutcome {
        if sha.is_blank() {
            return TrackOutcome::Ignored;
        }
        if self.dedup {
            if let Some(id) = self.find(&sha) {
                return TrackOutcome::AlreadyActive(id);
            }
        }
        let record = DeploymentRecord::pending(sha, action, item_id, now);
        TrackOutcome::Tracked(self.push(record))
    }

    /// Take over non-terminal runs that are not already active.
    pub fn adopt(
        &mut self,
        records: impl IntoIterator<Item = DeploymentRecord>,
    ) -> Vec<TrackingId> {
        let mut adopted = Vec::new();
        for record in records {
            if record.is_terminal() || record.commit_sha.is_blank() {
                continue;
            }
            if self.find(&record.commit_sha).is_some() || self.recent.contains(&record.commit_sha) {
                continue;
            }
            adopted.push(self.push(record));
        }
        adopted
    }

    /// Ids to check this tick, newest first.
    pub fn checks(&self) -> Vec<(TrackingId, CommitSha)> {
        self.active
            .iter()
            .rev()
            .map(|a| (a.id, a.record.commit_sha.clone()))
            .collect()
    }

    /// Force `failed` on a record older than the deployment timeout.
    pub fn expire(&mut self, id: TrackingId, now: DateTime<Utc>) -> Option<Step> {
        let idx = self.index_of(id)?;
        let elapsed = self.active[idx].record.elapsed_secs(now);
        if elapsed <= self.timeout.as_secs() {
            return None;
        }
        tracing::warn!(
            sha = %self.active[idx].record.commit_sha,
            elapsed_secs = elapsed,
            "deployment timed out; marking failed",
        );
        self.active[idx]
            .record
            .settle(DeploymentStatus::Failed, now);
        Some(self.finish(idx, Transition::Settled))
    }

    /// Apply a status reported by the CI system. `None` when the id is no
    /// longer active.
    pub fn apply(
        &mut self,
        id: TrackingId,
        remote: &RemoteStatus,
        now: DateTime<Utc>,
    ) -> Option<Step> {
        let idx = self.index_of(id)?;
        let entry = &mut self.active[idx];
        if entry.record.workflow_url.is_none() {
            entry.record.workflow_url = remote.workflow_url.clone();
        }
        let transition = entry
            .record
            .apply_status(remote.status, remote.updated_at, now);
        match transition {
            Transition::Settled => Some(self.finish(idx, transition)),
            _ => Some(Step {
                id,
                transition,
                record: self.active[idx].record.clone(),
                drained: None,
            }),
        }
    }

    fn push(&mut self, record: DeploymentRecord) -> TrackingId {
        let id = TrackingId(self.next_id);
        self.next_id += 1;
        self.active.push(ActiveDeployment { id, record });
        id
    }

    fn index_of(&self, id: TrackingId) -> Option<usize> {
        self.active.iter().position(|a| a.id == id)
    }

    fn finish(&mut self, idx: usize, transition: Transition) -> Step {
        let ActiveDeployment { id, record } = self.active.remove(idx);
        if self.recent.len() == RECENT_SETTLED {
            self.recent.pop_front();
        }
        self.recent.push_back(record.commit_sha.clone());
        self.burst.push(record.clone());
        let drained = self.active.is_empty().then(|| {
            let records = std::mem::take(&mut self.burst);
            let success = !records
                .iter()
                .any(|r| r.status == DeploymentStatus::Failed);
            Drained { success, records }
        });
        Step {
            id,
            transition,
            record,
            drained,
        }
    }
}
