//! Presentation binder: pure mapping from tracker state to views.
//!
//! Nothing here touches a clock or a channel; callers pass `now`. The
//! daemon's presenter owns a [`BannerState`] and feeds it tracker events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pressroom_core::{BannerSettings, DeploymentRecord, DeploymentStatus};

use crate::keywords::{primary_kind, ContentKind};

/// Colour family a view element is drawn in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Waiting,
    Progress,
    Success,
    Failure,
    Muted,
}

impl Tone {
    pub fn for_status(status: DeploymentStatus) -> Self {
        match status {
            DeploymentStatus::Pending | DeploymentStatus::Queued => Tone::Waiting,
            DeploymentStatus::InProgress => Tone::Progress,
            DeploymentStatus::Completed => Tone::Success,
            DeploymentStatus::Failed => Tone::Failure,
            DeploymentStatus::Cancelled | DeploymentStatus::Skipped => Tone::Muted,
        }
    }
}

// ---------------------------------------------------------------------------
// Banner
// ---------------------------------------------------------------------------

/// `hidden → active → settled → hidden`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum BannerState {
    #[default]
    Hidden,
    Active {
        since: DateTime<Utc>,
        /// Records joined since the burst began; only `settle` resets it.
        count: usize,
    },
    Settled {
        success: bool,
        count: usize,
        at: DateTime<Utc>,
    },
}

impl BannerState {
    /// `added` records joined the burst. An already active banner keeps its
    /// start and grows its count.
    pub fn activate(&mut self, since: DateTime<Utc>, added: usize) {
        match self {
            BannerState::Active { count, .. } => *count += added,
            _ => *self = BannerState::Active { since, count: added },
        }
    }

    /// The active list drained.
    pub fn settle(&mut self, success: bool, count: usize, at: DateTime<Utc>) {
        *self = BannerState::Settled { success, count, at };
    }

    /// When a settled banner disappears.
    pub fn hide_at(&self, settings: &BannerSettings) -> Option<DateTime<Utc>> {
        match self {
            BannerState::Settled { success, at, .. } => {
                let secs = if *success {
                    settings.success_hide_secs
                } else {
                    settings.failure_hide_secs
                };
                let deadline = i64::try_from(secs)
                    .ok()
                    .and_then(chrono::Duration::try_seconds)
                    .and_then(|delay| at.checked_add_signed(delay));
                Some(deadline.unwrap_or(DateTime::<Utc>::MAX_UTC))
            }
            _ => None,
        }
    }

    /// Apply auto-hide. Returns `true` when the banner just hid.
    pub fn expire(&mut self, now: DateTime<Utc>, settings: &BannerSettings) -> bool {
        match self.hide_at(settings) {
            Some(deadline) if now >= deadline => {
                *self = BannerState::Hidden;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BannerPhase {
    Hidden,
    Active,
    Settled,
}

/// What the banner shows right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerView {
    pub phase: BannerPhase,
    pub tone: Tone,
    /// Size of the current burst; records that settled early still count.
    pub active_count: usize,
    /// Records settled in the last burst.
    pub settled_count: usize,
    /// Seconds since the oldest active record started.
    pub elapsed_secs: u64,
    pub elapsed_label: String,
    /// Seconds until a settled banner hides.
    pub hides_in_secs: Option<u64>,
}

/// Bind the banner. `active` is the tracker list, oldest first.
pub fn bind_banner(
    state: &BannerState,
    active: &[DeploymentRecord],
    settings: &BannerSettings,
    now: DateTime<Utc>,
) -> BannerView {
    if let Some(oldest) = active.first() {
        let elapsed_secs = oldest.elapsed_secs(now);
        let tone = if active
            .iter()
            .any(|r| r.status == DeploymentStatus::InProgress)
        {
            Tone::Progress
        } else {
            Tone::Waiting
        };
        let active_count = match state {
            BannerState::Active { count, .. } => (*count).max(active.len()),
            _ => active.len(),
        };
        return BannerView {
            phase: BannerPhase::Active,
            tone,
            active_count,
            settled_count: 0,
            elapsed_secs,
            elapsed_label: format_elapsed(elapsed_secs),
            hides_in_secs: None,
        };
    }

    match (state, state.hide_at(settings)) {
        (BannerState::Settled { success, count, .. }, Some(deadline)) if now < deadline => {
            let remaining = deadline.signed_duration_since(now).num_seconds().max(0) as u64;
            BannerView {
                phase: BannerPhase::Settled,
                tone: if *success { Tone::Success } else { Tone::Failure },
                active_count: 0,
                settled_count: *count,
                elapsed_secs: 0,
                elapsed_label: String::new(),
                hides_in_secs: Some(remaining),
            }
        }
        _ => BannerView {
            phase: BannerPhase::Hidden,
            tone: Tone::Muted,
            active_count: 0,
            settled_count: 0,
            elapsed_secs: 0,
            elapsed_label: String::new(),
            hides_in_secs: None,
        },
    }
}

/// `42s`, `3m 07s`, `1h 02m`.
pub fn format_elapsed(secs: u64) -> String {
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m {:02}s", s / 60, s % 60),
        s => format!("{}h {:02}m", s / 3600, (s % 3600) / 60),
    }
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

/// One dashboard line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardRow {
    pub commit_sha: String,
    pub short_sha: String,
    pub action: String,
    pub item_id: Option<String>,
    pub kind: Option<ContentKind>,
    pub status: DeploymentStatus,
    pub tone: Tone,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Final duration when settled, running time otherwise.
    pub duration_secs: u64,
    pub duration_label: String,
    pub workflow_url: Option<String>,
}

impl DashboardRow {
    pub fn from_record(record: &DeploymentRecord, now: DateTime<Utc>) -> Self {
        let duration_secs = record
            .duration
            .unwrap_or_else(|| record.elapsed_secs(now));
        Self {
            commit_sha: record.commit_sha.to_string(),
            short_sha: record.commit_sha.short().to_string(),
            action: record.action.clone(),
            item_id: record.item_id.clone(),
            kind: primary_kind(record),
            status: record.status,
            tone: Tone::for_status(record.status),
            started_at: record.started_at,
            completed_at: record.completed_at,
            duration_secs,
            duration_label: format_elapsed(duration_secs),
            workflow_url: record.workflow_url.clone(),
        }
    }
}

/// Active rows first, then history, with superseded runs set apart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardView {
    pub active: Vec<DashboardRow>,
    pub history: Vec<DashboardRow>,
    /// Skipped and cancelled runs, collapsed by default.
    pub superseded: Vec<DashboardRow>,
}

impl DashboardView {
    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.history.is_empty() && self.superseded.is_empty()
    }
}

/// Bind the dashboard. History rows whose sha is still active are dropped.
pub fn bind_dashboard(
    active: &[DeploymentRecord],
    history: &[DeploymentRecord],
    now: DateTime<Utc>,
) -> DashboardView {
    let mut view = DashboardView {
        active: active
            .iter()
            .map(|r| DashboardRow::from_record(r, now))
            .collect(),
        ..DashboardView::default()
    };
    for record in history {
        if active.iter().any(|a| a.commit_sha == record.commit_sha) {
            continue;
        }
        let row = DashboardRow::from_record(record, now);
        if record.status.is_superseded() {
            view.superseded.push(row);
        } else {
            view.history.push(row);
        }
    }
    view
}
