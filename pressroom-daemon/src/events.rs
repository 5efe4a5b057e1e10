//! Event bus payloads.
//!
//! The service publishes on a tokio broadcast channel; the presenter and
//! `watch` clients subscribe. Each event serializes as one NDJSON line
//! tagged by `event`.

use serde::Serialize;

use pressroom_core::DeploymentRecord;
use pressroom_renderer::ContentKind;
use pressroom_sync::RemoteState;

use crate::tracker::TrackingId;

pub const EVENT_BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrackerEvent {
    /// A local publish was registered.
    Tracked {
        id: TrackingId,
        record: DeploymentRecord,
    },
    /// Runs started elsewhere were taken over (recovery or history poll).
    Adopted { records: Vec<DeploymentRecord> },
    /// Status poller heartbeat while anything is active.
    Progress { active: usize, elapsed_secs: u64 },
    /// One record reached a terminal status and moved to history.
    Settled { record: DeploymentRecord },
    /// The active list emptied.
    Drained {
        success: bool,
        records: Vec<DeploymentRecord>,
    },
    /// List views showing this kind of content should refresh.
    ContentChanged { kind: ContentKind },
    HistoryRefreshed { records: usize, remote: RemoteState },
}

impl TrackerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TrackerEvent::Tracked { .. } => "tracked",
            TrackerEvent::Adopted { .. } => "adopted",
            TrackerEvent::Progress { .. } => "progress",
            TrackerEvent::Settled { .. } => "settled",
            TrackerEvent::Drained { .. } => "drained",
            TrackerEvent::ContentChanged { .. } => "content_changed",
            TrackerEvent::HistoryRefreshed { .. } => "history_refreshed",
        }
    }
}
