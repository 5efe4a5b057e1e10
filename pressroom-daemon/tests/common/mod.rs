#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use pressroom_core::{CommitSha, DeploymentRecord, DeploymentStatus, HistoryStore, Settings};
use pressroom_daemon::{DeploymentService, TrackerEvent};
use pressroom_sync::{RemoteError, RemoteHistory, RemoteStatus};

/// CI fake answering from whatever state the test last set.
#[derive(Default)]
pub struct StateRemote {
    statuses: Mutex<HashMap<String, Result<DeploymentStatus, RemoteError>>>,
    history: Mutex<Vec<DeploymentRecord>>,
}

impl StateRemote {
    pub fn set(&self, sha: &str, status: DeploymentStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(sha.to_string(), Ok(status));
    }

    pub fn fail(&self, sha: &str) {
        self.statuses.lock().unwrap().insert(
            sha.to_string(),
            Err(RemoteError::Transport {
                url: "http://ci.test/status".to_string(),
                message: "connection refused".to_string(),
            }),
        );
    }

    pub fn set_history(&self, records: Vec<DeploymentRecord>) {
        *self.history.lock().unwrap() = records;
    }
}

impl RemoteHistory for StateRemote {
    fn status(&self, sha: &CommitSha) -> Result<RemoteStatus, RemoteError> {
        let status = self
            .statuses
            .lock()
            .unwrap()
            .get(sha.as_str())
            .cloned()
            .unwrap_or(Ok(DeploymentStatus::Pending))?;
        Ok(RemoteStatus {
            commit_sha: sha.clone(),
            status,
            message: None,
            workflow_url: Some(format!("https://ci.test/runs/{sha}")),
            started_at: None,
            updated_at: None,
        })
    }

    fn history(&self) -> Result<Vec<DeploymentRecord>, RemoteError> {
        Ok(self.history.lock().unwrap().clone())
    }
}

/// Long poll periods so only the immediate first tick of each poller runs.
pub fn quiet_settings() -> Settings {
    Settings {
        poll_interval_secs: 3600,
        history_poll_interval_secs: 3600,
        ..Settings::default()
    }
}

pub fn service(
    home: &std::path::Path,
    settings: Settings,
) -> (DeploymentService, Arc<StateRemote>, HistoryStore) {
    let remote = Arc::new(StateRemote::default());
    let store = HistoryStore::at(home, settings.max_history);
    let service = DeploymentService::new(settings, store.clone(), remote.clone());
    (service, remote, store)
}

pub fn running(sha: &str, started_at: DateTime<Utc>) -> DeploymentRecord {
    let mut record =
        DeploymentRecord::pending(CommitSha::from(sha), "Update post", None, started_at);
    record.status = DeploymentStatus::InProgress;
    record
}

/// Wait for the first event matching `pred`.
pub async fn next_matching(
    rx: &mut broadcast::Receiver<TrackerEvent>,
    pred: impl Fn(&TrackerEvent) -> bool,
) -> TrackerEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
