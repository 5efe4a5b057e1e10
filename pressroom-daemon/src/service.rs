//! Deployment service: the single owner of tracker state, pollers, and the
//! event bus.
//!
//! `track` registers a publish and makes sure the status poller runs. The
//! status poller walks the active list each tick, times out stale records,
//! and applies CI answers by tracking id. Settled records move to the local
//! history store. The history poller reconciles local and remote history and
//! adopts runs started elsewhere. Blocking CI and store calls run on
//! `spawn_blocking`.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::Instant;

use pressroom_core::{
    settings, CommitSha, DeploymentRecord, HistoryStore, Settings, Transition,
};
use pressroom_sync::{
    reconcile, HistoryView, HttpRemote, RemoteError, RemoteHistory, RemoteState,
};

use crate::error::{join_err, DaemonError};
use crate::events::{TrackerEvent, EVENT_BUS_CAPACITY};
use crate::poller::{LogThrottle, PeriodicTask};
use crate::tracker::{ActiveDeployment, Drained, Step, TrackOutcome, TrackerState};

#[derive(Clone)]
pub struct DeploymentService {
    inner: Arc<Inner>,
}

struct Inner {
    settings: RwLock<Settings>,
    tracker: Mutex<TrackerState>,
    store: RwLock<HistoryStore>,
    remote: RwLock<Arc<dyn RemoteHistory>>,
    /// Rebuild the HTTP client when `remote.*` settings change.
    rebuild_remote: bool,
    events: broadcast::Sender<TrackerEvent>,
    status_poller: Mutex<Option<PeriodicTask>>,
    history_poller: Mutex<Option<PeriodicTask>>,
    last_remote: RwLock<Option<RemoteState>>,
    throttle: Mutex<LogThrottle>,
    started: AtomicBool,
}

/// Point-in-time view for the `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceSnapshot {
    pub active: Vec<ActiveDeployment>,
    pub status_poller_running: bool,
    pub history_poller_running: bool,
    pub remote: Option<RemoteState>,
    pub settings: Settings,
}

impl DeploymentService {
    pub fn new(settings: Settings, store: HistoryStore, remote: Arc<dyn RemoteHistory>) -> Self {
        Self::build(settings, store, remote, false)
    }

    /// Service backed by `~/.pressroom` and the HTTP CI client.
    pub fn open(home: &Path) -> Result<Self, DaemonError> {
        let settings = settings::load_at(home)?;
        let store = HistoryStore::at(home, settings.max_history);
        let remote: Arc<dyn RemoteHistory> =
            Arc::new(HttpRemote::from_settings(&settings.remote));
        Ok(Self::build(settings, store, remote, true))
    }

    fn build(
        settings: Settings,
        store: HistoryStore,
        remote: Arc<dyn RemoteHistory>,
        rebuild_remote: bool,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        let tracker = TrackerState::new(settings.dedup_tracking, settings.deployment_timeout());
        Self {
            inner: Arc::new(Inner {
                settings: RwLock::new(settings),
                tracker: Mutex::new(tracker),
                store: RwLock::new(store),
                remote: RwLock::new(remote),
                rebuild_remote,
                events,
                status_poller: Mutex::new(None),
                history_poller: Mutex::new(None),
                last_remote: RwLock::new(None),
                throttle: Mutex::new(LogThrottle::default()),
                started: AtomicBool::new(false),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.inner.events.subscribe()
    }

    pub fn event_sender(&self) -> broadcast::Sender<TrackerEvent> {
        self.inner.events.clone()
    }

    pub async fn settings(&self) -> Settings {
        self.inner.settings.read().await.clone()
    }

    pub async fn active(&self) -> Vec<DeploymentRecord> {
        self.inner.tracker.lock().await.records()
    }

    fn emit(&self, event: TrackerEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Recover in-flight runs and start the history poller. Returns the
    /// number of adopted runs.
    pub async fn start(&self) -> usize {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return 0;
        }
        let adopted = self.recover().await;
        self.ensure_history_poller().await;
        adopted
    }

    /// Adopt non-terminal remote runs. A failure leaves the tracker empty.
    pub async fn recover(&self) -> usize {
        match self.refresh().await {
            Ok((view, adopted)) => {
                tracing::info!(
                    adopted,
                    history = view.records.len(),
                    remote = ?view.remote,
                    "recovery finished",
                );
                adopted
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "recovery failed; starting with no active deployments",
                );
                0
            }
        }
    }

    /// Stop both pollers and wait for them to exit.
    pub async fn stop(&self) {
        let status = self.inner.status_poller.lock().await.take();
        let history = self.inner.history_poller.lock().await.take();
        for task in [status, history].into_iter().flatten() {
            task.stop().await;
        }
        self.inner.started.store(false, Ordering::SeqCst);
    }

    /// Apply new settings, restarting running pollers in place.
    pub async fn reconfigure(&self, next: Settings) -> Result<(), DaemonError> {
        next.validate()?;
        let previous = self.settings().await;
        if previous == next {
            return Ok(());
        }

        let status = self.inner.status_poller.lock().await.take();
        let history = self.inner.history_poller.lock().await.take();
        let status_was_running = status.as_ref().is_some_and(PeriodicTask::is_running);
        let history_was_running = history.as_ref().is_some_and(PeriodicTask::is_running);
        for task in [status, history].into_iter().flatten() {
            task.stop().await;
        }

        *self.inner.settings.write().await = next.clone();
        self.inner
            .tracker
            .lock()
            .await
            .set_policy(next.dedup_tracking, next.deployment_timeout());
        self.inner
            .store
            .write()
            .await
            .set_max_entries(next.max_history);
        if previous.remote != next.remote {
            if self.inner.rebuild_remote {
                let client = HttpRemote::from_settings(&next.remote);
                *self.inner.remote.write().await = Arc::new(client);
            } else {
                tracing::warn!("remote settings changed but this service has a fixed CI client");
            }
        }

        if history_was_running {
            self.ensure_history_poller().await;
        }
        let has_active = !self.inner.tracker.lock().await.is_empty();
        if status_was_running || has_active {
            self.ensure_status_poller().await;
        }
        tracing::info!(
            poll_interval_secs = next.poll_interval_secs,
            history_poll_interval_secs = next.history_poll_interval_secs,
            deployment_timeout_secs = next.deployment_timeout_secs,
            max_history = next.max_history,
            "settings applied",
        );
        Ok(())
    }

    pub async fn snapshot(&self) -> ServiceSnapshot {
        let active = self.inner.tracker.lock().await.active().to_vec();
        let status_poller_running = self
            .inner
            .status_poller
            .lock()
            .await
            .as_ref()
            .is_some_and(PeriodicTask::is_running);
        let history_poller_running = self
            .inner
            .history_poller
            .lock()
            .await
            .as_ref()
            .is_some_and(PeriodicTask::is_running);
        let mut settings = self.settings().await;
        if settings.remote.token.is_some() {
            settings.remote.token = Some("********".to_string());
        }
        ServiceSnapshot {
            active,
            status_poller_running,
            history_poller_running,
            remote: self.inner.last_remote.read().await.clone(),
            settings,
        }
    }

    // -----------------------------------------------------------------------
    // Tracking
    // -----------------------------------------------------------------------

    /// Register a locally initiated publish and make sure it is polled.
    pub async fn track(
        &self,
        sha: CommitSha,
        action: impl Into<String>,
        item_id: Option<String>,
    ) -> TrackOutcome {
        let (outcome, record) = {
            let mut tracker = self.inner.tracker.lock().await;
            let outcome = tracker.track(sha.clone(), action, item_id, Utc::now());
            let record = match outcome {
                TrackOutcome::Tracked(id) => tracker
                    .active()
                    .iter()
                    .find(|a| a.id == id)
                    .map(|a| a.record.clone()),
                _ => None,
            };
            (outcome, record)
        };

        match (outcome, record) {
            (TrackOutcome::Tracked(id), Some(record)) => {
                tracing::info!(
                    sha = %sha,
                    id = %id,
                    action = %record.action,
                    "tracking deployment",
                );
                self.emit(TrackerEvent::Tracked { id, record });
                self.ensure_status_poller().await;
            }
            (TrackOutcome::AlreadyActive(id), _) => {
                tracing::info!(sha = %sha, id = %id, "sha already active; not tracked again");
            }
            _ => tracing::debug!("empty commit sha; nothing to track"),
        }
        outcome
    }

    async fn ensure_status_poller(&self) {
        let mut slot = self.inner.status_poller.lock().await;
        if slot.as_ref().is_some_and(PeriodicTask::is_running) {
            return;
        }
        let period = self.inner.settings.read().await.poll_interval();
        let weak = Arc::downgrade(&self.inner);
        *slot = Some(PeriodicTask::spawn("status_poller", period, move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    DeploymentService { inner }.poll_once().await;
                }
            }
        }));
    }

    async fn ensure_history_poller(&self) {
        let mut slot = self.inner.history_poller.lock().await;
        if slot.as_ref().is_some_and(PeriodicTask::is_running) {
            return;
        }
        let period = self.inner.settings.read().await.history_poll_interval();
        let weak = Arc::downgrade(&self.inner);
        *slot = Some(PeriodicTask::spawn("history_poller", period, move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    if let Err(err) = (DeploymentService { inner }).refresh_history().await {
                        tracing::warn!(error = %err, "history refresh failed");
                    }
                }
            }
        }));
    }

    // -----------------------------------------------------------------------
    // Status poller tick
    // -----------------------------------------------------------------------

    /// One status poller tick.
    pub async fn poll_once(&self) {
        let checks = {
            let tracker = self.inner.tracker.lock().await;
            if tracker.is_empty() {
                return;
            }
            self.emit(TrackerEvent::Progress {
                active: tracker.len(),
                elapsed_secs: tracker.oldest_elapsed_secs(Utc::now()).unwrap_or(0),
            });
            tracker.checks()
        };
        let remote = self.inner.remote.read().await.clone();
        let store = self.inner.store.read().await.clone();

        for (id, sha) in checks {
            let expired = self.inner.tracker.lock().await.expire(id, Utc::now());
            if let Some(step) = expired {
                self.finish_step(step, &store).await;
                continue;
            }

            let remote = remote.clone();
            let query_sha = sha.clone();
            let fetched = tokio::task::spawn_blocking(move || remote.status(&query_sha)).await;
            let status = match fetched {
                Ok(Ok(status)) => status,
                Ok(Err(err)) => {
                    self.log_remote_error(&sha, &err).await;
                    continue;
                }
                Err(err) => {
                    let err = join_err("status query", err);
                    tracing::error!(sha = %sha, error = %err, "status query aborted");
                    continue;
                }
            };

            let step = self.inner.tracker.lock().await.apply(id, &status, Utc::now());
            if let Some(step) = step {
                self.finish_step(step, &store).await;
            }
        }
    }

    async fn finish_step(&self, step: Step, store: &HistoryStore) {
        match step.transition {
            Transition::Advanced => {
                tracing::info!(
                    sha = %step.record.commit_sha,
                    status = %step.record.status,
                    "deployment advanced",
                );
            }
            Transition::Settled => {
                let sha = step.record.commit_sha.clone();
                let store = store.clone();
                let events = self.inner.events.clone();
                // The record already left the tracker; a dropped tick must
                // not skip its write or its events.
                let finish = tokio::spawn(persist_and_announce(
                    step.record,
                    step.drained,
                    store,
                    events,
                ));
                if let Err(err) = finish.await {
                    let err = join_err("settle", err);
                    tracing::error!(sha = %sha, error = %err, "settle task failed");
                }
            }
            Transition::Unchanged | Transition::Ignored => {}
        }
    }

    async fn log_remote_error(&self, sha: &CommitSha, err: &RemoteError) {
        let admitted = self.inner.throttle.lock().await.admit(Instant::now());
        if let Some(suppressed) = admitted {
            tracing::warn!(
                sha = %sha,
                error = %err,
                suppressed,
                "CI status check failed; retrying next tick",
            );
        }
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    /// Reconciled history, fetched fresh. Does not adopt.
    pub async fn history(&self) -> Result<HistoryView, DaemonError> {
        let (local, fetched) = self.fetch_history_parts().await?;
        let view = reconcile(local, fetched);
        *self.inner.last_remote.write().await = Some(view.remote.clone());
        Ok(view)
    }

    /// One history poller tick: reconcile, then adopt foreign runs.
    pub async fn refresh_history(&self) -> Result<HistoryView, DaemonError> {
        self.refresh().await.map(|(view, _)| view)
    }

    async fn refresh(&self) -> Result<(HistoryView, usize), DaemonError> {
        let (local, fetched) = self.fetch_history_parts().await?;
        let adopted = match &fetched {
            Ok(runs) => self.adopt_foreign(&local, runs).await,
            Err(err) if err.is_not_configured() => {
                tracing::debug!(error = %err, "CI integration not configured");
                0
            }
            Err(err) => {
                tracing::warn!(error = %err, "remote history unavailable");
                0
            }
        };
        let view = reconcile(local, fetched);
        *self.inner.last_remote.write().await = Some(view.remote.clone());
        self.emit(TrackerEvent::HistoryRefreshed {
            records: view.records.len(),
            remote: view.remote.clone(),
        });
        Ok((view, adopted))
    }

    async fn fetch_history_parts(
        &self,
    ) -> Result<(Vec<DeploymentRecord>, Result<Vec<DeploymentRecord>, RemoteError>), DaemonError>
    {
        let remote = self.inner.remote.read().await.clone();
        let store = self.inner.store.read().await.clone();
        let (local, fetched) =
            tokio::task::spawn_blocking(move || (store.load(), remote.history()))
                .await
                .map_err(|err| join_err("history fetch", err))?;
        Ok((local?, fetched))
    }

    async fn adopt_foreign(
        &self,
        local: &[DeploymentRecord],
        runs: &[DeploymentRecord],
    ) -> usize {
        let settled: HashSet<&str> = local
            .iter()
            .filter(|r| r.is_terminal())
            .map(|r| r.commit_sha.as_str())
            .collect();
        let candidates = runs
            .iter()
            .filter(|r| !r.is_terminal() && !settled.contains(r.commit_sha.as_str()))
            .cloned();

        let records = {
            let mut tracker = self.inner.tracker.lock().await;
            let ids = tracker.adopt(candidates);
            tracker
                .active()
                .iter()
                .filter(|a| ids.contains(&a.id))
                .map(|a| a.record.clone())
                .collect::<Vec<_>>()
        };
        if records.is_empty() {
            return 0;
        }
        for record in &records {
            tracing::info!(
                sha = %record.commit_sha,
                status = %record.status,
                "adopted in-flight run",
            );
        }
        let adopted = records.len();
        self.emit(TrackerEvent::Adopted { records });
        self.ensure_status_poller().await;
        adopted
    }
}

/// Write a settled record to history, then announce it and any drain.
async fn persist_and_announce(
    record: DeploymentRecord,
    drained: Option<Drained>,
    store: HistoryStore,
    events: broadcast::Sender<TrackerEvent>,
) {
    let persisted = record.clone();
    match tokio::task::spawn_blocking(move || store.append(persisted)).await {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => {
            tracing::error!(
                sha = %record.commit_sha,
                error = %err,
                "failed to persist settled deployment",
            );
        }
        Err(err) => {
            let err = join_err("history append", err);
            tracing::error!(
                sha = %record.commit_sha,
                error = %err,
                "history append aborted",
            );
        }
    }
    tracing::info!(
        sha = %record.commit_sha,
        status = %record.status,
        duration_secs = record.duration.unwrap_or(0),
        "deployment settled",
    );
    let _ = events.send(TrackerEvent::Settled { record });
    if let Some(drained) = drained {
        tracing::info!(
            success = drained.success,
            records = drained.records.len(),
            "all deployments settled",
        );
        let _ = events.send(TrackerEvent::Drained {
            success: drained.success,
            records: drained.records,
        });
    }
}
