//! Bus subscriber that drives the banner and content-changed signals.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};

use pressroom_core::{BannerSettings, DeploymentRecord};
use pressroom_renderer::{bind_banner, changed_kinds, BannerState, BannerView, ContentKind};

use crate::error::DaemonError;
use crate::events::TrackerEvent;

#[derive(Clone)]
pub struct Presenter {
    banner: Arc<Mutex<BannerState>>,
    settings: Arc<Mutex<BannerSettings>>,
    events: broadcast::Sender<TrackerEvent>,
}

impl Presenter {
    pub fn new(events: broadcast::Sender<TrackerEvent>, settings: BannerSettings) -> Self {
        Self {
            banner: Arc::new(Mutex::new(BannerState::Hidden)),
            settings: Arc::new(Mutex::new(settings)),
            events,
        }
    }

    pub async fn set_banner_settings(&self, settings: BannerSettings) {
        *self.settings.lock().await = settings;
    }

    pub async fn banner_state(&self) -> BannerState {
        self.banner.lock().await.clone()
    }

    /// Current banner for the given active list.
    pub async fn banner(&self, active: &[DeploymentRecord]) -> BannerView {
        let settings = *self.settings.lock().await;
        let now = Utc::now();
        let mut banner = self.banner.lock().await;
        if banner.expire(now, &settings) {
            tracing::debug!("banner hidden");
        }
        bind_banner(&banner, active, &settings, now)
    }

    /// Fold one event into the banner. Returns the content kinds signalled.
    pub async fn handle(&self, event: &TrackerEvent) -> Vec<ContentKind> {
        match event {
            TrackerEvent::Tracked { record, .. } => {
                self.banner.lock().await.activate(record.started_at, 1);
                Vec::new()
            }
            TrackerEvent::Adopted { records } => {
                if let Some(oldest) = records.iter().map(|r| r.started_at).min() {
                    self.banner.lock().await.activate(oldest, records.len());
                }
                Vec::new()
            }
            TrackerEvent::Drained { success, records } => {
                self.banner
                    .lock()
                    .await
                    .settle(*success, records.len(), Utc::now());
                if !*success {
                    return Vec::new();
                }
                let kinds: Vec<ContentKind> = changed_kinds(records).into_iter().collect();
                for kind in &kinds {
                    tracing::info!(kind = %kind, "content changed");
                    let _ = self.events.send(TrackerEvent::ContentChanged { kind: *kind });
                }
                kinds
            }
            TrackerEvent::Progress { .. }
            | TrackerEvent::Settled { .. }
            | TrackerEvent::ContentChanged { .. }
            | TrackerEvent::HistoryRefreshed { .. } => Vec::new(),
        }
    }

    /// Consume the bus until shutdown.
    pub async fn run(
        self,
        mut events_rx: broadcast::Receiver<TrackerEvent>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), DaemonError> {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                event = events_rx.recv() => match event {
                    Ok(event) => {
                        self.handle(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "presenter lagged behind the event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pressroom_core::{CommitSha, DeploymentStatus};
    use pressroom_renderer::BannerPhase;

    fn settled(sha: &str, action: &str, status: DeploymentStatus) -> DeploymentRecord {
        let mut record = DeploymentRecord::pending(CommitSha::from(sha), action, None, Utc::now());
        record.settle(status, Utc::now());
        record
    }

    #[tokio::test]
    async fn successful_drain_signals_each_kind_once() {
        let (tx, mut rx) = broadcast::channel(16);
        let presenter = Presenter::new(tx, BannerSettings::default());

        let kinds = presenter
            .handle(&TrackerEvent::Drained {
                success: true,
                records: vec![
                    settled("a", "Create post: a.md", DeploymentStatus::Completed),
                    settled("b", "Update post: b.md", DeploymentStatus::Completed),
                    settled("c", "Update page: c.md", DeploymentStatus::Skipped),
                ],
            })
            .await;
        assert_eq!(kinds, vec![ContentKind::Post, ContentKind::Page]);

        let mut signalled = Vec::new();
        while let Ok(TrackerEvent::ContentChanged { kind }) = rx.try_recv() {
            signalled.push(kind);
        }
        assert_eq!(signalled, kinds);

        let banner = presenter.banner(&[]).await;
        assert_eq!(banner.phase, BannerPhase::Settled);
        assert_eq!(banner.settled_count, 3);
    }

    #[tokio::test]
    async fn failed_drain_signals_nothing() {
        let (tx, mut rx) = broadcast::channel(16);
        let presenter = Presenter::new(tx, BannerSettings::default());
        let kinds = presenter
            .handle(&TrackerEvent::Drained {
                success: false,
                records: vec![settled("a", "Create post", DeploymentStatus::Failed)],
            })
            .await;
        assert!(kinds.is_empty());
        assert!(rx.try_recv().is_err());
    }
}
