//! `pressroom history`: reconciled local + CI history.
//!
//! Asks the daemon first. When it is not running, reconciles directly from
//! `~/.pressroom` and the configured CI endpoint.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use serde::Serialize;

use pressroom_core::{settings, DeploymentRecord, HistoryStore};
use pressroom_daemon::{request_history, DaemonError};
use pressroom_renderer::{bind_dashboard, user_template_dir_at, DashboardRow, TemplateEngine};
use pressroom_sync::{get_history, HistoryView, HttpRemote, RemoteState};

use super::status::rows_table;
use super::{home_dir, remote_note};

/// Arguments for `pressroom history`.
#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,

    /// Include cancelled and skipped runs.
    #[arg(long)]
    pub show_superseded: bool,
}

#[derive(Serialize)]
struct HistoryJson {
    source: &'static str,
    remote: RemoteState,
    active: Vec<DashboardRow>,
    history: Vec<DashboardRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    superseded: Option<Vec<DashboardRow>>,
}

impl HistoryArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let (view, active, source) = match request_history(&home) {
            Ok(data) => {
                let view: HistoryView = serde_json::from_value(data["history"].clone())
                    .context("daemon returned malformed history")?;
                let active: Vec<DeploymentRecord> = serde_json::from_value(data["active"].clone())
                    .context("daemon returned malformed active deployments")?;
                (view, active, "daemon")
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                (offline_history(&home)?, Vec::new(), "offline")
            }
            Err(err) => return Err(err).context("failed to query daemon history"),
        };

        let dashboard = bind_dashboard(&active, &view.records, Utc::now());

        if self.json {
            let payload = HistoryJson {
                source,
                remote: view.remote,
                active: dashboard.active,
                history: dashboard.history,
                superseded: self.show_superseded.then_some(dashboard.superseded),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload)
                    .context("failed to serialize history JSON")?
            );
            return Ok(());
        }

        let engine = TemplateEngine::new(Some(&user_template_dir_at(&home)))
            .context("failed to load templates")?;
        let note = remote_note(&view.remote);
        println!(
            "{}",
            engine
                .summary(&dashboard, note.as_deref())
                .context("failed to render history summary")?
        );

        if dashboard.is_empty() {
            println!("No deployments yet.");
            return Ok(());
        }
        if !dashboard.active.is_empty() {
            println!("Publishing");
            println!("{}", rows_table(&dashboard.active));
        }
        if !dashboard.history.is_empty() {
            println!("History");
            println!("{}", rows_table(&dashboard.history));
        }
        if self.show_superseded && !dashboard.superseded.is_empty() {
            println!("Superseded");
            println!("{}", rows_table(&dashboard.superseded));
        }
        Ok(())
    }
}

fn offline_history(home: &Path) -> Result<HistoryView> {
    let settings = settings::load_at(home).context("failed to load settings")?;
    let store = HistoryStore::at(home, settings.max_history);
    let remote = HttpRemote::from_settings(&settings.remote);
    get_history(&store, &remote).context("failed to read deployment history")
}
