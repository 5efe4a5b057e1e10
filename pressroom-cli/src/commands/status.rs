//! `pressroom status`: banner and active deployments from the daemon.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use serde::Deserialize;
use serde_json::Value;
use tabled::{settings::Style, Table, Tabled};

use pressroom_core::DeploymentRecord;
use pressroom_daemon::{request_status, DaemonError};
use pressroom_renderer::{
    bind_dashboard, user_template_dir_at, BannerView, DashboardRow, TemplateEngine, Tone,
};
use pressroom_sync::RemoteState;

use super::{home_dir, remote_note};

/// Arguments for `pressroom status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Deserialize)]
struct ActiveEntry {
    record: DeploymentRecord,
}

#[derive(Tabled)]
pub(crate) struct RowTable {
    #[tabled(rename = "sha")]
    sha: String,
    #[tabled(rename = "action")]
    action: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "time")]
    time: String,
}

impl From<&DashboardRow> for RowTable {
    fn from(row: &DashboardRow) -> Self {
        Self {
            sha: row.short_sha.clone(),
            action: row.action.clone(),
            status: row.status.to_string(),
            time: row.duration_label.clone(),
        }
    }
}

pub(crate) fn rows_table(rows: &[DashboardRow]) -> String {
    let mut table = Table::new(rows.iter().map(RowTable::from));
    table.with(Style::rounded());
    table.to_string()
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let status = match request_status(&home) {
            Ok(status) => status,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                if self.json {
                    println!("{}", serde_json::json!({ "running": false }));
                } else {
                    println!("daemon is not running; start it with `pressroom daemon start`");
                }
                return Ok(());
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        };

        let engine = TemplateEngine::new(Some(&user_template_dir_at(&home)))
            .context("failed to load banner templates")?;
        let banner: BannerView = serde_json::from_value(status["banner"].clone())
            .context("daemon returned a malformed banner")?;
        let banner_text = engine
            .banner(&banner)
            .context("failed to render banner")?;

        if self.json {
            let mut payload = status;
            payload["banner_text"] = Value::String(banner_text);
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        let active: Vec<ActiveEntry> = serde_json::from_value(status["active"].clone())
            .context("daemon returned malformed active deployments")?;
        let remote: Option<RemoteState> = serde_json::from_value(status["remote"].clone())
            .context("daemon returned a malformed remote state")?;
        let records: Vec<DeploymentRecord> = active.into_iter().map(|a| a.record).collect();

        let mut header = format!(
            "Pressroom v{} | {} publishing",
            env!("CARGO_PKG_VERSION"),
            records.len()
        );
        if let Some(note) = remote.as_ref().and_then(remote_note) {
            header.push_str(&format!(" | {note}"));
        }
        println!("{header}");

        if !banner_text.is_empty() {
            println!("{}", tone_colored(&banner_text, banner.tone));
        }

        let view = bind_dashboard(&records, &[], Utc::now());
        if view.active.is_empty() {
            println!("Nothing is publishing.");
        } else {
            println!("{}", rows_table(&view.active));
        }
        Ok(())
    }
}

fn tone_colored(text: &str, tone: Tone) -> String {
    match tone {
        Tone::Waiting => text.cyan().to_string(),
        Tone::Progress => text.yellow().bold().to_string(),
        Tone::Success => text.green().bold().to_string(),
        Tone::Failure => text.red().bold().to_string(),
        Tone::Muted => text.bright_black().to_string(),
    }
}
