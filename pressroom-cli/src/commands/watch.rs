//! `pressroom watch`: follow tracker events from the daemon.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use serde_json::Value;

use pressroom_core::DeploymentRecord;
use pressroom_daemon::{watch, DaemonError};
use pressroom_renderer::{format_elapsed, user_template_dir_at, DashboardRow, TemplateEngine};

use super::home_dir;

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Print raw NDJSON events.
    #[arg(long)]
    pub json: bool,
}

impl WatchArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let engine = TemplateEngine::new(Some(&user_template_dir_at(&home)))
            .context("failed to load templates")?;
        let json = self.json;
        let result = watch(&home, |event| {
            if json {
                println!("{event}");
            } else if let Some(line) = describe(&engine, &event) {
                println!("{line}");
            }
            true
        });
        match result {
            Ok(()) => Ok(()),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                bail!("daemon is not running; start it with `pressroom daemon start`")
            }
            Err(err) => Err(err).context("event stream failed"),
        }
    }
}

fn record(event: &Value) -> Option<DeploymentRecord> {
    serde_json::from_value(event.get("record")?.clone()).ok()
}

fn describe(engine: &TemplateEngine, event: &Value) -> Option<String> {
    let name = event.get("event")?.as_str()?;
    let line = match name {
        "tracked" => {
            let record = record(event)?;
            format!(
                "{} {}  {}",
                "tracking".cyan(),
                record.commit_sha.short(),
                record.action
            )
        }
        "adopted" => {
            let count = event.get("records")?.as_array()?.len();
            format!("{} {count} run(s) started elsewhere", "adopted".cyan())
        }
        "progress" => {
            let active = event.get("active")?.as_u64()?;
            let elapsed = event.get("elapsed_secs")?.as_u64()?;
            format!("{active} publishing ({})", format_elapsed(elapsed))
                .bright_black()
                .to_string()
        }
        "settled" => {
            let row = DashboardRow::from_record(&record(event)?, Utc::now());
            engine.row(&row).ok()?
        }
        "drained" => {
            if event.get("success")?.as_bool()? {
                "all publishes landed".green().bold().to_string()
            } else {
                "a publish failed; check the workflow run".red().bold().to_string()
            }
        }
        "content_changed" => {
            let kind = event.get("kind")?.as_str()?;
            format!("{} {kind} lists", "refresh".magenta())
        }
        _ => return None,
    };
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_refreshes_are_not_printed() {
        let event = serde_json::json!({
            "event": "history_refreshed",
            "records": 3,
            "remote": { "state": "fresh" },
        });
        let engine = TemplateEngine::embedded().unwrap();
        assert!(describe(&engine, &event).is_none());
    }

    #[test]
    fn content_changes_name_the_kind() {
        colored::control::set_override(false);
        let engine = TemplateEngine::embedded().unwrap();
        let event = serde_json::json!({ "event": "content_changed", "kind": "post" });
        assert_eq!(describe(&engine, &event).unwrap(), "refresh post lists");
    }

    #[test]
    fn settled_events_use_the_row_template() {
        let engine = TemplateEngine::embedded().unwrap();
        let event = serde_json::json!({
            "event": "settled",
            "record": {
                "commitSha": "abc1234def",
                "action": "Create post: a.md",
                "status": "completed",
                "startedAt": "2026-01-01T00:00:00Z",
                "completedAt": "2026-01-01T00:01:05Z",
                "duration": 65,
            },
        });
        let line = describe(&engine, &event).unwrap();
        assert!(line.starts_with("abc1234  completed  1m 05s"), "{line}");
        assert!(line.contains("Create post: a.md"));
    }
}
