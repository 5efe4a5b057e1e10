//! `pressroom track <sha>`: hand a publish to the running daemon.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use pressroom_daemon::{request_track, DaemonError};

use super::home_dir;

#[derive(Args, Debug)]
pub struct TrackArgs {
    /// Commit sha produced by the publish.
    pub sha: String,

    /// Human-readable description, e.g. "Create post: hello.md".
    #[arg(long)]
    pub action: String,

    /// Content item the publish touched.
    #[arg(long = "item")]
    pub item_id: Option<String>,
}

impl TrackArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let item_id = self.item_id.as_deref();
        let response = match request_track(&home, &self.sha, &self.action, item_id) {
            Ok(response) => response,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                bail!("daemon is not running; start it with `pressroom daemon start`")
            }
            Err(err) => return Err(err).context("failed to send track request"),
        };

        let id = response.get("id").and_then(|v| v.as_u64());
        let tracked = response
            .get("tracked")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        match (tracked, id) {
            (true, Some(id)) => println!("{} {} (#{id})", "tracking".green().bold(), self.sha),
            (false, Some(id)) => println!("{} is already being tracked (#{id})", self.sha),
            // Empty sha: nothing to report.
            _ => {}
        }
        Ok(())
    }
}
