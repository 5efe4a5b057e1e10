pub mod config;
pub mod daemon;
pub mod history;
pub mod status;
pub mod track;
pub mod watch;

use std::path::PathBuf;

use anyhow::{Context, Result};
use pressroom_sync::RemoteState;

pub(crate) fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Short parenthetical for the summary line; `None` when CI answered.
pub(crate) fn remote_note(remote: &RemoteState) -> Option<String> {
    match remote {
        RemoteState::Fresh => None,
        RemoteState::NotConfigured { .. } => Some("CI not configured".to_string()),
        RemoteState::Unavailable { .. } => Some("CI unreachable, local history only".to_string()),
    }
}
