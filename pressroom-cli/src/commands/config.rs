//! `pressroom config show|set`.
//!
//! `set` goes through the daemon when it is running so the change applies
//! without a restart; otherwise it edits `~/.pressroom/config.yaml` directly.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde_json::Value;
use tabled::{settings::Style, Table, Tabled};

use pressroom_core::settings;
use pressroom_daemon::{request_configure, request_status, DaemonError};

use super::home_dir;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective settings.
    Show {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Change one setting by its dotted key, e.g. `remote.base_url`.
    Set(SetArgs),
}

#[derive(Args, Debug)]
pub struct SetArgs {
    pub key: String,
    /// New value; an empty string clears optional fields.
    pub value: String,
}

#[derive(Tabled)]
struct SettingRow {
    #[tabled(rename = "key")]
    key: String,
    #[tabled(rename = "value")]
    value: String,
}

pub fn run(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show { json } => show(json),
        ConfigCommand::Set(args) => set(args),
    }
}

fn show(json: bool) -> Result<()> {
    let home = home_dir()?;
    let settings = match request_status(&home) {
        Ok(status) => status["settings"].clone(),
        Err(DaemonError::DaemonNotRunning { .. }) => {
            let mut local = settings::load_at(&home).context("failed to load settings")?;
            if local.remote.token.is_some() {
                local.remote.token = Some("********".to_string());
            }
            serde_json::to_value(local).context("failed to serialize settings")?
        }
        Err(err) => return Err(err).context("failed to query daemon settings"),
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&settings).context("failed to serialize settings")?
        );
        return Ok(());
    }

    let mut rows = Vec::new();
    flatten("", &settings, &mut rows);
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn set(args: SetArgs) -> Result<()> {
    let home = home_dir()?;
    match request_configure(&home, Some((args.key.as_str(), args.value.as_str()))) {
        Ok(_) => {
            println!("set {} = {} (applied to running daemon)", args.key, args.value);
            return Ok(());
        }
        Err(DaemonError::DaemonNotRunning { .. }) => {}
        Err(err) => {
            return Err(err).with_context(|| format!("failed to set '{}'", args.key));
        }
    }

    let mut current = settings::load_at(&home).context("failed to load settings")?;
    current
        .set_field(&args.key, &args.value)
        .with_context(|| format!("failed to set '{}'", args.key))?;
    settings::save_at(&home, &current).context("failed to save settings")?;
    println!("set {} = {}", args.key, args.value);
    Ok(())
}

fn flatten(prefix: &str, value: &Value, rows: &mut Vec<SettingRow>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let key = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&key, child, rows);
            }
        }
        Value::String(s) => rows.push(SettingRow {
            key: prefix.to_string(),
            value: s.clone(),
        }),
        other => rows.push(SettingRow {
            key: prefix.to_string(),
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_settings_flatten_to_dotted_keys() {
        let value = serde_json::json!({
            "poll_interval_secs": 5,
            "remote": { "base_url": "https://ci.example", "request_timeout_secs": 10 },
        });
        let mut rows = Vec::new();
        flatten("", &value, &mut rows);
        let keys: Vec<&str> = rows.iter().map(|r| r.key.as_str()).collect();
        assert!(keys.contains(&"poll_interval_secs"));
        assert!(keys.contains(&"remote.base_url"));
        let url = rows.iter().find(|r| r.key == "remote.base_url").unwrap();
        assert_eq!(url.value, "https://ci.example");
    }
}
