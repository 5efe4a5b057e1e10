//! Runtime settings persisted at `~/.pressroom/config.yaml`.
//!
//! Every field has a default, so a missing file or a partial file is valid.
//! The daemon applies changed settings in place: pollers are stopped,
//! reconfigured, and restarted without restarting the process.
//!
//! Like the history store, file functions come in two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests
//! - `fn(…)`: derives home from `dirs::home_dir()`

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, StoreError};
use crate::history::DEFAULT_MAX_HISTORY;

pub const SETTINGS_FILE: &str = "config.yaml";

/// Longest a settled banner may linger.
pub const MAX_BANNER_HIDE_SECS: u64 = 86_400;

/// Poller cadence, timeouts, and integration endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Status poller period.
    pub poll_interval_secs: u64,
    /// History poller period (dashboard refresh + adoption of foreign runs).
    pub history_poll_interval_secs: u64,
    /// Age after which a non-terminal deployment is forced to `failed`.
    pub deployment_timeout_secs: u64,
    /// Cap on the persisted history.
    pub max_history: usize,
    /// Refuse to track a sha that is already active.
    pub dedup_tracking: bool,
    pub remote: RemoteSettings,
    pub banner: BannerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            history_poll_interval_secs: 15,
            deployment_timeout_secs: 600,
            max_history: DEFAULT_MAX_HISTORY,
            dedup_tracking: false,
            remote: RemoteSettings::default(),
            banner: BannerSettings::default(),
        }
    }
}

/// Where the CI status proxy lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    /// Base URL exposing `status?sha=` and `history`. Unset means the
    /// integration is not configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Sent as a bearer token when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            request_timeout_secs: 10,
        }
    }
}

/// How long a settled banner stays on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BannerSettings {
    pub success_hide_secs: u64,
    pub failure_hide_secs: u64,
}

impl Default for BannerSettings {
    fn default() -> Self {
        Self {
            success_hide_secs: 5,
            failure_hide_secs: 8,
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn history_poll_interval(&self) -> Duration {
        Duration::from_secs(self.history_poll_interval_secs)
    }

    pub fn deployment_timeout(&self) -> Duration {
        Duration::from_secs(self.deployment_timeout_secs)
    }

    /// Reject values the pollers cannot run with.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.poll_interval_secs == 0 {
            return Err(invalid("poll_interval_secs must be at least 1"));
        }
        if self.history_poll_interval_secs == 0 {
            return Err(invalid("history_poll_interval_secs must be at least 1"));
        }
        if self.deployment_timeout_secs == 0 {
            return Err(invalid("deployment_timeout_secs must be at least 1"));
        }
        if self.max_history == 0 {
            return Err(invalid("max_history must be at least 1"));
        }
        if self.remote.request_timeout_secs == 0 {
            return Err(invalid("remote.request_timeout_secs must be at least 1"));
        }
        if self.banner.success_hide_secs > MAX_BANNER_HIDE_SECS {
            return Err(invalid(format!(
                "banner.success_hide_secs must be at most {MAX_BANNER_HIDE_SECS}"
            )));
        }
        if self.banner.failure_hide_secs > MAX_BANNER_HIDE_SECS {
            return Err(invalid(format!(
                "banner.failure_hide_secs must be at most {MAX_BANNER_HIDE_SECS}"
            )));
        }
        Ok(())
    }

    /// Set one field from its dotted key, e.g. `remote.base_url`.
    ///
    /// An empty value clears optional fields.
    /// The settings are left untouched when the new value is rejected.
    pub fn set_field(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut next = self.clone();
        next.assign(key, value.trim())?;
        next.validate()?;
        *self = next;
        Ok(())
    }

    fn assign(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        match key {
            "poll_interval_secs" => self.poll_interval_secs = parse_number(key, value)?,
            "history_poll_interval_secs" => {
                self.history_poll_interval_secs = parse_number(key, value)?
            }
            "deployment_timeout_secs" => self.deployment_timeout_secs = parse_number(key, value)?,
            "max_history" => self.max_history = parse_number(key, value)?,
            "dedup_tracking" => {
                self.dedup_tracking = value
                    .parse()
                    .map_err(|_| invalid(format!("{key} expects true or false, got '{value}'")))?
            }
            "remote.base_url" => self.remote.base_url = optional(value),
            "remote.token" => self.remote.token = optional(value),
            "remote.request_timeout_secs" => {
                self.remote.request_timeout_secs = parse_number(key, value)?
            }
            "banner.success_hide_secs" => self.banner.success_hide_secs = parse_number(key, value)?,
            "banner.failure_hide_secs" => self.banner.failure_hide_secs = parse_number(key, value)?,
            other => return Err(invalid(format!("unknown setting '{other}'"))),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// `<home>/.pressroom/config.yaml`. Pure, no I/O.
pub fn settings_path_at(home: &Path) -> PathBuf {
    home.join(".pressroom").join(SETTINGS_FILE)
}

/// Load settings; a missing file yields [`Settings::default`].
pub fn load_at(home: &Path) -> Result<Settings, StoreError> {
    let path = settings_path_at(home);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Settings::default()),
        Err(err) => return Err(io_err(&path, err)),
    };
    if contents.trim().is_empty() {
        return Ok(Settings::default());
    }
    let settings: Settings =
        serde_yaml::from_str(&contents).map_err(|e| StoreError::Parse { path, source: e })?;
    settings.validate()?;
    Ok(settings)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Settings, StoreError> {
    load_at(&home()?)
}

/// Atomically save settings (mode `0600`; the file may hold a token).
pub fn save_at(home: &Path, settings: &Settings) -> Result<(), StoreError> {
    settings.validate()?;
    let path = settings_path_at(home);
    let Some(dir) = path.parent() else {
        return Err(io_err(&path, std::io::Error::other("invalid settings path")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let yaml = serde_yaml::to_string(settings)?;
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(settings: &Settings) -> Result<(), StoreError> {
    save_at(&home()?, settings)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, StoreError> {
    dirs::home_dir().ok_or(StoreError::HomeNotFound)
}

fn invalid(message: impl Into<String>) -> StoreError {
    StoreError::InvalidSettings(message.into())
}

fn optional(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, StoreError> {
    value
        .parse()
        .map_err(|_| invalid(format!("{key} expects a whole number, got '{value}'")))
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.poll_interval(), Duration::from_secs(5));
        assert_eq!(settings.deployment_timeout(), Duration::from_secs(600));
        assert_eq!(settings.max_history, 50);
        assert!(!settings.dedup_tracking);
        assert_eq!(settings.banner.success_hide_secs, 5);
        assert_eq!(settings.banner.failure_hide_secs, 8);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let home = TempDir::new().expect("tempdir");
        assert_eq!(load_at(home.path()).expect("load"), Settings::default());
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let home = TempDir::new().expect("tempdir");
        let path = settings_path_at(home.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "poll_interval_secs: 2\nremote:\n  base_url: http://ci\n").unwrap();

        let settings = load_at(home.path()).expect("load");
        assert_eq!(settings.poll_interval_secs, 2);
        assert_eq!(settings.remote.base_url.as_deref(), Some("http://ci"));
        assert_eq!(settings.history_poll_interval_secs, 15);
    }

    #[test]
    fn set_field_rejects_unknown_keys_and_zero_intervals() {
        let mut settings = Settings::default();
        assert!(matches!(
            settings.set_field("nope", "1"),
            Err(StoreError::InvalidSettings(_))
        ));
        assert!(settings.set_field("poll_interval_secs", "0").is_err());
        assert_eq!(settings.poll_interval_secs, 5, "rejected value must not stick");
        settings.set_field("remote.token", "").expect("clear token");
        assert_eq!(settings.remote.token, None);
    }

    #[rstest]
    #[case("banner.success_hide_secs")]
    #[case("banner.failure_hide_secs")]
    fn banner_hide_delays_are_capped_at_a_day(#[case] key: &str) {
        let mut settings = Settings::default();
        assert!(matches!(
            settings.set_field(key, "100000000000000"),
            Err(StoreError::InvalidSettings(_))
        ));
        assert_eq!(settings, Settings::default(), "rejected value must not stick");
        settings.set_field(key, "86400").expect("one day is allowed");
        assert!(settings.set_field(key, "86401").is_err());
    }

    #[test]
    fn save_and_load_roundtrip_with_permissions() {
        let home = TempDir::new().expect("tempdir");
        let mut settings = Settings::default();
        settings.set_field("max_history", "10").expect("set");
        save_at(home.path(), &settings).expect("save");
        assert_eq!(load_at(home.path()).expect("load"), settings);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(settings_path_at(home.path()))
                .unwrap()
                .permissions()
                .mode()
                & 0o777;
            assert_eq!(mode, 0o600);
        }
    }
}
