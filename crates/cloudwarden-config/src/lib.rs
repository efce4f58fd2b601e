//! Configuration for cloudwarden
//!
//! A single optional YAML file supplies defaults for the profile, region,
//! retry and polling knobs, and per-action bulk caps. Command-line flags
//! override anything set here.

pub mod error;

pub use error::{ConfigError, Result};

use cloudwarden_cloud::ActionType;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable pointing at an explicit config file
pub const CONFIG_PATH_ENV: &str = "WARDEN_CONFIG_PATH";

/// File names searched in the current directory, in order
const LOCAL_CANDIDATES: &[&str] = &["warden.local.yaml", "warden.yaml"];

/// Floor for both polling intervals
const MIN_POLL_INTERVAL_MS: u64 = 100;

/// `~/.config/cloudwarden`
pub fn config_dir() -> Result<PathBuf> {
    let dir = dirs::config_dir().ok_or(ConfigError::ConfigDirNotFound)?;
    Ok(dir.join("cloudwarden"))
}

/// Locate the config file
///
/// Precedence:
/// 1. `WARDEN_CONFIG_PATH` (used as-is when the file exists)
/// 2. `./warden.local.yaml`, `./warden.yaml`
/// 3. `~/.config/cloudwarden/config.yaml`
pub fn find_config_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Some(path);
        }
        debug!(path = %path.display(), "{} set but file does not exist", CONFIG_PATH_ENV);
    }

    for name in LOCAL_CANDIDATES {
        let path = PathBuf::from(name);
        if path.is_file() {
            return Some(path);
        }
    }

    let global = config_dir().ok()?.join("config.yaml");
    global.is_file().then_some(global)
}

/// Retry knobs; unset fields keep the built-in policy value
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub multiplier: Option<f64>,
    pub jitter: Option<f64>,
}

/// Completion polling knobs
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollSettings {
    pub initial_interval_ms: Option<u64>,
    pub max_interval_ms: Option<u64>,
    pub multiplier: Option<f64>,
    pub max_wait_secs: Option<u64>,
}

/// Parsed config file
///
/// ```yaml
/// profile: ops
/// region: eu-west-1
/// listing:
///   max_attempts: 5
/// polling:
///   max_wait_secs: 1200
/// bulk_caps:
///   create-user: 200
///   terminate: 10
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub profile: Option<String>,
    pub region: Option<String>,
    pub listing: RetrySettings,
    pub mutation: RetrySettings,
    pub polling: PollSettings,
    /// Keyed by action name, e.g. `create-user` or `terminate`
    pub bulk_caps: BTreeMap<String, usize>,
}

impl Settings {
    /// Load from the discovered config file, or defaults when there is none
    pub fn load() -> Result<(Self, Option<PathBuf>)> {
        match find_config_file() {
            Some(path) => {
                let settings = Self::from_path(&path)?;
                debug!(path = %path.display(), "Loaded config");
                Ok((settings, Some(path)))
            }
            None => Ok((Self::default(), None)),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn bulk_cap(&self, action: ActionType) -> Option<usize> {
        self.bulk_caps.get(&action.to_string()).copied()
    }

    fn validate(&self) -> Result<()> {
        for (name, retry) in [("listing", &self.listing), ("mutation", &self.mutation)] {
            if retry.max_attempts == Some(0) {
                return Err(invalid(format!("{name}.max_attempts"), "must be at least 1"));
            }
            if let Some(jitter) = retry.jitter {
                if !(0.0..=1.0).contains(&jitter) {
                    return Err(invalid(format!("{name}.jitter"), "must be between 0 and 1"));
                }
            }
            if retry.multiplier.is_some_and(|m| m < 1.0) {
                return Err(invalid(format!("{name}.multiplier"), "must be >= 1.0"));
            }
        }
        if self.polling.multiplier.is_some_and(|m| m < 1.0) {
            return Err(invalid("polling.multiplier".to_string(), "must be >= 1.0"));
        }
        if self.polling.max_wait_secs == Some(0) {
            return Err(invalid("polling.max_wait_secs".to_string(), "must be positive"));
        }
        for (name, interval) in [
            ("initial_interval_ms", self.polling.initial_interval_ms),
            ("max_interval_ms", self.polling.max_interval_ms),
        ] {
            if interval.is_some_and(|ms| ms < MIN_POLL_INTERVAL_MS) {
                return Err(invalid(
                    format!("polling.{name}"),
                    &format!("must be at least {MIN_POLL_INTERVAL_MS}"),
                ));
            }
        }
        if let (Some(initial), Some(max)) =
            (self.polling.initial_interval_ms, self.polling.max_interval_ms)
        {
            if max < initial {
                return Err(invalid(
                    "polling.max_interval_ms".to_string(),
                    "must not be below polling.initial_interval_ms",
                ));
            }
        }
        for key in self.bulk_caps.keys() {
            if key.parse::<ActionType>().is_err() {
                let known: Vec<String> = ActionType::ALL.iter().map(|a| a.to_string()).collect();
                return Err(invalid(
                    format!("bulk_caps.{key}"),
                    &format!("unknown action; expected one of {}", known.join(", ")),
                ));
            }
        }
        Ok(())
    }
}

fn invalid(key: String, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        reason: reason.to_string(),
    }
}
