use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use directories::ProjectDirs;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{RemindError, Result, DEFAULT_REMINDER_TITLE};

/// Application configuration settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory holding the task records and the permission answer
    pub data_dir: PathBuf,

    /// Program run to show a notification outside the terminal
    pub notify_command: Option<String>,

    /// Icon passed to the notify command
    pub icon: Option<String>,

    /// Title of every reminder notification
    pub reminder_title: String,

    /// How long to wait for the notify command to become available (milliseconds)
    pub ready_timeout_ms: u64,

    /// Poll interval for platforms without native file events (seconds)
    pub watch_poll_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = ProjectDirs::from("", "", "remindr")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".remindr"));

        Self {
            data_dir,
            notify_command: default_notify_command(),
            icon: None,
            reminder_title: DEFAULT_REMINDER_TITLE.to_string(),
            ready_timeout_ms: 1500,
            watch_poll_secs: 2,
        }
    }
}

impl Config {
    /// Default location of the config file.
    pub fn default_path() -> PathBuf {
        ProjectDirs::from("", "", "remindr")
            .map(|dirs| dirs.config_dir().join("config.json"))
            .unwrap_or_else(|| PathBuf::from(".remindr/config.json"))
    }

    /// Loads the config at `path`, writing the defaults there on first use.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Config::default();
            config.save(path)?;
            info!("Wrote default configuration to {}", path.display());
            return Ok(config);
        }

        debug!("Loading configuration from {}", path.display());
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| RemindError::ConfigError {
            message: format!("{}: {}", path.display(), e),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|_| RemindError::DirectoryError {
                path: parent.to_path_buf(),
            })?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Applies a `key=value` setting.
    pub fn set(&mut self, setting: &str) -> Result<()> {
        let (key, value) = setting
            .split_once('=')
            .ok_or_else(|| RemindError::ConfigError {
                message: format!("expected key=value, got '{}'", setting),
            })?;
        let value = value.trim();
        let optional = |v: &str| (!v.is_empty()).then(|| v.to_string());

        match key.trim() {
            "data_dir" => self.data_dir = PathBuf::from(value),
            "notify_command" => self.notify_command = optional(value),
            "icon" => self.icon = optional(value),
            "reminder_title" => self.reminder_title = value.to_string(),
            "ready_timeout_ms" => self.ready_timeout_ms = parse_number(key, value)?,
            "watch_poll_secs" => self.watch_poll_secs = parse_number(key, value)?,
            other => {
                return Err(RemindError::ConfigError {
                    message: format!("unknown setting '{}'", other),
                })
            }
        }
        Ok(())
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.data_dir.join("tasks")
    }

    pub fn permission_path(&self) -> PathBuf {
        self.data_dir.join("permission.json")
    }

    /// Lock file held by the process that owns the reminder timers.
    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join("daemon.lock")
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn watch_poll_interval(&self) -> Duration {
        Duration::from_secs(self.watch_poll_secs.max(1))
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value.parse().map_err(|_| RemindError::ConfigError {
        message: format!("{} must be a number, got '{}'", key, value),
    })
}

// notify-send takes `--icon`, then summary and body; other platforms must configure one
fn default_notify_command() -> Option<String> {
    if cfg!(any(target_os = "macos", windows)) {
        None
    } else {
        Some("notify-send".to_string())
    }
}
