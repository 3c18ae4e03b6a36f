//! Notification permission gate.
//!
//! All scheduling decisions and foreground deliveries consult this gate,
//! so the permission state lives in exactly one place.
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{RemindError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    /// The user has not answered yet
    #[default]
    Default,
    Granted,
    Denied,
}

impl std::fmt::Display for PermissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PermissionState::Default => "default",
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct PermissionGate {
    state: Mutex<PermissionState>,
    path: Option<PathBuf>,
}

impl PermissionGate {
    /// Loads the persisted state from `path`, defaulting when absent or unreadable.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Ignoring unreadable permission file {}: {}", path.display(), e);
                PermissionState::Default
            }),
            Err(_) => PermissionState::Default,
        };

        debug!("Notification permission is {}", state);
        Self {
            state: Mutex::new(state),
            path: Some(path),
        }
    }

    /// A gate that is never persisted.
    pub fn in_memory(state: PermissionState) -> Self {
        Self {
            state: Mutex::new(state),
            path: None,
        }
    }

    /// Re-reads the persisted state, picking up answers given by another process.
    pub fn refresh(&self) {
        let Some(path) = &self.path else {
            return;
        };

        let Ok(raw) = fs::read_to_string(path) else {
            return;
        };

        match serde_json::from_str::<PermissionState>(&raw) {
            Ok(state) => {
                if let Ok(mut current) = self.state.lock() {
                    if *current != state {
                        info!("Notification permission changed to {}", state);
                        *current = state;
                    }
                }
            }
            Err(e) => warn!("Ignoring unreadable permission file {}: {}", path.display(), e),
        }
    }

    pub fn state(&self) -> PermissionState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(PermissionState::Default)
    }

    pub fn is_granted(&self) -> bool {
        self.state() == PermissionState::Granted
    }

    /// Records a new state and persists it.
    pub fn set(&self, state: PermissionState) -> Result<()> {
        if let Some(path) = &self.path {
            persist(path, state)?;
        }

        let mut current = self
            .state
            .lock()
            .map_err(|e| RemindError::ApplicationError {
                message: format!("permission state lock poisoned: {}", e),
            })?;
        *current = state;

        info!("Notification permission set to {}", state);
        Ok(())
    }

    /// Single guarded entry point for scheduling decisions.
    ///
    /// When the user has not answered yet, `prompt` is asked once and the
    /// answer is persisted.
    pub fn ensure_granted<F>(&self, prompt: F) -> Result<()>
    where
        F: FnOnce() -> Result<bool>,
    {
        match self.state() {
            PermissionState::Granted => Ok(()),
            PermissionState::Denied => Err(RemindError::PermissionDenied),
            PermissionState::Default => {
                let granted = prompt()?;
                self.set(if granted {
                    PermissionState::Granted
                } else {
                    PermissionState::Denied
                })?;

                if granted {
                    Ok(())
                } else {
                    Err(RemindError::PermissionDenied)
                }
            }
        }
    }
}

fn persist(path: &Path, state: PermissionState) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|_| RemindError::DirectoryError {
            path: parent.to_path_buf(),
        })?;
    }
    fs::write(path, serde_json::to_string(&state)?)?;
    Ok(())
}
