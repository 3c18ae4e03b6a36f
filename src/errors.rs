//! Error types for the remindr application.
//!
//! This module defines the error taxonomy shared by the task store, the
//! registry, the scheduler and the delivery channel.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::TaskId;

/// The main error type for the remindr application.
#[derive(Error, Debug)]
pub enum RemindError {
    /// Errors related to file I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The durable task store could not be read or written.
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Task was not found when performing an operation.
    #[error("Task not found: {id}")]
    TaskNotFound { id: TaskId },

    /// Invalid task input or record shape.
    #[error("Invalid task: {message}")]
    InvalidTask { message: String },

    /// The user declined notification permission.
    #[error("Notification permission denied")]
    PermissionDenied,

    /// Neither background nor foreground delivery succeeded.
    #[error("Delivery failed: {message}")]
    DeliveryFailed { message: String },

    /// Errors related to configuration.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Directory creation or access failed.
    #[error("Failed to create or access directory: {path}")]
    DirectoryError { path: PathBuf },

    /// Another resident process already owns the data directory.
    #[error("Another remindr process is already running (lock held at {path})")]
    AlreadyRunning { path: PathBuf },

    /// The file system watcher could not be started.
    #[error("Watcher error: {message}")]
    WatcherError { message: String },

    /// Generic application error with a custom message.
    #[error("{message}")]
    ApplicationError { message: String },
}

impl RemindError {
    /// Wraps any displayable failure as a storage error.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        RemindError::Storage {
            message: err.to_string(),
        }
    }
}
