//! Shared types for the remindr application.
//!
//! This module holds the crate-wide `Result` alias and the CLI subcommands.
use clap::Subcommand;

use crate::{RemindError, TaskId};

/// A specialized Result type for remindr operations.
pub type Result<T> = std::result::Result<T, RemindError>;

/// Available subcommands for the remindr application
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new reminder task
    Add {
        /// Title of the task
        title: String,

        /// Due date as YYYY-MM-DD (defaults to today)
        #[clap(short, long)]
        date: Option<String>,

        /// Due time as HH:MM, local time
        #[clap(short, long)]
        time: String,

        /// Grant notification permission without prompting
        #[clap(short, long)]
        yes: bool,

        /// Stay in the foreground until the reminder fires (unless `run` is active)
        #[clap(short, long)]
        wait: bool,
    },

    /// List tasks ordered by due time
    List {
        /// Format output as JSON
        #[clap(short, long)]
        json: bool,

        /// Only show tasks that have not fired yet
        #[clap(short, long)]
        pending: bool,
    },

    /// Delete a task and cancel its reminder
    Delete {
        /// ID of the task to delete
        id: TaskId,

        /// Skip confirmation prompt
        #[clap(short, long)]
        force: bool,
    },

    /// Mark a task as done without showing its reminder
    Dismiss {
        /// ID of the task to dismiss
        id: TaskId,
    },

    /// Run the reminder daemon until interrupted
    Run,

    /// Show or change the notification permission
    Permission {
        /// What to do with the permission
        #[clap(value_parser = ["grant", "deny", "reset", "status"], default_value = "status")]
        action: String,
    },

    /// Configuration management
    Config {
        /// Show current configuration
        #[clap(short = 'S', long)]
        show: bool,

        /// Update a configuration setting (key=value)
        #[clap(short, long)]
        set: Option<String>,

        /// Reset configuration to defaults
        #[clap(short, long)]
        reset: bool,
    },
}
