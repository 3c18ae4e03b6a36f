//! Delivery channel: surfaces a reminder through whichever notification
//! surface is available at fire time.
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Serialize;
use shell_words::split;
use tokio::process::Command;
use which::which;

use crate::{PermissionGate, RemindError, Result, TaskId};

/// Payload handed to a notification surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    /// Collapses repeated notifications for the same task
    pub tag: String,
    pub data: NotificationData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    pub task_id: TaskId,
}

/// Something that can show a notification to the user.
#[async_trait]
pub trait NotificationSurface: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Whether the surface can take a notification right now.
    async fn ready(&self) -> bool;

    async fn show(&self, notification: &Notification) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Handed off to the background-capable surface
    Background,
    /// Shown directly in the foreground
    Foreground,
    Failed(String),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        !matches!(self, DeliveryOutcome::Failed(_))
    }
}

/// Fallback chain: background surface, then foreground if permitted.
pub struct DeliveryChannel {
    background: Option<Box<dyn NotificationSurface>>,
    foreground: Option<Box<dyn NotificationSurface>>,
    gate: Arc<PermissionGate>,
    icon: Option<String>,
    ready_timeout: Duration,
}

impl DeliveryChannel {
    pub fn new(gate: Arc<PermissionGate>) -> Self {
        Self {
            background: None,
            foreground: None,
            gate,
            icon: None,
            ready_timeout: Duration::from_millis(1500),
        }
    }

    pub fn with_background(mut self, surface: Box<dyn NotificationSurface>) -> Self {
        self.background = Some(surface);
        self
    }

    pub fn with_foreground(mut self, surface: Box<dyn NotificationSurface>) -> Self {
        self.foreground = Some(surface);
        self
    }

    pub fn with_icon(mut self, icon: Option<String>) -> Self {
        self.icon = icon;
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Attempts delivery. Never fails past this boundary; failures are
    /// logged and reported through [`DeliveryOutcome::Failed`].
    pub async fn deliver(&self, title: &str, body: &str, task_id: TaskId) -> DeliveryOutcome {
        let notification = Notification {
            title: title.to_string(),
            body: body.to_string(),
            icon: self.icon.clone(),
            tag: format!("task-{}", task_id),
            data: NotificationData { task_id },
        };

        let mut reasons = Vec::new();

        if let Some(surface) = &self.background {
            let ready = tokio::time::timeout(self.ready_timeout, surface.ready())
                .await
                .unwrap_or(false);

            if ready {
                match surface.show(&notification).await {
                    Ok(()) => {
                        info!("Reminder for task {} handed to {}", task_id, surface.name());
                        return DeliveryOutcome::Background;
                    }
                    Err(e) => {
                        warn!("Background surface {} failed: {}", surface.name(), e);
                        reasons.push(format!("{}: {}", surface.name(), e));
                    }
                }
            } else {
                debug!("Background surface {} is not ready", surface.name());
                reasons.push(format!("{}: not ready", surface.name()));
            }
        }

        match &self.foreground {
            Some(surface) if self.gate.is_granted() => match surface.show(&notification).await {
                Ok(()) => {
                    info!("Reminder for task {} shown on {}", task_id, surface.name());
                    return DeliveryOutcome::Foreground;
                }
                Err(e) => {
                    warn!("Foreground surface {} failed: {}", surface.name(), e);
                    reasons.push(format!("{}: {}", surface.name(), e));
                }
            },
            Some(surface) => reasons.push(format!("{}: permission not granted", surface.name())),
            None => {}
        }

        if reasons.is_empty() {
            reasons.push("no notification surface configured".to_string());
        }

        let reason = reasons.join("; ");
        warn!("Delivery failed for task {}: {}", task_id, reason);
        DeliveryOutcome::Failed(reason)
    }
}

/// Background surface that runs an external notifier program,
/// e.g. `notify-send` or `terminal-notifier`.
pub struct CommandSurface {
    program: String,
    args: Vec<String>,
}

impl CommandSurface {
    /// Parses a shell-like command line such as `notify-send -u critical`.
    pub fn parse(command: &str) -> Result<Self> {
        let mut words = split(command).map_err(|e| RemindError::ConfigError {
            message: format!("Failed to parse notify command: {}", e),
        })?;

        if words.is_empty() {
            return Err(RemindError::ConfigError {
                message: "Empty notify command".to_string(),
            });
        }

        let program = words.remove(0);
        Ok(Self {
            program,
            args: words,
        })
    }
}

#[async_trait]
impl NotificationSurface for CommandSurface {
    fn name(&self) -> &str {
        &self.program
    }

    async fn ready(&self) -> bool {
        which(&self.program).is_ok()
    }

    async fn show(&self, notification: &Notification) -> Result<()> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(icon) = &notification.icon {
            command.arg("--icon").arg(icon);
        }
        command.arg(&notification.title).arg(&notification.body);

        let status = command.status().await?;
        if status.success() {
            Ok(())
        } else {
            Err(RemindError::DeliveryFailed {
                message: format!("{} exited with {}", self.program, status),
            })
        }
    }
}

/// Foreground surface: a styled line and a bell on the controlling terminal.
#[derive(Debug, Default)]
pub struct TerminalSurface;

#[async_trait]
impl NotificationSurface for TerminalSurface {
    fn name(&self) -> &str {
        "terminal"
    }

    async fn ready(&self) -> bool {
        true
    }

    async fn show(&self, notification: &Notification) -> Result<()> {
        println!(
            "\x07{} {}",
            console::style(&notification.title).bold().yellow(),
            notification.body
        );
        Ok(())
    }
}
