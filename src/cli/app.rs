//! CLI module for the remindr application
//!
//! This module wires the command-line interface to the reminder service.
use std::{
    io::{stdin, stdout, Write},
    path::PathBuf,
    sync::Arc,
};

use chrono::Local;
use log::{info, warn};

use crate::{
    format_relative, local_due_millis, now_millis, watch_tasks_dir, ArmOutcome, Commands,
    CommandSurface, Config, DaemonLock, DeliveryChannel, FileTaskStore, PermissionGate,
    PermissionState, RemindError, ReminderService, Result, Task, TaskId, TaskRenderer,
    TerminalSurface,
};

/// CLI Application handler - processes CLI commands and interfaces with the reminder service
pub struct App {
    /// Application configuration
    config: Config,

    /// Where the configuration was loaded from
    config_path: PathBuf,

    /// Whether to display verbose output
    verbose: bool,
}

impl App {
    pub fn new(config: Config, config_path: PathBuf, verbose: bool) -> Self {
        Self {
            config,
            config_path,
            verbose,
        }
    }

    /// Run the CLI application with the given command
    pub async fn run(&mut self, command: Commands) -> Result<()> {
        match command {
            Commands::Add {
                title,
                date,
                time,
                yes,
                wait,
            } => self.handle_add(title, date, time, yes, wait).await?,

            Commands::List { json, pending } => self.handle_list(json, pending)?,

            Commands::Delete { id, force } => self.handle_delete(id, force)?,

            Commands::Dismiss { id } => self.handle_dismiss(id)?,

            Commands::Run => self.handle_run().await?,

            Commands::Permission { action } => self.handle_permission(&action)?,

            Commands::Config { show, set, reset } => self.handle_config(show, set, reset)?,
        }

        Ok(())
    }

    fn gate(&self) -> Arc<PermissionGate> {
        Arc::new(PermissionGate::load(self.config.permission_path()))
    }

    /// Builds the service over the on-disk store with the configured surfaces.
    fn service(&self, gate: Arc<PermissionGate>) -> Result<ReminderService<FileTaskStore>> {
        let store = FileTaskStore::open(self.config.tasks_dir())?;

        let mut channel = DeliveryChannel::new(Arc::clone(&gate))
            .with_foreground(Box::new(TerminalSurface))
            .with_icon(self.config.icon.clone())
            .with_ready_timeout(self.config.ready_timeout());

        if let Some(command) = &self.config.notify_command {
            match CommandSurface::parse(command) {
                Ok(surface) => channel = channel.with_background(Box::new(surface)),
                Err(e) => warn!("Ignoring notify command: {}", e),
            }
        }

        Ok(ReminderService::new(
            store,
            channel,
            gate,
            &self.config.reminder_title,
        ))
    }

    async fn handle_add(
        &self,
        title: String,
        date: Option<String>,
        time: String,
        yes: bool,
        wait: bool,
    ) -> Result<()> {
        let date = date.unwrap_or_else(|| Local::now().format("%Y-%m-%d").to_string());
        let due_at = local_due_millis(&date, &time)?;

        let mut service = self.service(self.gate())?;

        // Only one process may own the timers; defer to a running daemon.
        let lock = if wait {
            let lock = DaemonLock::try_acquire(self.config.lock_path())?;
            if lock.is_none() {
                println!("`remindr run` is active and will deliver this reminder.");
            }
            lock
        } else {
            None
        };

        if lock.is_some() {
            // Boot first so the replay cannot treat the new task as missed.
            service.start()?;
        }

        let added = service.add_task(&title, due_at, || {
            if yes {
                Ok(true)
            } else {
                confirm("Allow remindr to show notifications for your tasks?")
            }
        })?;

        println!(
            "Task created with ID: {} (due {}, {})",
            added.task.id,
            added.task.due_local(),
            format_relative(added.task.due_at, now_millis())
        );

        match added.scheduling {
            Ok(ArmOutcome::Armed { .. }) if lock.is_some() => {
                println!("Waiting for the reminder... (Ctrl-C to stop)");
                if self.serve(service, Some(added.task.id)).await? {
                    println!("Reminder for task {} done.", added.task.id);
                }
            }
            Ok(_) => {
                if self.verbose && !wait {
                    println!("The reminder fires while `remindr run` is active.");
                }
            }
            Err(RemindError::PermissionDenied) => {
                println!(
                    "{}",
                    console::style(
                        "Notifications are disabled; no reminder will be shown. \
                         Run `remindr permission grant` to enable them."
                    )
                    .yellow()
                );
            }
            Err(e) => return Err(e),
        }

        Ok(())
    }

    fn handle_list(&self, json: bool, pending: bool) -> Result<()> {
        let mut service = self.service(self.gate())?;
        let mut tasks = service.load_tasks()?;
        if pending {
            tasks.retain(|t| !t.fired);
        }

        if json {
            println!("{}", serde_json::to_string_pretty(&tasks)?);
        } else {
            ListRenderer.render(&tasks);
        }
        Ok(())
    }

    fn handle_delete(&self, id: TaskId, force: bool) -> Result<()> {
        let mut service = self.service(self.gate())?;
        service.load_tasks()?;

        let task = service
            .registry()
            .get(id)
            .cloned()
            .ok_or(RemindError::TaskNotFound { id })?;

        if !force {
            println!("You are about to delete the following task:");
            println!("ID:     {}", task.id);
            println!("Title:  {}", task.title);
            println!("Due:    {}", task.due_local());

            if !confirm("Are you sure you want to delete this task?")? {
                println!("Deletion cancelled.");
                return Ok(());
            }
        }

        service.delete_task(id)?;
        println!("Task '{}' ({}) has been deleted.", task.title, task.id);
        Ok(())
    }

    fn handle_dismiss(&self, id: TaskId) -> Result<()> {
        let mut service = self.service(self.gate())?;
        service.load_tasks()?;

        let task = service.dismiss_task(id)?;
        println!("Task '{}' ({}) dismissed.", task.title, task.id);
        Ok(())
    }

    async fn handle_run(&self) -> Result<()> {
        let _lock = DaemonLock::acquire(self.config.lock_path())?;
        let mut service = self
            .service(self.gate())?
            .with_renderer(Box::new(ListRenderer));

        let report = service.start()?;
        println!(
            "{} pending reminder{} armed, {} missed",
            report.armed,
            if report.armed == 1 { "" } else { "s" },
            report.missed
        );
        if report.blocked > 0 {
            println!(
                "{}",
                console::style(format!(
                    "{} reminders are not scheduled because notifications are not permitted.",
                    report.blocked
                ))
                .yellow()
            );
        }

        self.serve(service, None).await?;
        Ok(())
    }

    /// Watches the task directory and runs the service until Ctrl-C, or
    /// until task `until` settles when one is given.
    ///
    /// Returns whether the service stopped because `until` settled.
    async fn serve(
        &self,
        service: ReminderService<FileTaskStore>,
        until: Option<TaskId>,
    ) -> Result<bool> {
        let (_watcher, changes) =
            watch_tasks_dir(&self.config.tasks_dir(), self.config.watch_poll_interval())?;
        let mut service = service.with_store_changes(changes);

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        let settled = match until {
            Some(id) => service.run_until_settled(id, shutdown).await?,
            None => {
                service.run(shutdown).await?;
                false
            }
        };

        info!("Reminder service stopped");
        Ok(settled)
    }

    fn handle_permission(&self, action: &str) -> Result<()> {
        let gate = self.gate();
        match action {
            "grant" => gate.set(PermissionState::Granted)?,
            "deny" => gate.set(PermissionState::Denied)?,
            "reset" => gate.set(PermissionState::Default)?,
            _ => {}
        }

        println!("Notification permission: {}", gate.state());
        Ok(())
    }

    fn handle_config(&mut self, show: bool, set: Option<String>, reset: bool) -> Result<()> {
        let show = show || (!reset && set.is_none());

        // Edit what is on disk; runtime overrides such as --data-dir stay out of the file.
        let mut stored = Config::load_or_default(&self.config_path)?;

        if reset {
            stored = Config::default();
            stored.save(&self.config_path)?;
            println!("Configuration reset to defaults.");
        }

        if let Some(setting) = set {
            stored.set(&setting)?;
            stored.save(&self.config_path)?;
            println!("Configuration updated.");
        }

        if show {
            println!("# {}", self.config_path.display());
            println!("{}", serde_json::to_string_pretty(&stored)?);
            if stored.data_dir != self.config.data_dir {
                println!(
                    "# data_dir overridden for this run: {}",
                    self.config.data_dir.display()
                );
            }
        }

        Ok(())
    }
}

/// Prints the task list as a table.
pub struct ListRenderer;

impl TaskRenderer for ListRenderer {
    fn render(&mut self, tasks: &[Task]) {
        if tasks.is_empty() {
            println!("No tasks.");
            return;
        }

        let term_width = terminal_size::terminal_size()
            .map(|(w, _)| w.0 as usize)
            .unwrap_or(80);
        let now = now_millis();

        println!("{}", "-".repeat(term_width.min(60)));
        for task in tasks {
            let status = if task.fired {
                console::style("fired").dim()
            } else if task.is_missed(now) {
                console::style("missed").red()
            } else {
                console::style("pending").green()
            };

            println!(
                "{:>4}  {}  {:<8} {} ({})",
                task.id,
                task.due_local(),
                status,
                console::style(&task.title).bold(),
                format_relative(task.due_at, now)
            );
        }
        println!("{}", "-".repeat(term_width.min(60)));
    }
}

/// Asks a yes/no question on the terminal; anything but y/yes is a no.
fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N]: ", question);
    stdout().flush().map_err(RemindError::Io)?;

    let mut input = String::new();
    stdin().read_line(&mut input).map_err(RemindError::Io)?;

    let input = input.trim().to_lowercase();
    Ok(input == "y" || input == "yes")
}
