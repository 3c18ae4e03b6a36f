//! The reminder service: owns the registry, the scheduler and the delivery
//! channel, and processes timer and store events one at a time.
use std::{future::Future, sync::Arc};

use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::{
    reconcile, ArmOutcome, ArmReason, DeliveryChannel, FireOutcome, PermissionGate,
    ReconcileReport, RemindError, Result, Scheduler, SchedulerEvent, StoreChange, Task,
    TaskId, TaskRegistry, TaskRenderer, TaskStore,
};

/// Everything the service reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceEvent {
    Due(SchedulerEvent),
    Store(StoreChange),
}

/// Result of adding a task: the task is always saved, scheduling may not be.
#[derive(Debug)]
pub struct AddedTask {
    pub task: Task,
    pub scheduling: Result<ArmOutcome>,
}

pub struct ReminderService<S: TaskStore> {
    registry: TaskRegistry<S>,
    scheduler: Scheduler,
    timer_rx: mpsc::Receiver<SchedulerEvent>,
    changes_rx: Option<mpsc::Receiver<StoreChange>>,
    channel: DeliveryChannel,
    gate: Arc<PermissionGate>,
    renderer: Box<dyn TaskRenderer>,
}

impl<S: TaskStore> ReminderService<S> {
    pub fn new(
        store: S,
        channel: DeliveryChannel,
        gate: Arc<PermissionGate>,
        reminder_title: &str,
    ) -> Self {
        let (scheduler, timer_rx) = Scheduler::new(reminder_title);

        Self {
            registry: TaskRegistry::new(store),
            scheduler,
            timer_rx,
            changes_rx: None,
            channel,
            gate,
            renderer: Box::new(()),
        }
    }

    /// Feeds changes made by other processes into the event loop.
    pub fn with_store_changes(mut self, changes_rx: mpsc::Receiver<StoreChange>) -> Self {
        self.changes_rx = Some(changes_rx);
        self
    }

    pub fn with_renderer(mut self, renderer: Box<dyn TaskRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Boots the working set from the store and re-arms pending timers.
    pub fn start(&mut self) -> Result<ReconcileReport> {
        reconcile(
            &mut self.registry,
            &mut self.scheduler,
            &self.gate,
            self.renderer.as_mut(),
        )
    }

    /// Loads the working set without arming anything, for one-shot commands.
    pub fn load_tasks(&mut self) -> Result<Vec<Task>> {
        self.registry.load()
    }

    /// Saves a new task and arms its reminder if notifications are permitted.
    ///
    /// `prompt` is asked only when the user has not answered the permission
    /// question yet. A denial does not undo the save.
    pub fn add_task<F>(&mut self, title: &str, due_at: i64, prompt: F) -> Result<AddedTask>
    where
        F: FnOnce() -> Result<bool>,
    {
        let task = self.registry.create(title, due_at)?;
        info!("Created task {} '{}'", task.id, task.title);
        self.render();

        let scheduling = self
            .gate
            .ensure_granted(prompt)
            .map(|()| self.scheduler.arm(&task, ArmReason::Created));

        if let Err(e) = &scheduling {
            warn!("Task {} saved without a reminder: {}", task.id, e);
        }

        Ok(AddedTask { task, scheduling })
    }

    /// Deletes a task and cancels its pending reminder.
    pub fn delete_task(&mut self, id: TaskId) -> Result<Task> {
        let task = self.registry.remove(id)?;
        self.scheduler.disarm(id);
        self.render();
        Ok(task)
    }

    /// Marks a task as fired without delivering anything.
    pub fn dismiss_task(&mut self, id: TaskId) -> Result<Task> {
        let task = self.registry.mark_fired(id)?;
        self.scheduler.disarm(id);
        self.render();
        Ok(task)
    }

    /// Waits for the next event. Returns `None` once no source can produce more.
    pub async fn next_event(&mut self) -> Option<ServiceEvent> {
        tokio::select! {
            Some(event) = self.timer_rx.recv() => Some(ServiceEvent::Due(event)),
            Some(change) = recv_change(&mut self.changes_rx) => Some(ServiceEvent::Store(change)),
            else => None,
        }
    }

    pub async fn handle(&mut self, event: ServiceEvent) -> Result<()> {
        match event {
            ServiceEvent::Due(event) => {
                let Some(id) = self.scheduler.claim(event) else {
                    return Ok(());
                };

                match self
                    .scheduler
                    .fire(id, &mut self.registry, &self.channel)
                    .await?
                {
                    FireOutcome::Fired(outcome) => {
                        debug!("Task {} fired: {:?}", id, outcome);
                        self.render();
                    }
                    FireOutcome::Skipped => debug!("Timer for task {} had nothing to fire", id),
                }
            }
            ServiceEvent::Store(StoreChange::Changed(id)) => self.sync_task(id)?,
            ServiceEvent::Store(StoreChange::Removed(id)) => self.forget_task(id),
        }

        Ok(())
    }

    /// Waits for and handles a single event.
    ///
    /// Returns `false` when there are no more events to wait for.
    pub async fn process_next(&mut self) -> Result<bool> {
        match self.next_event().await {
            Some(event) => {
                self.handle(event).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Runs the event loop until `shutdown` resolves.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.run_while(shutdown, |_| true).await
    }

    /// Runs the event loop until task `id` has fired or disappeared, or
    /// until `shutdown` resolves.
    ///
    /// Returns whether the task settled.
    pub async fn run_until_settled<F>(&mut self, id: TaskId, shutdown: F) -> Result<bool>
    where
        F: Future<Output = ()>,
    {
        if !self.is_settled(id) {
            self.run_while(shutdown, |service| !service.is_settled(id))
                .await?;
        }
        Ok(self.is_settled(id))
    }

    /// True once `id` has fired or is no longer known.
    pub fn is_settled(&self, id: TaskId) -> bool {
        !self.registry.get(id).is_some_and(|task| !task.fired)
    }

    async fn run_while<F, P>(&mut self, shutdown: F, keep_running: P) -> Result<()>
    where
        F: Future<Output = ()>,
        P: Fn(&Self) -> bool,
    {
        tokio::pin!(shutdown);
        info!(
            "Reminder service running with {} pending timers",
            self.scheduler.armed_count()
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Reminder service stopping...");
                    break;
                }
                event = self.next_event() => match event {
                    Some(event) => {
                        // A failed event never stops the loop.
                        if let Err(e) = self.handle(event).await {
                            error!("Failed to handle {:?}: {}", event, e);
                        }
                        if !keep_running(self) {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        self.scheduler.disarm_all();
        Ok(())
    }

    /// Mirrors a task record another process wrote.
    fn sync_task(&mut self, id: TaskId) -> Result<()> {
        let task = match self.registry.read_through(id) {
            Ok(Some(task)) => task,
            Ok(None) => {
                self.forget_task(id);
                return Ok(());
            }
            Err(e) => {
                warn!("Could not read changed task {}: {}", id, e);
                return Ok(());
            }
        };

        let is_new = self.registry.get(id).is_none();
        let Some(task) = self.registry.absorb(task) else {
            return Ok(());
        };
        debug!("Picked up external change to task {}", id);
        self.render();

        if task.fired {
            self.scheduler.disarm(id);
            return Ok(());
        }

        self.gate.refresh();
        if !self.gate.is_granted() {
            warn!("Task {} not scheduled: {}", id, RemindError::PermissionDenied);
            return Ok(());
        }

        let reason = if is_new {
            ArmReason::Created
        } else {
            ArmReason::Reloaded
        };
        self.scheduler.arm(&task, reason);
        Ok(())
    }

    fn forget_task(&mut self, id: TaskId) {
        if self.registry.forget(id).is_some() {
            debug!("Task {} removed by another process", id);
            self.render();
        }
        self.scheduler.disarm(id);
    }

    fn render(&mut self) {
        let tasks = self.registry.all();
        self.renderer.render(&tasks);
    }

    pub fn registry(&self) -> &TaskRegistry<S> {
        &self.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn gate(&self) -> &PermissionGate {
        &self.gate
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.registry.all()
    }
}

async fn recv_change(rx: &mut Option<mpsc::Receiver<StoreChange>>) -> Option<StoreChange> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
