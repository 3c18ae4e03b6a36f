//! Reminder timers: one tokio task per unfired task, each reporting back
//! through a shared channel when it elapses.
use std::collections::HashMap;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};

use crate::{now_millis, DeliveryChannel, DeliveryOutcome, Result, Task, TaskId, TaskRegistry, TaskStore};

/// Default title of every reminder notification.
pub const DEFAULT_REMINDER_TITLE: &str = "Task Reminder";

/// Event emitted by an elapsed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerEvent {
    Due { id: TaskId, generation: u64 },
}

/// Why a task is being armed; decides what happens to past-due tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmReason {
    /// Fresh user action: a past-due task fires promptly
    Created,
    /// Replay after a restart or external change: a past-due task is skipped
    Reloaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    Armed { delay: Duration },
    AlreadyFired,
    /// Due time passed before the task could be re-armed
    Missed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    Fired(DeliveryOutcome),
    /// Task was deleted or had already fired
    Skipped,
}

struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Owns at most one pending timer per unfired task.
///
/// Each timer sleeps until its task is due and then sends a
/// [`SchedulerEvent::Due`] carrying the generation it was armed with. Only
/// the event matching the currently armed generation can be claimed, so a
/// timer that elapsed just before being disarmed or re-armed never fires.
pub struct Scheduler {
    timers: HashMap<TaskId, ArmedTimer>,
    next_generation: u64,
    events_tx: mpsc::Sender<SchedulerEvent>,
    reminder_title: String,
}

impl Scheduler {
    /// Creates a scheduler and the receiving end of its timer events.
    pub fn new(reminder_title: impl Into<String>) -> (Self, mpsc::Receiver<SchedulerEvent>) {
        let (events_tx, events_rx) = mpsc::channel(64);

        let scheduler = Self {
            timers: HashMap::new(),
            next_generation: 0,
            events_tx,
            reminder_title: reminder_title.into(),
        };
        (scheduler, events_rx)
    }

    /// Arms the timer for `task`, replacing any existing one.
    pub fn arm(&mut self, task: &Task, reason: ArmReason) -> ArmOutcome {
        self.disarm(task.id);

        if task.fired {
            debug!("Task {} already fired, not arming", task.id);
            return ArmOutcome::AlreadyFired;
        }

        let delay_ms = task.millis_until_due(now_millis());
        let delay = if delay_ms > 0 {
            Duration::from_millis(delay_ms as u64)
        } else {
            match reason {
                ArmReason::Created => Duration::ZERO,
                ArmReason::Reloaded => {
                    info!(
                        "Task {} was due {}s ago, leaving it for manual dismissal",
                        task.id,
                        delay_ms.unsigned_abs() / 1000
                    );
                    return ArmOutcome::Missed;
                }
            }
        };

        self.next_generation += 1;
        let generation = self.next_generation;
        let id = task.id;
        let events_tx = self.events_tx.clone();

        let handle = tokio::spawn(async move {
            time::sleep(delay).await;
            if let Err(e) = events_tx.send(SchedulerEvent::Due { id, generation }).await {
                error!("Failed to deliver timer event for task {}: {}", id, e);
            }
        });

        self.timers.insert(id, ArmedTimer { generation, handle });
        info!(
            "Reminder for task {} scheduled in {}s",
            task.id,
            delay.as_secs()
        );
        ArmOutcome::Armed { delay }
    }

    /// Cancels the timer for `id`. Returns whether one was armed.
    pub fn disarm(&mut self, id: TaskId) -> bool {
        match self.timers.remove(&id) {
            Some(timer) => {
                timer.handle.abort();
                debug!("Disarmed timer for task {}", id);
                true
            }
            None => false,
        }
    }

    /// Cancels every timer.
    pub fn disarm_all(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
    }

    pub fn is_armed(&self, id: TaskId) -> bool {
        self.timers.contains_key(&id)
    }

    pub fn armed_count(&self) -> usize {
        self.timers.len()
    }

    /// Accepts a timer event if it belongs to the currently armed timer,
    /// consuming the mapping.
    pub fn claim(&mut self, event: SchedulerEvent) -> Option<TaskId> {
        let SchedulerEvent::Due { id, generation } = event;

        match self.timers.get(&id) {
            Some(timer) if timer.generation == generation => {
                self.timers.remove(&id);
                Some(id)
            }
            _ => {
                debug!(
                    "Dropping stale timer event for task {} (generation {})",
                    id, generation
                );
                None
            }
        }
    }

    /// Delivers the reminder for `id` and records that it fired.
    ///
    /// The fired flag is persisted whatever the delivery outcome; a failed
    /// delivery is logged and never retried.
    pub async fn fire<S: TaskStore>(
        &mut self,
        id: TaskId,
        registry: &mut TaskRegistry<S>,
        channel: &DeliveryChannel,
    ) -> Result<FireOutcome> {
        self.disarm(id);

        let task = match registry.get(id) {
            Some(task) if !task.fired => task.clone(),
            Some(_) => {
                debug!("Task {} already fired, skipping", id);
                return Ok(FireOutcome::Skipped);
            }
            None => {
                debug!("Task {} no longer exists, skipping", id);
                return Ok(FireOutcome::Skipped);
            }
        };

        if !Self::still_stored(id, registry)? {
            return Ok(FireOutcome::Skipped);
        }

        let body = format!("{} is due now!", task.title);
        let outcome = channel.deliver(&self.reminder_title, &body, id).await;
        if !outcome.is_delivered() {
            warn!("Reminder for task {} was not shown", id);
        }

        // The record may have been deleted while the notification was up.
        if !Self::still_stored(id, registry)? {
            return Ok(FireOutcome::Skipped);
        }

        registry.mark_fired(id)?;
        Ok(FireOutcome::Fired(outcome))
    }

    /// Checks the store for `id`, forgetting it if another process removed it.
    fn still_stored<S: TaskStore>(id: TaskId, registry: &mut TaskRegistry<S>) -> Result<bool> {
        if registry.read_through(id)?.is_some() {
            return Ok(true);
        }

        debug!("Task {} was deleted from the store, skipping", id);
        registry.forget(id);
        Ok(false)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.disarm_all();
    }
}
