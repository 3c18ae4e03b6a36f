//! Startup reconciliation.
//!
//! Timers only live in memory, so every start replays arming for all tasks
//! that are still pending.
use log::{info, warn};

use crate::{ArmOutcome, ArmReason, PermissionGate, Result, Scheduler, Task, TaskRegistry, TaskStore};

/// Receives the task list whenever it should be (re)drawn.
pub trait TaskRenderer {
    fn render(&mut self, tasks: &[Task]);
}

/// Renderer that draws nothing.
impl TaskRenderer for () {
    fn render(&mut self, _tasks: &[Task]) {}
}

/// Summary of a reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Total number of tasks loaded from the store
    pub loaded: usize,
    /// Tasks whose timer was armed
    pub armed: usize,
    /// Unfired tasks whose due time passed while nothing was running
    pub missed: usize,
    pub already_fired: usize,
    /// Unfired tasks left unarmed because notifications are not permitted
    pub blocked: usize,
}

/// Loads every task, renders the sorted list and re-arms pending timers.
pub fn reconcile<S: TaskStore>(
    registry: &mut TaskRegistry<S>,
    scheduler: &mut Scheduler,
    gate: &PermissionGate,
    renderer: &mut dyn TaskRenderer,
) -> Result<ReconcileReport> {
    let tasks = registry.load()?;
    renderer.render(&tasks);

    let mut report = ReconcileReport {
        loaded: tasks.len(),
        ..Default::default()
    };

    let permitted = gate.is_granted();
    if !permitted && tasks.iter().any(|t| !t.fired) {
        warn!(
            "Notification permission is {}; pending reminders will not be scheduled",
            gate.state()
        );
    }

    for task in &tasks {
        if task.fired {
            report.already_fired += 1;
            continue;
        }

        if !permitted {
            report.blocked += 1;
            continue;
        }

        match scheduler.arm(task, ArmReason::Reloaded) {
            ArmOutcome::Armed { .. } => report.armed += 1,
            ArmOutcome::Missed => report.missed += 1,
            ArmOutcome::AlreadyFired => report.already_fired += 1,
        }
    }

    info!(
        "Reconciled {} tasks: {} armed, {} missed, {} fired, {} blocked",
        report.loaded, report.armed, report.missed, report.already_fired, report.blocked
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{now_millis, MemoryTaskStore, PermissionState, TaskId, DEFAULT_REMINDER_TITLE};

    struct Capture(Vec<Vec<TaskId>>);

    impl TaskRenderer for Capture {
        fn render(&mut self, tasks: &[Task]) {
            self.0.push(tasks.iter().map(|t| t.id).collect());
        }
    }

    fn seeded_store() -> MemoryTaskStore {
        let now = now_millis();
        let mut store = MemoryTaskStore::new();
        for (id, offset, fired) in [
            (1, 3_600_000, false),
            (2, -3_600_000, false),
            (3, -7_200_000, true),
            (4, 60_000, false),
        ] {
            store
                .put(&Task {
                    id: TaskId(id),
                    title: format!("t{}", id),
                    due_at: now + offset,
                    fired,
                    created_at: now - 10_000_000,
                })
                .unwrap();
        }
        store
    }

    #[tokio::test(start_paused = true)]
    async fn rearms_only_future_unfired_tasks() {
        let mut registry = TaskRegistry::new(seeded_store());
        let (mut scheduler, _rx) = Scheduler::new(DEFAULT_REMINDER_TITLE);
        let gate = PermissionGate::in_memory(PermissionState::Granted);
        let mut renderer = Capture(Vec::new());

        let report = reconcile(&mut registry, &mut scheduler, &gate, &mut renderer).unwrap();

        assert_eq!(
            report,
            ReconcileReport {
                loaded: 4,
                armed: 2,
                missed: 1,
                already_fired: 1,
                blocked: 0,
            }
        );
        assert!(scheduler.is_armed(TaskId(1)));
        assert!(scheduler.is_armed(TaskId(4)));
        assert!(!scheduler.is_armed(TaskId(2)));
        assert_eq!(
            renderer.0,
            vec![vec![TaskId(3), TaskId(2), TaskId(4), TaskId(1)]]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn running_twice_keeps_one_timer_per_task() {
        let mut registry = TaskRegistry::new(seeded_store());
        let (mut scheduler, _rx) = Scheduler::new(DEFAULT_REMINDER_TITLE);
        let gate = PermissionGate::in_memory(PermissionState::Granted);

        reconcile(&mut registry, &mut scheduler, &gate, &mut ()).unwrap();
        reconcile(&mut registry, &mut scheduler, &gate, &mut ()).unwrap();

        assert_eq!(scheduler.armed_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_armed_without_permission() {
        let mut registry = TaskRegistry::new(seeded_store());
        let (mut scheduler, _rx) = Scheduler::new(DEFAULT_REMINDER_TITLE);
        let gate = PermissionGate::in_memory(PermissionState::Denied);

        let report = reconcile(&mut registry, &mut scheduler, &gate, &mut ()).unwrap();

        assert_eq!(report.blocked, 3);
        assert_eq!(scheduler.armed_count(), 0);
    }
}
