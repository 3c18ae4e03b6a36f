mod support;

use std::{
    fs,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use remindr::{
    now_millis, watch_tasks_dir, DeliveryChannel, FileTaskStore, Notification,
    NotificationSurface, PermissionGate, PermissionState, ReminderService, Result, StoreChange,
    TaskRegistry, TaskStore, DEFAULT_REMINDER_TITLE,
};
use support::{deliveries, service_with};
use tempfile::tempdir;
use tokio::{sync::mpsc, time::timeout};

#[tokio::test(start_paused = true)]
async fn restart_rearms_exactly_one_timer_per_pending_task() {
    let dir = tempdir().unwrap();

    let id = {
        let store = FileTaskStore::open(dir.path()).unwrap();
        let (mut service, _log) = service_with(store, PermissionState::Granted);
        service
            .add_task("Pay rent", now_millis() + 3_600_000, || Ok(true))
            .unwrap()
            .task
            .id
    };

    let store = FileTaskStore::open(dir.path()).unwrap();
    let (mut service, log) = service_with(store, PermissionState::Granted);

    let report = service.start().unwrap();
    assert_eq!(report.loaded, 1);
    assert_eq!(report.armed, 1);
    assert!(service.scheduler().is_armed(id));

    service.start().unwrap();
    assert_eq!(service.scheduler().armed_count(), 1);

    service.process_next().await.unwrap();
    assert_eq!(deliveries(&log).len(), 1);
    assert!(timeout(Duration::from_secs(7200), service.process_next())
        .await
        .is_err());

    let reopened = FileTaskStore::open(dir.path()).unwrap();
    assert!(reopened.get(id).unwrap().unwrap().fired);
}

#[tokio::test(start_paused = true)]
async fn fired_tasks_are_not_rearmed_after_restart() {
    let dir = tempdir().unwrap();

    {
        let mut registry = TaskRegistry::new(FileTaskStore::open(dir.path()).unwrap());
        let task = registry.create("Done", now_millis() + 60_000).unwrap();
        registry.mark_fired(task.id).unwrap();
    }

    let (mut service, _log) =
        service_with(FileTaskStore::open(dir.path()).unwrap(), PermissionState::Granted);
    let report = service.start().unwrap();

    assert_eq!(report.already_fired, 1);
    assert_eq!(service.scheduler().armed_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn legacy_records_are_scheduled_after_normalization() {
    let dir = tempdir().unwrap();
    let due = chrono::Local::now() + chrono::Duration::days(2);
    fs::write(
        dir.path().join("7.json"),
        format!(
            r#"{{ "id": 7, "name": "Legacy", "date": "{}", "time": "{}", "notified": false }}"#,
            due.format("%Y-%m-%d"),
            due.format("%H:%M")
        ),
    )
    .unwrap();

    let (mut service, _log) =
        service_with(FileTaskStore::open(dir.path()).unwrap(), PermissionState::Granted);
    let report = service.start().unwrap();

    assert_eq!(report.armed, 1);
    let task = &service.tasks()[0];
    assert_eq!(task.title, "Legacy");
    assert!(task.due_at > now_millis());
}

#[tokio::test(start_paused = true)]
async fn extreme_due_times_load_without_overflow() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("1.json"),
        format!(r#"{{ "id": 1, "name": "Ancient", "dueAt": {} }}"#, i64::MIN),
    )
    .unwrap();
    fs::write(
        dir.path().join("2.json"),
        format!(r#"{{ "id": 2, "name": "Someday", "dueAt": {} }}"#, i64::MAX),
    )
    .unwrap();

    let (mut service, _log) =
        service_with(FileTaskStore::open(dir.path()).unwrap(), PermissionState::Granted);
    let report = service.start().unwrap();

    assert_eq!(report.loaded, 2);
    assert_eq!(report.missed, 1);
    assert_eq!(report.armed, 1);
    assert!(service.scheduler().is_armed(remindr::TaskId(2)));
}

#[tokio::test(start_paused = true)]
async fn changes_from_another_process_are_picked_up() {
    let dir = tempdir().unwrap();
    let (tx, rx) = mpsc::channel(8);
    let (service, log) =
        service_with(FileTaskStore::open(dir.path()).unwrap(), PermissionState::Granted);
    let mut service = service.with_store_changes(rx);
    service.start().unwrap();

    // A separate CLI invocation adds a task.
    let mut other = TaskRegistry::new(FileTaskStore::open(dir.path()).unwrap());
    let added = other.create("From CLI", now_millis() + 600_000).unwrap();
    tx.send(StoreChange::Changed(added.id)).await.unwrap();
    service.process_next().await.unwrap();
    assert!(service.scheduler().is_armed(added.id));

    // The same write observed twice changes nothing.
    tx.send(StoreChange::Changed(added.id)).await.unwrap();
    service.process_next().await.unwrap();
    assert_eq!(service.scheduler().armed_count(), 1);

    // ...and then deletes it before it is due.
    other.remove(added.id).unwrap();
    tx.send(StoreChange::Removed(added.id)).await.unwrap();
    service.process_next().await.unwrap();
    assert!(!service.scheduler().is_armed(added.id));
    assert!(service.tasks().is_empty());

    assert!(timeout(Duration::from_secs(3600), service.process_next())
        .await
        .is_err());
    assert!(deliveries(&log).is_empty());
}

/// Surface that deletes the task from disk while its notification is shown,
/// the way a concurrent `remindr delete` would.
struct DeletingSurface {
    dir: PathBuf,
    shown: Arc<Mutex<usize>>,
}

#[async_trait]
impl NotificationSurface for DeletingSurface {
    fn name(&self) -> &str {
        "deleting"
    }

    async fn ready(&self) -> bool {
        true
    }

    async fn show(&self, notification: &Notification) -> Result<()> {
        let mut other = FileTaskStore::open(self.dir.clone())?;
        other.delete(notification.data.task_id)?;
        *self.shown.lock().unwrap() += 1;
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn task_deleted_during_delivery_stays_deleted() {
    let dir = tempdir().unwrap();
    let shown = Arc::new(Mutex::new(0));
    let gate = Arc::new(PermissionGate::in_memory(PermissionState::Granted));
    let channel = DeliveryChannel::new(Arc::clone(&gate)).with_background(Box::new(
        DeletingSurface {
            dir: dir.path().to_path_buf(),
            shown: Arc::clone(&shown),
        },
    ));
    let mut service = ReminderService::new(
        FileTaskStore::open(dir.path()).unwrap(),
        channel,
        gate,
        DEFAULT_REMINDER_TITLE,
    );

    let id = service
        .add_task("Pay rent", now_millis() + 1_000, || Ok(true))
        .unwrap()
        .task
        .id;
    service.process_next().await.unwrap();

    assert_eq!(*shown.lock().unwrap(), 1);
    assert!(service.tasks().is_empty());
    let reopened = FileTaskStore::open(dir.path()).unwrap();
    assert_eq!(reopened.get(id).unwrap(), None);
    assert!(reopened.get_all().unwrap().is_empty());
}

/// Reads watcher output until `wanted` arrives or ten seconds pass.
async fn wait_for_change(rx: &mut mpsc::Receiver<StoreChange>, wanted: StoreChange) -> bool {
    let waited = timeout(Duration::from_secs(10), async {
        while let Some(change) = rx.recv().await {
            if change == wanted {
                return true;
            }
        }
        false
    })
    .await;
    waited.unwrap_or(false)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn watcher_reports_writes_from_another_store() {
    let dir = tempdir().unwrap();
    let (_watcher, mut changes) = watch_tasks_dir(dir.path(), Duration::from_secs(1)).unwrap();

    let mut other = TaskRegistry::new(FileTaskStore::open(dir.path()).unwrap());
    let added = other.create("From CLI", now_millis() + 600_000).unwrap();
    assert!(wait_for_change(&mut changes, StoreChange::Changed(added.id)).await);

    other.remove(added.id).unwrap();
    assert!(wait_for_change(&mut changes, StoreChange::Removed(added.id)).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn daemon_arms_task_added_by_another_process() {
    let dir = tempdir().unwrap();
    let (_watcher, changes) = watch_tasks_dir(dir.path(), Duration::from_secs(1)).unwrap();
    let (service, _log) =
        service_with(FileTaskStore::open(dir.path()).unwrap(), PermissionState::Granted);
    let mut service = service.with_store_changes(changes);
    service.start().unwrap();

    let mut other = TaskRegistry::new(FileTaskStore::open(dir.path()).unwrap());
    let added = other.create("From CLI", now_millis() + 600_000).unwrap();

    let armed = timeout(Duration::from_secs(10), async {
        while !service.scheduler().is_armed(added.id) {
            service.process_next().await.unwrap();
        }
    })
    .await;
    assert!(armed.is_ok());
    assert_eq!(service.tasks().len(), 1);
}
