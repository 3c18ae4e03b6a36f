#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use remindr::{
    DeliveryChannel, Notification, NotificationSurface, PermissionGate, PermissionState,
    ReminderService, Result, TaskId, TaskStore, DEFAULT_REMINDER_TITLE,
};

/// One call that reached a notification surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub title: String,
    pub body: String,
    pub task_id: TaskId,
}

pub type DeliveryLog = Arc<Mutex<Vec<Delivered>>>;

/// Background surface that records every notification it is handed.
pub struct Recorder {
    log: DeliveryLog,
}

#[async_trait]
impl NotificationSurface for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn ready(&self) -> bool {
        true
    }

    async fn show(&self, notification: &Notification) -> Result<()> {
        self.log.lock().unwrap().push(Delivered {
            title: notification.title.clone(),
            body: notification.body.clone(),
            task_id: notification.data.task_id,
        });
        Ok(())
    }
}

pub fn service_with<S: TaskStore>(
    store: S,
    permission: PermissionState,
) -> (ReminderService<S>, DeliveryLog) {
    let log: DeliveryLog = Arc::new(Mutex::new(Vec::new()));
    let gate = Arc::new(PermissionGate::in_memory(permission));
    let channel = DeliveryChannel::new(Arc::clone(&gate)).with_background(Box::new(Recorder {
        log: Arc::clone(&log),
    }));

    let service = ReminderService::new(store, channel, gate, DEFAULT_REMINDER_TITLE);
    (service, log)
}

pub fn deliveries(log: &DeliveryLog) -> Vec<Delivered> {
    log.lock().unwrap().clone()
}
