use std::{fs, path::Path, sync::mpsc as std_mpsc, time::Duration};

use log::{debug, error, trace};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::{RemindError, Result, StoredTask, Task, TaskId};

/// A change another process made to the task directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    Changed(TaskId),
    Removed(TaskId),
}

/// Helper method to load a single task from file.
///
/// Returns the normalized task and whether the record was already in the
/// canonical layout.
pub fn load_task_from_file(path: &Path) -> Result<(Task, bool)> {
    trace!("Loading task from file: {}", path.display());
    let content = fs::read_to_string(path).map_err(|e| {
        error!("Failed to open task file {}: {}", path.display(), e);
        RemindError::storage(e)
    })?;

    let record: StoredTask = serde_json::from_str(&content)?;
    let canonical = record.is_canonical();
    let task = record.normalize()?;

    trace!("Successfully loaded task: {}", task.id);
    Ok((task, canonical))
}

/// Extracts the task id from a `<id>.json` path.
pub fn task_id_from_path(path: &Path) -> Option<TaskId> {
    if !path.extension().is_some_and(|ext| ext == "json") {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

/// Translates a raw file system event into store changes.
pub fn changes_from_event(event: notify::Event) -> Vec<StoreChange> {
    let ids = event.paths.iter().filter_map(|p| task_id_from_path(p));

    match event.kind {
        // Atomic writes land as a rename, reported as a modification.
        EventKind::Create(_) | EventKind::Modify(_) => ids.map(StoreChange::Changed).collect(),
        EventKind::Remove(_) => ids.map(StoreChange::Removed).collect(),
        _ => Vec::new(),
    }
}

/// Watches `tasks_dir` and forwards task changes to a tokio channel.
///
/// The watcher must be kept alive for as long as events are wanted;
/// dropping it closes the channel.
pub fn watch_tasks_dir(
    tasks_dir: &Path,
    poll_interval: Duration,
) -> Result<(RecommendedWatcher, mpsc::Receiver<StoreChange>)> {
    let (std_tx, std_rx) = std_mpsc::channel::<notify::Result<notify::Event>>();
    let (tx, rx) = mpsc::channel(100);

    let mut watcher: RecommendedWatcher = Watcher::new(
        std_tx,
        notify::Config::default().with_poll_interval(poll_interval),
    )
    .map_err(|e| RemindError::WatcherError {
        message: format!("Failed to create file watcher: {}", e),
    })?;

    watcher
        .watch(tasks_dir, RecursiveMode::NonRecursive)
        .map_err(|e| RemindError::WatcherError {
            message: format!("Failed to watch {}: {}", tasks_dir.display(), e),
        })?;

    // notify delivers on a std channel; bridge it on a blocking thread
    tokio::task::spawn_blocking(move || {
        while let Ok(event) = std_rx.recv() {
            match event {
                Ok(event) => {
                    debug!("File system event: {:?}", event.kind);
                    for change in changes_from_event(event) {
                        if tx.blocking_send(change).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => error!("File system watcher error: {}", e),
            }
        }
        debug!("File system event bridge stopped");
    });

    Ok((watcher, rx))
}

/// Human readable distance to a due time, e.g. `in 2h 5m` or `3m ago`.
pub fn format_relative(due_at: i64, now: i64) -> String {
    let diff = due_at.saturating_sub(now);
    let secs = diff.unsigned_abs() / 1000;
    let text = if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86_400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86_400, (secs % 86_400) / 3600)
    };

    if diff >= 0 {
        format!("in {}", text)
    } else {
        format!("{} ago", text)
    }
}
