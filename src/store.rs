use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use log::{debug, error, info, trace, warn};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::{load_task_from_file, RemindError, Result, Task, TaskId};

/// File holding the next id to hand out, kept next to the task records.
const SEQUENCE_FILE: &str = ".sequence";

/// Durable keyed storage for task records.
///
/// Every operation is atomic per task: a `put` either fully persists the
/// record or fails with [`RemindError::Storage`] without a partial write.
pub trait TaskStore {
    /// Inserts or replaces a task, returning the committed record.
    fn put(&mut self, task: &Task) -> Result<Task>;

    /// Removes a task. Removing an unknown id succeeds.
    fn delete(&mut self, id: TaskId) -> Result<()>;

    /// Reads a single task.
    fn get(&self, id: TaskId) -> Result<Option<Task>>;

    /// Full scan of all stored tasks, in no particular order.
    fn get_all(&self) -> Result<Vec<Task>>;

    /// Reserves a fresh id that has never been used by this store.
    fn next_id(&mut self) -> Result<TaskId>;
}

/// Stores each task as `<tasks_dir>/<id>.json`.
pub struct FileTaskStore {
    tasks_dir: PathBuf,
}

impl FileTaskStore {
    /// Opens (and creates if needed) a store rooted at `tasks_dir`.
    pub fn open(tasks_dir: impl Into<PathBuf>) -> Result<Self> {
        let tasks_dir = tasks_dir.into();

        if !tasks_dir.exists() {
            debug!(
                "Tasks directory does not exist, creating: {}",
                tasks_dir.display()
            );
            fs::create_dir_all(&tasks_dir).map_err(|e| {
                error!("Failed to create tasks directory: {}", e);
                RemindError::DirectoryError {
                    path: tasks_dir.clone(),
                }
            })?;
        }

        info!("Opened task store at {}", tasks_dir.display());
        Ok(Self { tasks_dir })
    }

    /// Directory the records live in.
    pub fn tasks_dir(&self) -> &Path {
        &self.tasks_dir
    }

    /// Helper method to get the file path for a task
    pub fn task_path(&self, id: TaskId) -> PathBuf {
        self.tasks_dir.join(format!("{}.json", id))
    }

    fn sequence_path(&self) -> PathBuf {
        self.tasks_dir.join(SEQUENCE_FILE)
    }

    /// Writes `contents` to `path` through a temporary file and an atomic rename.
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        trace!("Creating temporary file in directory: {}", dir.display());

        let mut temp_file = NamedTempFile::new_in(dir).map_err(|e| {
            error!("Failed to create temporary file: {}", e);
            RemindError::storage(e)
        })?;

        temp_file.write_all(contents).map_err(|e| {
            error!("Failed to write to temporary file: {}", e);
            RemindError::storage(e)
        })?;

        temp_file.flush().map_err(|e| {
            error!("Failed to flush temporary file: {}", e);
            RemindError::storage(e)
        })?;

        temp_file.persist(path).map_err(|e| {
            error!("Failed to persist file {}: {}", path.display(), e.error);
            RemindError::storage(e.error)
        })?;

        Ok(())
    }

    fn read_sequence(&self) -> Result<u64> {
        let path = self.sequence_path();
        if !path.exists() {
            return Ok(1);
        }

        let raw = fs::read_to_string(&path).map_err(RemindError::storage)?;
        raw.trim().parse::<u64>().map_err(|e| {
            RemindError::storage(format!("corrupt sequence file {}: {}", path.display(), e))
        })
    }
}

impl TaskStore for FileTaskStore {
    fn put(&mut self, task: &Task) -> Result<Task> {
        debug!("Saving task: {}", task.id);

        let json = serde_json::to_string_pretty(task).map_err(|e| {
            error!("Failed to serialize task {}: {}", task.id, e);
            RemindError::storage(e)
        })?;

        self.write_atomic(&self.task_path(task.id), json.as_bytes())?;

        trace!("Task {} persisted", task.id);
        Ok(task.clone())
    }

    fn delete(&mut self, id: TaskId) -> Result<()> {
        let path = self.task_path(id);

        if !path.exists() {
            debug!("Task file {} already absent", path.display());
            return Ok(());
        }

        fs::remove_file(&path).map_err(|e| {
            error!("Failed to delete task file {}: {}", path.display(), e);
            RemindError::storage(e)
        })?;

        debug!("Task file deleted: {}", path.display());
        Ok(())
    }

    fn get(&self, id: TaskId) -> Result<Option<Task>> {
        let path = self.task_path(id);
        if !path.exists() {
            return Ok(None);
        }

        let (task, _) = load_task_from_file(&path)?;
        Ok(Some(task))
    }

    fn get_all(&self) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();
        let mut migrated = Vec::new();

        for entry in WalkDir::new(&self.tasks_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() || !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }

            match load_task_from_file(path) {
                Ok((task, canonical)) => {
                    if !canonical {
                        migrated.push(task.clone());
                    }
                    tasks.push(task);
                }
                Err(e) => warn!("Skipping task record {}: {}", path.display(), e),
            }
        }

        // Legacy records are rewritten in the current layout once.
        for task in &migrated {
            let json = serde_json::to_string_pretty(task).map_err(RemindError::storage)?;
            match self.write_atomic(&self.task_path(task.id), json.as_bytes()) {
                Ok(()) => info!("Migrated legacy record for task {}", task.id),
                Err(e) => warn!("Failed to migrate legacy record {}: {}", task.id, e),
            }
        }

        debug!("Loaded {} task records", tasks.len());
        Ok(tasks)
    }

    fn next_id(&mut self) -> Result<TaskId> {
        let mut next = self.read_sequence()?;

        // Records copied in from elsewhere may be ahead of the sequence.
        let max_on_disk = self
            .get_all()?
            .iter()
            .map(|t| t.id.0)
            .max()
            .unwrap_or(0);
        if next <= max_on_disk {
            next = max_on_disk + 1;
        }

        self.write_atomic(&self.sequence_path(), (next + 1).to_string().as_bytes())?;
        trace!("Reserved task id {}", next);
        Ok(TaskId(next))
    }
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: HashMap<TaskId, Task>,
    next: u64,
    /// When set, every mutating call fails as if the storage were unavailable.
    pub fail_writes: bool,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes {
            return Err(RemindError::Storage {
                message: "storage unavailable".to_string(),
            });
        }
        Ok(())
    }
}

impl TaskStore for MemoryTaskStore {
    fn put(&mut self, task: &Task) -> Result<Task> {
        self.check_writable()?;
        self.tasks.insert(task.id, task.clone());
        Ok(task.clone())
    }

    fn delete(&mut self, id: TaskId) -> Result<()> {
        self.check_writable()?;
        self.tasks.remove(&id);
        Ok(())
    }

    fn get(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.tasks.get(&id).cloned())
    }

    fn get_all(&self) -> Result<Vec<Task>> {
        Ok(self.tasks.values().cloned().collect())
    }

    fn next_id(&mut self) -> Result<TaskId> {
        self.check_writable()?;
        self.next += 1;
        Ok(TaskId(self.next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn task(id: u64, due_at: i64) -> Task {
        Task {
            id: TaskId(id),
            title: format!("task {}", id),
            due_at,
            fired: false,
            created_at: 0,
        }
    }

    #[test]
    fn put_get_delete_round_trip() {
        let dir = tempdir().unwrap();
        let mut store = FileTaskStore::open(dir.path().join("tasks")).unwrap();

        store.put(&task(1, 100)).unwrap();
        store.put(&task(2, 200)).unwrap();
        assert_eq!(store.get(TaskId(1)).unwrap(), Some(task(1, 100)));
        assert_eq!(store.get_all().unwrap().len(), 2);

        store.delete(TaskId(1)).unwrap();
        assert_eq!(store.get(TaskId(1)).unwrap(), None);
        store.delete(TaskId(1)).unwrap();
        assert_eq!(store.get_all().unwrap().len(), 1);
    }

    #[test]
    fn ids_are_never_reused_after_delete() {
        let dir = tempdir().unwrap();
        let mut store = FileTaskStore::open(dir.path()).unwrap();

        let first = store.next_id().unwrap();
        store.put(&task(first.0, 1)).unwrap();
        let second = store.next_id().unwrap();
        store.put(&task(second.0, 1)).unwrap();
        store.delete(second).unwrap();

        let mut reopened = FileTaskStore::open(dir.path()).unwrap();
        let third = reopened.next_id().unwrap();
        assert!(third > second);
    }

    #[test]
    fn sequence_skips_past_foreign_records() {
        let dir = tempdir().unwrap();
        let mut store = FileTaskStore::open(dir.path()).unwrap();
        store.put(&task(41, 1)).unwrap();

        assert_eq!(store.next_id().unwrap(), TaskId(42));
    }

    #[test]
    fn legacy_records_are_migrated_on_scan() {
        let dir = tempdir().unwrap();
        let store = FileTaskStore::open(dir.path()).unwrap();
        fs::write(
            dir.path().join("9.json"),
            r#"{ "id": 9, "name": "Old", "date": "2031-02-03", "time": "08:00", "notified": false }"#,
        )
        .unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();

        let tasks = store.get_all().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Old");

        let raw = fs::read_to_string(dir.path().join("9.json")).unwrap();
        assert!(raw.contains("dueAt"));
        assert!(!raw.contains("\"name\""));
    }

    #[test]
    fn memory_store_failure_switch() {
        let mut store = MemoryTaskStore::new();
        store.put(&task(1, 1)).unwrap();
        store.fail_writes = true;

        assert!(matches!(
            store.put(&task(2, 1)),
            Err(RemindError::Storage { .. })
        ));
        assert!(store.delete(TaskId(1)).is_err());
        assert_eq!(store.get_all().unwrap().len(), 1);
    }
}
