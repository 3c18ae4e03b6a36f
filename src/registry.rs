//! In-memory working set of tasks mirrored from a [`TaskStore`].
//!
//! Every mutation writes through to the store first and only touches the
//! in-memory map once the store acknowledged it, so a failed write leaves
//! the registry exactly as it was.
use std::collections::HashMap;

use log::{debug, error, info, warn};

use crate::{RemindError, Result, Task, TaskId, TaskStore};

pub struct TaskRegistry<S: TaskStore> {
    store: S,
    tasks: HashMap<TaskId, Task>,
}

impl<S: TaskStore> TaskRegistry<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            tasks: HashMap::new(),
        }
    }

    /// Replaces the working set with everything currently in the store.
    ///
    /// Returns the loaded tasks sorted by due time.
    pub fn load(&mut self) -> Result<Vec<Task>> {
        let loaded = self.store.get_all()?;

        self.tasks.clear();
        self.tasks.reserve(loaded.len());
        self.tasks
            .extend(loaded.into_iter().map(|task| (task.id, task)));

        info!("Loaded {} tasks into registry", self.tasks.len());
        Ok(self.all())
    }

    /// Creates and stores a new task from a title and due time.
    pub fn create(&mut self, title: &str, due_at: i64) -> Result<Task> {
        let id = self.store.next_id()?;
        let task = Task::new(id, title, due_at)?;
        self.add(task)
    }

    /// Inserts a task that does not exist yet.
    pub fn add(&mut self, task: Task) -> Result<Task> {
        if self.tasks.contains_key(&task.id) {
            return Err(RemindError::InvalidTask {
                message: format!("task {} already exists", task.id),
            });
        }

        let committed = self.store.put(&task)?;
        self.tasks.insert(committed.id, committed.clone());
        debug!("Added task {} due at {}", committed.id, committed.due_at);
        Ok(committed)
    }

    /// Replaces an existing task.
    ///
    /// `id`, `due_at` and `created_at` are immutable and `fired` can only go
    /// from false to true.
    pub fn update(&mut self, task: Task) -> Result<Task> {
        let current = self
            .tasks
            .get(&task.id)
            .ok_or(RemindError::TaskNotFound { id: task.id })?;

        if task.due_at != current.due_at || task.created_at != current.created_at {
            let message = format!("cannot change the due or creation time of task {}", task.id);
            error!("{}", message);
            return Err(RemindError::InvalidTask { message });
        }

        if current.fired && !task.fired {
            let message = format!("task {} has already fired", task.id);
            error!("{}", message);
            return Err(RemindError::InvalidTask { message });
        }

        let committed = self.store.put(&task)?;
        self.tasks.insert(committed.id, committed.clone());
        Ok(committed)
    }

    /// Sets the fired flag. Marking an already fired task is a no-op.
    pub fn mark_fired(&mut self, id: TaskId) -> Result<Task> {
        let task = self
            .tasks
            .get(&id)
            .cloned()
            .ok_or(RemindError::TaskNotFound { id })?;

        if task.fired {
            return Ok(task);
        }

        self.update(Task {
            fired: true,
            ..task
        })
    }

    /// Deletes a task from the store and the working set.
    pub fn remove(&mut self, id: TaskId) -> Result<Task> {
        let task = self
            .tasks
            .get(&id)
            .cloned()
            .ok_or(RemindError::TaskNotFound { id })?;

        self.store.delete(id)?;
        self.tasks.remove(&id);
        debug!("Removed task {}", id);
        Ok(task)
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    /// All tasks sorted ascending by due time (ties by creation, then id).
    pub fn all(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.values().cloned().collect();
        tasks.sort_by_key(|t| (t.due_at, t.created_at, t.id));
        tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Reads a task straight from the store, bypassing the working set.
    pub fn read_through(&self, id: TaskId) -> Result<Option<Task>> {
        self.store.get(id)
    }

    /// Mirrors a task another process already committed to the store.
    ///
    /// Returns `None` if the change was ignored because it would regress
    /// the fired flag or nothing changed.
    pub fn absorb(&mut self, task: Task) -> Option<Task> {
        match self.tasks.get(&task.id) {
            Some(current) if *current == task => None,
            Some(current) if current.fired && !task.fired => {
                warn!("Ignoring external change that un-fires task {}", task.id);
                None
            }
            _ => {
                self.tasks.insert(task.id, task.clone());
                Some(task)
            }
        }
    }

    /// Drops a task another process already deleted from the store.
    pub fn forget(&mut self, id: TaskId) -> Option<Task> {
        self.tasks.remove(&id)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}
