// Task list state with write-through persistence

use crate::clock::{Clock, SystemClock};
use crate::codec;
use crate::filter::TaskFilter;
use crate::ids::IdGenerator;
use crate::models::{EditSession, Task, TaskId};
use crate::storage::{self, Storage};
use eyre::{Result, eyre};
use tracing::{debug, info, warn};

/// Slot the list is persisted under unless configured otherwise
pub const DEFAULT_KEY: &str = "todos";

/// Authoritative task list plus the current edit session.
///
/// Every mutation that changes the list writes the full serialized list to
/// the storage slot before returning. Operations given an unknown id or empty
/// text do nothing and report that through their return value.
pub struct TaskListStore<S: Storage, C: Clock = SystemClock> {
    storage: S,
    clock: C,
    key: String,
    tasks: Vec<Task>,
    editing: Option<EditSession>,
    ids: IdGenerator,
}

impl<S: Storage> TaskListStore<S, SystemClock> {
    /// Open against the wall clock and the default slot
    pub fn with_system_clock(storage: S) -> Self {
        Self::open(storage, SystemClock)
    }
}

impl<S: Storage, C: Clock> TaskListStore<S, C> {
    /// Open the store on the default `todos` slot and load what it holds
    pub fn open(storage: S, clock: C) -> Self {
        let mut store = Self::empty(storage, clock, DEFAULT_KEY.to_string());
        store.initialize();
        store
    }

    /// Open the store on a named slot
    pub fn open_with_key(storage: S, clock: C, key: &str) -> Result<Self> {
        storage::validate_key(key)?;
        let mut store = Self::empty(storage, clock, key.to_string());
        store.initialize();
        Ok(store)
    }

    fn empty(storage: S, clock: C, key: String) -> Self {
        Self {
            storage,
            clock,
            key,
            tasks: Vec::new(),
            editing: None,
            ids: IdGenerator::new(),
        }
    }

    /// Replace in-memory state with the persisted list.
    ///
    /// A missing slot, unreadable storage, or malformed content all yield an
    /// empty list; none of them is reported to the caller.
    pub fn initialize(&mut self) {
        let raw = match self.storage.read(&self.key) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %self.key, error = ?e, "Failed to read persisted task list, starting empty");
                None
            }
        };

        self.tasks = codec::decode_or_empty(raw.as_deref());
        self.editing = None;
        self.ids = IdGenerator::seeded(self.tasks.iter().map(|t| t.id));

        info!(key = %self.key, count = self.tasks.len(), "Loaded task list");
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Append a task with the trimmed text. Returns the new id, or `None` when
    /// the text is blank.
    pub fn add(&mut self, raw_text: &str) -> Result<Option<TaskId>> {
        let text = raw_text.trim();
        if text.is_empty() {
            debug!("Ignoring blank task");
            return Ok(None);
        }

        let id = self.ids.next_id(&self.clock).ok_or_else(|| eyre!("No unused task id left"))?;
        let task = Task::new(id, text, self.clock.now());
        self.tasks.push(task);
        debug!(id, "Added task");

        self.persist()?;
        Ok(Some(id))
    }

    /// Remove a task. Returns false if no task has that id.
    pub fn delete(&mut self, id: TaskId) -> Result<bool> {
        let Some(index) = self.position(id) else {
            return Ok(false);
        };

        self.tasks.remove(index);
        if self.editing_id() == Some(id) {
            self.editing = None;
        }
        debug!(id, "Deleted task");

        self.persist()?;
        Ok(true)
    }

    /// Flip a task's completion flag. Returns false if no task has that id.
    pub fn toggle_complete(&mut self, id: TaskId) -> Result<bool> {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            return Ok(false);
        };

        task.completed = !task.completed;
        debug!(id, completed = task.completed, "Toggled task");

        self.persist()?;
        Ok(true)
    }

    /// Open an edit session on a task, seeding the draft with its text.
    ///
    /// Any session already open is replaced and its draft discarded.
    pub fn begin_edit(&mut self, id: TaskId) -> bool {
        let Some(draft) = self.get(id).map(|t| t.text.clone()) else {
            return false;
        };

        if let Some(previous) = self.editing.as_ref().filter(|s| s.id != id) {
            debug!(id = previous.id, "Abandoning edit session");
        }
        self.editing = Some(EditSession { id, draft });
        true
    }

    /// Replace the draft verbatim. Returns false if no session is open.
    pub fn update_edit_draft(&mut self, text: impl Into<String>) -> bool {
        match self.editing.as_mut() {
            Some(session) => {
                session.draft = text.into();
                true
            }
            None => false,
        }
    }

    /// Close the edit session on `id`, saving the trimmed draft.
    ///
    /// A blank draft leaves the task's text as it was. Either way the session
    /// ends. Returns true only if the task's text was replaced.
    pub fn commit_edit(&mut self, id: TaskId) -> Result<bool> {
        let Some(session) = self.editing.take_if(|s| s.id == id) else {
            return Ok(false);
        };

        let text = session.draft.trim();
        if text.is_empty() {
            debug!(id, "Blank draft, keeping previous text");
            return Ok(false);
        }

        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            return Ok(false);
        };
        task.text = text.to_string();
        debug!(id, "Saved edit");

        self.persist()?;
        Ok(true)
    }

    /// Drop the edit session without saving. Returns false if none was open.
    pub fn cancel_edit(&mut self) -> bool {
        self.editing.take().is_some()
    }

    /// Remove every completed task. Returns how many were removed.
    pub fn clear_completed(&mut self) -> Result<usize> {
        let before = self.tasks.len();
        self.tasks.retain(|t| !t.completed);
        let removed = before - self.tasks.len();
        if removed == 0 {
            return Ok(0);
        }

        if self.editing_id().is_some_and(|id| self.get(id).is_none()) {
            self.editing = None;
        }
        debug!(removed, "Cleared completed tasks");

        self.persist()?;
        Ok(removed)
    }

    // ========================================================================
    // Views
    // ========================================================================

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn filtered(&self, filter: TaskFilter) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(move |t| filter.matches(t))
    }

    pub fn editing(&self) -> Option<&EditSession> {
        self.editing.as_ref()
    }

    pub fn editing_id(&self) -> Option<TaskId> {
        self.editing.as_ref().map(|s| s.id)
    }

    /// Number of tasks not yet completed
    pub fn remaining_count(&self) -> usize {
        self.filtered(TaskFilter::Active).count()
    }

    pub fn completed_count(&self) -> usize {
        self.filtered(TaskFilter::Completed).count()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    // ========================================================================
    // Helper methods
    // ========================================================================

    fn position(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    fn persist(&mut self) -> Result<()> {
        let raw = codec::encode_tasks(&self.tasks)?;
        self.storage.write(&self.key, &raw)?;
        debug!(key = %self.key, count = self.tasks.len(), "Persisted task list");
        Ok(())
    }
}
