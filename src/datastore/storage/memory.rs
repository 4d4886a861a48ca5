use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::error::StorageError;
use super::{ListStorage, TaskStorage};
use crate::config::StorageConfig;
use crate::model::{EntityRef, List, ListPatch, NewList, NewTask, Priority, Status, Task, TaskPatch};

/// Latency and failure behaviour of [`MemoryStorage`].
#[derive(Debug, Clone, PartialEq)]
pub struct Simulation {
    pub latency_min: Duration,
    pub latency_max: Duration,
    /// Probability in `[0, 1]` that a call fails.
    pub failure_rate: f64,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            latency_min: Duration::from_millis(300),
            latency_max: Duration::from_millis(1200),
            failure_rate: 0.0,
        }
    }
}

impl Simulation {
    pub fn instant() -> Self {
        Self {
            latency_min: Duration::ZERO,
            latency_max: Duration::ZERO,
            failure_rate: 0.0,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            latency_min: config.latency_min,
            latency_max: config.latency_max,
            failure_rate: config.failure_rate.clamp(0.0, 1.0),
        }
    }

    fn delay(&self) -> Duration {
        let min = self.latency_min.as_millis() as u64;
        let max = self.latency_max.as_millis() as u64;
        if max <= min {
            return self.latency_min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    fn roll_failure(&self) -> bool {
        self.failure_rate > 0.0 && rand::thread_rng().gen_bool(self.failure_rate.min(1.0))
    }
}

#[derive(Default)]
struct Tables {
    tasks: BTreeMap<i64, Task>,
    lists: BTreeMap<i64, List>,
    next_task_id: i64,
    next_list_id: i64,
}

impl Tables {
    fn next_task_id(&mut self) -> i64 {
        self.next_task_id += 1;
        self.next_task_id
    }

    fn next_list_id(&mut self) -> i64 {
        self.next_list_id += 1;
        self.next_list_id
    }

    fn task_mut(&mut self, id: i64) -> Result<&mut Task, StorageError> {
        self.tasks
            .get_mut(&id)
            .ok_or(StorageError::NotFound(EntityRef::task(id)))
    }

    fn insert_task(&mut self, item: &NewTask) -> Result<Task, StorageError> {
        if !self.lists.contains_key(&item.list_id) {
            return Err(StorageError::NotFound(EntityRef::list(item.list_id)));
        }
        let id = self.next_task_id();
        let task = Task::stored(id, item, Utc::now());
        self.tasks.insert(id, task.clone());
        Ok(task)
    }

    fn insert_list(&mut self, item: &NewList) -> List {
        let id = self.next_list_id();
        let list = List::stored(id, item, Utc::now());
        self.lists.insert(id, list.clone());
        list
    }

    // newest first
    fn tasks_where<F: Fn(&Task) -> bool>(&self, predicate: F) -> Vec<Task> {
        self.tasks
            .values()
            .rev()
            .filter(|task| predicate(task))
            .cloned()
            .collect()
    }
}

/// In-process storage with simulated round trips.
pub struct MemoryStorage {
    tables: Mutex<Tables>,
    simulation: Simulation,
    forced_failures: AtomicUsize,
    calls: AtomicUsize,
}

impl MemoryStorage {
    /// Storage answering without latency, used by tests.
    pub fn new() -> Self {
        Self::with_simulation(Simulation::instant())
    }

    pub fn with_simulation(simulation: Simulation) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            simulation,
            forced_failures: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Makes the next `count` calls fail with [`StorageError::Unavailable`].
    pub fn fail_next(&self, count: usize) {
        self.forced_failures.store(count, Ordering::SeqCst);
    }

    /// Number of storage calls served so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Inserts a list directly, without latency, failure or call accounting.
    pub fn seed_list(&self, item: NewList) -> List {
        self.tables.lock().insert_list(&item)
    }

    /// Inserts a task directly, without latency, failure or call accounting.
    pub fn seed_task(&self, item: NewTask) -> Result<Task, StorageError> {
        self.tables.lock().insert_task(&item)
    }

    fn take_forced_failure(&self) -> bool {
        self.forced_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }

    async fn round_trip(&self, op: &'static str) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.simulation.delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.take_forced_failure() || self.simulation.roll_failure() {
            warn!(op, "Simulated storage failure.");
            return Err(StorageError::Unavailable(format!("{} failed", op)));
        }
        debug!(op, delay_ms = delay.as_millis() as u64, "storage call served");
        Ok(())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TaskStorage for MemoryStorage {
    async fn tasks(&self, list_id: Option<i64>) -> Result<Vec<Task>, StorageError> {
        self.round_trip("tasks").await?;
        let tables = self.tables.lock();
        Ok(tables.tasks_where(|task| list_id.map_or(true, |id| task.list_id == id)))
    }

    async fn task(&self, id: i64) -> Result<Option<Task>, StorageError> {
        self.round_trip("task").await?;
        Ok(self.tables.lock().tasks.get(&id).cloned())
    }

    async fn create_task(&self, item: NewTask) -> Result<Task, StorageError> {
        self.round_trip("create_task").await?;
        self.tables.lock().insert_task(&item)
    }

    async fn update_task(&self, id: i64, patch: TaskPatch) -> Result<(), StorageError> {
        self.round_trip("update_task").await?;
        let mut tables = self.tables.lock();
        if let Some(list_id) = patch.list_id {
            if !tables.lists.contains_key(&list_id) {
                return Err(StorageError::NotFound(EntityRef::list(list_id)));
            }
        }
        let task = tables.task_mut(id)?;
        *task = task.patched(&patch);
        task.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn delete_task(&self, id: i64) -> Result<(), StorageError> {
        self.round_trip("delete_task").await?;
        self.tables
            .lock()
            .tasks
            .remove(&id)
            .map(|_| ())
            .ok_or(StorageError::NotFound(EntityRef::task(id)))
    }

    async fn search_tasks(&self, needle: &str) -> Result<Vec<Task>, StorageError> {
        self.round_trip("search_tasks").await?;
        Ok(self.tables.lock().tasks_where(|task| task.name.contains(needle)))
    }

    async fn toggle_completion(&self, id: i64, completed: bool) -> Result<(), StorageError> {
        self.round_trip("toggle_completion").await?;
        let mut tables = self.tables.lock();
        let task = tables.task_mut(id)?;
        task.set_completed(completed);
        task.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn update_status(&self, id: i64, status: Status) -> Result<(), StorageError> {
        self.round_trip("update_status").await?;
        let mut tables = self.tables.lock();
        let task = tables.task_mut(id)?;
        task.set_status(status);
        task.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn tasks_by_status(&self, status: Status) -> Result<Vec<Task>, StorageError> {
        self.round_trip("tasks_by_status").await?;
        Ok(self.tables.lock().tasks_where(|task| task.status == status))
    }

    async fn tasks_by_priority(&self, priority: Priority) -> Result<Vec<Task>, StorageError> {
        self.round_trip("tasks_by_priority").await?;
        Ok(self
            .tables
            .lock()
            .tasks_where(|task| task.priority == priority))
    }

    async fn upcoming_tasks(&self) -> Result<Vec<Task>, StorageError> {
        self.round_trip("upcoming_tasks").await?;
        let today = Utc::now().date_naive();
        let mut tasks = self.tables.lock().tasks_where(|task| task.is_upcoming(today));
        tasks.sort_by(|a, b| b.due_date.cmp(&a.due_date));
        Ok(tasks)
    }

    async fn completed_tasks(&self) -> Result<Vec<Task>, StorageError> {
        self.round_trip("completed_tasks").await?;
        let mut tasks = self.tables.lock().tasks_where(|task| task.is_completed);
        tasks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(tasks)
    }
}

#[async_trait::async_trait]
impl ListStorage for MemoryStorage {
    async fn lists(&self) -> Result<Vec<List>, StorageError> {
        self.round_trip("lists").await?;
        Ok(self.tables.lock().lists.values().rev().cloned().collect())
    }

    async fn list(&self, id: i64) -> Result<Option<List>, StorageError> {
        self.round_trip("list").await?;
        Ok(self.tables.lock().lists.get(&id).cloned())
    }

    async fn create_list(&self, item: NewList) -> Result<List, StorageError> {
        self.round_trip("create_list").await?;
        Ok(self.tables.lock().insert_list(&item))
    }

    async fn update_list(&self, id: i64, patch: ListPatch) -> Result<(), StorageError> {
        self.round_trip("update_list").await?;
        let mut tables = self.tables.lock();
        let list = tables
            .lists
            .get_mut(&id)
            .ok_or(StorageError::NotFound(EntityRef::list(id)))?;
        *list = list.patched(&patch);
        list.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn delete_list(&self, id: i64) -> Result<(), StorageError> {
        self.round_trip("delete_list").await?;
        let mut tables = self.tables.lock();
        if tables.lists.remove(&id).is_none() {
            return Err(StorageError::NotFound(EntityRef::list(id)));
        }
        tables.tasks.retain(|_, task| task.list_id != id);
        Ok(())
    }

    async fn search_lists(&self, needle: &str) -> Result<Vec<List>, StorageError> {
        self.round_trip("search_lists").await?;
        Ok(self
            .tables
            .lock()
            .lists
            .values()
            .rev()
            .filter(|list| list.name.contains(needle))
            .cloned()
            .collect())
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.tables.lock();
        f.debug_struct("MemoryStorage")
            .field("tasks", &tables.tasks.len())
            .field("lists", &tables.lists.len())
            .field("simulation", &self.simulation)
            .finish()
    }
}
