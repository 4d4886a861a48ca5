mod error;
mod memory;

pub use error::StorageError;
pub use memory::{MemoryStorage, Simulation};

use crate::model::{List, ListPatch, NewList, NewTask, Priority, Status, Task, TaskPatch};

// Storage of tasks, every call may take a while and may fail.
#[async_trait::async_trait]
pub trait TaskStorage: Sync + Send + 'static {
    /// Every task, or the tasks of one list, newest first.
    async fn tasks(&self, list_id: Option<i64>) -> Result<Vec<Task>, StorageError>;
    async fn task(&self, id: i64) -> Result<Option<Task>, StorageError>;
    async fn create_task(&self, item: NewTask) -> Result<Task, StorageError>;
    async fn update_task(&self, id: i64, patch: TaskPatch) -> Result<(), StorageError>;
    async fn delete_task(&self, id: i64) -> Result<(), StorageError>;
    /// Case-sensitive substring match on the name.
    async fn search_tasks(&self, needle: &str) -> Result<Vec<Task>, StorageError>;
    async fn toggle_completion(&self, id: i64, completed: bool) -> Result<(), StorageError>;
    async fn update_status(&self, id: i64, status: Status) -> Result<(), StorageError>;
    async fn tasks_by_status(&self, status: Status) -> Result<Vec<Task>, StorageError>;
    async fn tasks_by_priority(&self, priority: Priority) -> Result<Vec<Task>, StorageError>;
    /// Not completed and due after today, latest due date first.
    async fn upcoming_tasks(&self) -> Result<Vec<Task>, StorageError>;
    /// Completed tasks, most recently updated first.
    async fn completed_tasks(&self) -> Result<Vec<Task>, StorageError>;
}

#[async_trait::async_trait]
pub trait ListStorage: Sync + Send + 'static {
    async fn lists(&self) -> Result<Vec<List>, StorageError>;
    async fn list(&self, id: i64) -> Result<Option<List>, StorageError>;
    async fn create_list(&self, item: NewList) -> Result<List, StorageError>;
    async fn update_list(&self, id: i64, patch: ListPatch) -> Result<(), StorageError>;
    /// Deletes the list together with its tasks.
    async fn delete_list(&self, id: i64) -> Result<(), StorageError>;
    async fn search_lists(&self, needle: &str) -> Result<Vec<List>, StorageError>;
}

/// Everything the cache needs from storage.
pub trait Storage: TaskStorage + ListStorage {}

impl<S> Storage for S where S: TaskStorage + ListStorage {}
