mod error;
mod inflight;
mod mutation;

use std::sync::Arc;
use tracing::{debug, instrument};

pub use error::ControllerError;
pub use mutation::{Committed, PendingMutation};

use self::inflight::InFlight;
use self::mutation::{Operation, Patch, RecordEdit};
use crate::cache::{CacheKey, CacheStore, KeyPattern, ListView, Record, TaskView, ViewClass};
use crate::datastore::Storage;
use crate::model::{
    CorrelationId, EntityId, EntityRef, List, ListPatch, NewList, NewTask, Status, Task, TaskPatch,
};
use crate::query::QueryClient;

/// Runs every write against the cache and storage.
///
/// Each `begin_*` method validates its input, marks the entity busy and
/// patches every cached view the change affects before returning. The
/// returned [`PendingMutation`] performs the storage call on commit. The
/// async methods do both in one go.
pub struct MutationCoordinator<S> {
    client: QueryClient<S>,
    in_flight: Arc<InFlight>,
}

impl<S> Clone for MutationCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            in_flight: self.in_flight.clone(),
        }
    }
}

impl<S: Storage> MutationCoordinator<S> {
    pub fn new(client: QueryClient<S>) -> Self {
        Self {
            client,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Whether a mutation on `entity` has begun and not settled yet.
    pub fn is_in_flight(&self, entity: EntityRef) -> bool {
        self.in_flight.contains(&entity)
    }

    fn cache(&self) -> &CacheStore {
        self.client.cache()
    }

    fn pending(
        &self,
        operation: Operation,
        patch: Patch,
        guard: Option<inflight::InFlightGuard>,
    ) -> PendingMutation<S> {
        PendingMutation::new(self.client.clone(), operation, patch, guard)
    }

    pub fn begin_create_task(&self, item: NewTask) -> Result<PendingMutation<S>, ControllerError> {
        item.validate()?;
        let token = CorrelationId::new();
        let record = Task::optimistic(token, &item);
        let forced = [
            CacheKey::Task(TaskView::All),
            CacheKey::Task(TaskView::ByList(item.list_id)),
        ];
        let patch = Patch::new(self.cache(), &[RecordEdit::upsert(record)], &[], &forced);
        Ok(self.pending(Operation::CreateTask { item, token }, patch, None))
    }

    pub fn begin_update_task(
        &self,
        id: i64,
        patch: TaskPatch,
    ) -> Result<PendingMutation<S>, ControllerError> {
        patch.validate()?;
        let guard = self.in_flight.acquire(EntityRef::task(id))?;
        let edits: Vec<_> = self
            .cached_task(id)
            .map(|task| RecordEdit::upsert(task.patched(&patch)))
            .into_iter()
            .collect();
        let changes = Patch::new(self.cache(), &edits, &[], &[]);
        Ok(self.pending(Operation::UpdateTask { id, patch }, changes, Some(guard)))
    }

    /// Flips the completion of a cached task.
    pub fn begin_toggle_completion(&self, id: i64) -> Result<PendingMutation<S>, ControllerError> {
        let guard = self.in_flight.acquire(EntityRef::task(id))?;
        let task = self
            .cached_task(id)
            .ok_or(ControllerError::NotFound(EntityRef::task(id)))?;
        let completed = !task.is_completed;
        Ok(self.begin_completion(id, completed, Some(task), guard))
    }

    pub fn begin_set_completion(
        &self,
        id: i64,
        completed: bool,
    ) -> Result<PendingMutation<S>, ControllerError> {
        let guard = self.in_flight.acquire(EntityRef::task(id))?;
        let task = self.cached_task(id);
        Ok(self.begin_completion(id, completed, task, guard))
    }

    fn begin_completion(
        &self,
        id: i64,
        completed: bool,
        current: Option<Task>,
        guard: inflight::InFlightGuard,
    ) -> PendingMutation<S> {
        let edits: Vec<_> = current
            .map(|mut task| {
                task.set_completed(completed);
                RecordEdit::upsert(task)
            })
            .into_iter()
            .collect();
        let patch = Patch::new(self.cache(), &edits, &[], &[]);
        self.pending(Operation::SetCompletion { id, completed }, patch, Some(guard))
    }

    pub fn begin_update_status(
        &self,
        id: i64,
        status: Status,
    ) -> Result<PendingMutation<S>, ControllerError> {
        let guard = self.in_flight.acquire(EntityRef::task(id))?;
        let edits: Vec<_> = self
            .cached_task(id)
            .map(|mut task| {
                task.set_status(status);
                RecordEdit::upsert(task)
            })
            .into_iter()
            .collect();
        let patch = Patch::new(self.cache(), &edits, &[], &[]);
        Ok(self.pending(Operation::UpdateStatus { id, status }, patch, Some(guard)))
    }

    pub fn begin_delete_task(&self, id: i64) -> Result<PendingMutation<S>, ControllerError> {
        let guard = self.in_flight.acquire(EntityRef::task(id))?;
        let edits: [RecordEdit<Task>; 1] = [RecordEdit::remove(EntityId::Stored(id))];
        let patch = Patch::new(self.cache(), &edits, &[], &[]);
        Ok(self.pending(Operation::DeleteTask { id }, patch, Some(guard)))
    }

    pub fn begin_create_list(&self, item: NewList) -> Result<PendingMutation<S>, ControllerError> {
        item.validate()?;
        let token = CorrelationId::new();
        let record = List::optimistic(token, &item);
        let forced = [CacheKey::List(ListView::All)];
        let patch = Patch::new(self.cache(), &[], &[RecordEdit::upsert(record)], &forced);
        Ok(self.pending(Operation::CreateList { item, token }, patch, None))
    }

    pub fn begin_update_list(
        &self,
        id: i64,
        patch: ListPatch,
    ) -> Result<PendingMutation<S>, ControllerError> {
        patch.validate()?;
        let guard = self.in_flight.acquire(EntityRef::list(id))?;
        let edits: Vec<_> = find_cached::<List>(self.cache(), EntityId::Stored(id))
            .map(|list| RecordEdit::upsert(list.patched(&patch)))
            .into_iter()
            .collect();
        let changes = Patch::new(self.cache(), &[], &edits, &[]);
        Ok(self.pending(Operation::UpdateList { id, patch }, changes, Some(guard)))
    }

    /// Removes the list and, optimistically, every cached task of it.
    pub fn begin_delete_list(&self, id: i64) -> Result<PendingMutation<S>, ControllerError> {
        let guard = self.in_flight.acquire(EntityRef::list(id))?;
        let mut orphans: Vec<EntityId> = vec![];
        for key in self.cache().cached_keys(KeyPattern::kind(Task::KIND)) {
            for task in self.cache().get::<Task>(&key).unwrap_or_default() {
                if task.list_id == id && !orphans.contains(&task.id) {
                    orphans.push(task.id);
                }
            }
        }
        let tasks: Vec<RecordEdit<Task>> = orphans.into_iter().map(RecordEdit::remove).collect();
        let lists: [RecordEdit<List>; 1] = [RecordEdit::remove(EntityId::Stored(id))];
        let patch = Patch::new(self.cache(), &tasks, &lists, &[]);
        Ok(self.pending(Operation::DeleteList { id }, patch, Some(guard)))
    }

    #[instrument(skip(self, item), fields(list_id = item.list_id))]
    pub async fn create_task(&self, item: NewTask) -> Result<Task, ControllerError> {
        match self.begin_create_task(item)?.commit().await? {
            Committed::CreatedTask(task) => Ok(task),
            other => unreachable!("task creation committed as {:?}", other),
        }
    }

    #[instrument(skip(self, patch))]
    pub async fn update_task(&self, id: i64, patch: TaskPatch) -> Result<(), ControllerError> {
        self.begin_update_task(id, patch)?.commit().await.map(|_| ())
    }

    #[instrument(skip(self))]
    pub async fn toggle_completion(&self, id: i64) -> Result<(), ControllerError> {
        self.begin_toggle_completion(id)?.commit().await.map(|_| ())
    }

    #[instrument(skip(self))]
    pub async fn set_completion(&self, id: i64, completed: bool) -> Result<(), ControllerError> {
        self.begin_set_completion(id, completed)?
            .commit()
            .await
            .map(|_| ())
    }

    #[instrument(skip(self))]
    pub async fn update_status(&self, id: i64, status: Status) -> Result<(), ControllerError> {
        self.begin_update_status(id, status)?
            .commit()
            .await
            .map(|_| ())
    }

    #[instrument(skip(self))]
    pub async fn delete_task(&self, id: i64) -> Result<(), ControllerError> {
        self.begin_delete_task(id)?.commit().await.map(|_| ())
    }

    #[instrument(skip(self, item))]
    pub async fn create_list(&self, item: NewList) -> Result<List, ControllerError> {
        match self.begin_create_list(item)?.commit().await? {
            Committed::CreatedList(list) => Ok(list),
            other => unreachable!("list creation committed as {:?}", other),
        }
    }

    #[instrument(skip(self, patch))]
    pub async fn update_list(&self, id: i64, patch: ListPatch) -> Result<(), ControllerError> {
        self.begin_update_list(id, patch)?.commit().await.map(|_| ())
    }

    #[instrument(skip(self))]
    pub async fn delete_list(&self, id: i64) -> Result<(), ControllerError> {
        self.begin_delete_list(id)?.commit().await.map(|_| ())
    }

    fn cached_task(&self, id: i64) -> Option<Task> {
        let task = find_cached::<Task>(self.cache(), EntityId::Stored(id));
        if task.is_none() {
            debug!(id, "Task is not cached, nothing to patch.");
        }
        task
    }
}

/// Looks a record up in the cached views, by-id views first.
fn find_cached<T: Record>(cache: &CacheStore, id: EntityId) -> Option<T> {
    let mut keys = cache.cached_keys(KeyPattern::kind(T::KIND));
    keys.sort_by_key(|key| key.class() != ViewClass::ById);
    keys.iter()
        .filter_map(|key| cache.get::<T>(key))
        .find_map(|items| items.into_iter().find(|item| item.id() == id))
}

#[cfg(test)]
mod tests {
    use futures::future::join;

    use super::*;
    use crate::cache::EntryStatus;
    use crate::datastore::{MemoryStorage, StorageError, TaskStorage};
    use crate::model::{ModelError, Priority};

    struct Fixture {
        cache: Arc<CacheStore>,
        storage: Arc<MemoryStorage>,
        coordinator: MutationCoordinator<MemoryStorage>,
    }

    fn all() -> CacheKey {
        CacheKey::Task(TaskView::All)
    }

    fn by_list(id: i64) -> CacheKey {
        CacheKey::Task(TaskView::ByList(id))
    }

    // two lists with three tasks, all of them loaded into `All` and `ByList`
    async fn fixture() -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        for name in ["Groceries", "Chores"] {
            storage.seed_list(NewList::new(name));
        }
        storage.seed_task(NewTask::new("Buy milk", 1)).unwrap();
        storage
            .seed_task(NewTask::new("Buy bread", 1).with_priority(Priority::High))
            .unwrap();
        storage.seed_task(NewTask::new("Vacuum", 2)).unwrap();

        let cache = Arc::new(CacheStore::default());
        let client = QueryClient::new(cache.clone(), storage.clone());
        for key in [all(), by_list(1), by_list(2), CacheKey::List(ListView::All)] {
            assert!(client.prefetch(key).await);
        }
        Fixture {
            cache,
            storage,
            coordinator: MutationCoordinator::new(client),
        }
    }

    fn tasks(cache: &CacheStore, key: &CacheKey) -> Vec<Task> {
        cache.get::<Task>(key).unwrap_or_default()
    }

    fn find(cache: &CacheStore, key: &CacheKey, id: i64) -> Option<Task> {
        tasks(cache, key)
            .into_iter()
            .find(|task| task.id == EntityId::Stored(id))
    }

    #[tokio::test]
    async fn test_create_is_visible_before_commit() {
        // GIVEN
        let f = fixture().await;

        // WHEN
        let pending = f
            .coordinator
            .begin_create_task(NewTask::new("Buy eggs", 1))
            .unwrap();

        // THEN
        let temporary = pending.temporary_id().unwrap();
        assert!(temporary.is_temporary());
        for key in [all(), by_list(1)] {
            let head = &tasks(&f.cache, &key)[0];
            assert_eq!(head.id, temporary);
            assert_eq!(head.name, "Buy eggs");
        }
        assert!(tasks(&f.cache, &by_list(2)).iter().all(|t| t.id != temporary));

        // WHEN
        let created = match pending.commit().await.unwrap() {
            Committed::CreatedTask(task) => task,
            other => panic!("unexpected {:?}", other),
        };

        // THEN
        for key in [all(), by_list(1)] {
            let cached = tasks(&f.cache, &key);
            assert_eq!(cached[0], created);
            assert!(cached.iter().all(|task| !task.id.is_temporary()));
            assert_eq!(cached.iter().filter(|task| task.id == created.id).count(), 1);
        }
        let stored_id = created.id.stored().unwrap();
        assert_eq!(
            f.cache.get::<Task>(&CacheKey::Task(TaskView::ById(stored_id))),
            Some(vec![created])
        );
    }

    #[tokio::test]
    async fn test_create_into_unloaded_list_invalidates_it() {
        let f = fixture().await;
        let key = by_list(3);
        f.storage.seed_list(NewList::new("Garden"));

        let created = f
            .coordinator
            .create_task(NewTask::new("Mow", 3))
            .await
            .unwrap();

        assert_eq!(tasks(&f.cache, &key), vec![created]);
        assert_eq!(f.cache.status(&key), EntryStatus::Stale);
        assert_eq!(f.cache.status(&all()), EntryStatus::Fresh);
    }

    #[tokio::test]
    async fn test_failed_create_leaves_no_trace() {
        // GIVEN
        let f = fixture().await;
        let before_all = f.cache.snapshot(&all());
        let before_list = f.cache.snapshot(&by_list(1));
        f.storage.fail_next(1);

        // WHEN
        let err = f
            .coordinator
            .create_task(NewTask::new("Buy eggs", 1))
            .await
            .unwrap_err();

        // THEN
        assert!(matches!(err, ControllerError::Storage(StorageError::Unavailable(_))));
        assert!(err.is_retryable());
        assert_eq!(f.cache.snapshot(&all()), before_all);
        assert_eq!(f.cache.snapshot(&by_list(1)), before_list);
    }

    #[tokio::test]
    async fn test_invalid_input_touches_nothing() {
        let f = fixture().await;
        let calls = f.storage.calls();
        let before = f.cache.snapshot(&all());

        let err = f
            .coordinator
            .begin_create_task(NewTask::new("  ", 1))
            .err()
            .unwrap();

        assert_eq!(err, ControllerError::Validation(ModelError::NameRequired));
        assert_eq!(f.cache.snapshot(&all()), before);
        assert_eq!(f.storage.calls(), calls);
    }

    #[tokio::test]
    async fn test_toggle_patches_every_view() {
        // GIVEN
        let f = fixture().await;
        let pending_key = CacheKey::Task(TaskView::ByStatus(Status::Pending));
        let completed_key = CacheKey::Task(TaskView::ByStatus(Status::Completed));
        f.cache.set(&pending_key, tasks(&f.cache, &all()));
        f.cache.set(&completed_key, Vec::<Task>::new());

        // WHEN
        let pending = f.coordinator.begin_toggle_completion(1).unwrap();

        // THEN
        for key in [all(), by_list(1)] {
            let task = find(&f.cache, &key, 1).unwrap();
            assert!(task.is_completed);
            assert_eq!(task.status, Status::Completed);
        }
        assert!(find(&f.cache, &pending_key, 1).is_none());
        assert_eq!(tasks(&f.cache, &completed_key)[0].id, EntityId::Stored(1));

        // WHEN
        pending.commit().await.unwrap();

        // THEN
        assert_eq!(find(&f.cache, &all(), 1), find(&f.cache, &by_list(1), 1));
        assert!(find(&f.cache, &all(), 1).unwrap().is_completed);
        assert!(!f.coordinator.is_in_flight(EntityRef::task(1)));
    }

    #[tokio::test]
    async fn test_failed_toggle_rolls_back() {
        let f = fixture().await;
        let before = f.cache.snapshot(&by_list(1));
        f.storage.fail_next(1);

        let err = f.coordinator.toggle_completion(1).await.unwrap_err();

        assert!(matches!(err, ControllerError::Storage(_)));
        assert_eq!(f.cache.snapshot(&by_list(1)), before);
        let task = find(&f.cache, &all(), 1).unwrap();
        assert!(!task.is_completed);
        assert_eq!(task.status, Status::Pending);
        assert!(!f.coordinator.is_in_flight(EntityRef::task(1)));
    }

    #[tokio::test]
    async fn test_second_toggle_is_busy() {
        // GIVEN
        let f = fixture().await;
        let first = f.coordinator.begin_toggle_completion(1).unwrap();

        // WHEN
        let second = f.coordinator.toggle_completion(1).await;

        // THEN
        assert_eq!(second.unwrap_err(), ControllerError::Busy(EntityRef::task(1)));
        assert!(find(&f.cache, &all(), 1).unwrap().is_completed, "first patch intact");
        first.commit().await.unwrap();
        assert!(f.coordinator.toggle_completion(1).await.is_ok());
        assert!(!find(&f.cache, &all(), 1).unwrap().is_completed);
    }

    #[tokio::test]
    async fn test_toggle_of_uncached_task() {
        let f = fixture().await;

        let err = f.coordinator.toggle_completion(99).await.unwrap_err();

        assert_eq!(err, ControllerError::NotFound(EntityRef::task(99)));
        assert!(!f.coordinator.is_in_flight(EntityRef::task(99)));
    }

    #[tokio::test]
    async fn test_concurrent_mutations_on_different_tasks() {
        // GIVEN both toggles patched before either resolves
        let f = fixture().await;
        let first = f.coordinator.begin_toggle_completion(1).unwrap();
        let second = f.coordinator.begin_toggle_completion(2).unwrap();
        f.storage.fail_next(1);

        // WHEN the first fails and the second succeeds
        let (first, second) = join(first.commit(), second.commit()).await;

        // THEN only the first is reverted
        assert!(first.is_err());
        assert!(second.is_ok());
        for key in [all(), by_list(1)] {
            assert!(!find(&f.cache, &key, 1).unwrap().is_completed);
            assert!(find(&f.cache, &key, 2).unwrap().is_completed);
        }
        let ids: Vec<EntityId> = tasks(&f.cache, &all()).iter().map(|t| t.id).collect();
        assert_eq!(
            ids,
            vec![EntityId::Stored(3), EntityId::Stored(2), EntityId::Stored(1)],
            "order preserved"
        );
    }

    #[tokio::test]
    async fn test_move_task_between_lists() {
        let f = fixture().await;
        let patch = TaskPatch {
            list_id: Some(2),
            ..Default::default()
        };

        let pending = f.coordinator.begin_update_task(1, patch).unwrap();

        assert!(find(&f.cache, &by_list(1), 1).is_none());
        assert_eq!(tasks(&f.cache, &by_list(2))[0].id, EntityId::Stored(1));
        assert_eq!(find(&f.cache, &all(), 1).unwrap().list_id, 2);

        pending.commit().await.unwrap();
        assert_eq!(f.storage.tasks(Some(2)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_status_change_keeps_completion_in_sync() {
        let f = fixture().await;

        f.coordinator
            .update_status(3, Status::Completed)
            .await
            .unwrap();
        let task = find(&f.cache, &by_list(2), 3).unwrap();
        assert!(task.is_completed);

        f.coordinator
            .update_status(3, Status::InProgress)
            .await
            .unwrap();
        let task = find(&f.cache, &all(), 3).unwrap();
        assert_eq!(task.status, Status::InProgress);
        assert!(!task.is_completed);
    }

    #[tokio::test]
    async fn test_delete_removes_everywhere() {
        // GIVEN
        let f = fixture().await;
        let completed = CacheKey::Task(TaskView::Completed);
        f.cache.set(&completed, Vec::<Task>::new());

        // WHEN
        let pending = f.coordinator.begin_delete_task(2).unwrap();

        // THEN
        assert!(find(&f.cache, &all(), 2).is_none());
        assert!(find(&f.cache, &by_list(1), 2).is_none());

        // WHEN
        pending.commit().await.unwrap();

        // THEN
        assert!(find(&f.cache, &all(), 2).is_none());
        assert!(find(&f.cache, &by_list(1), 2).is_none());
        assert_eq!(f.cache.status(&completed), EntryStatus::Stale);
    }

    #[tokio::test]
    async fn test_dropped_mutation_rolls_back() {
        let f = fixture().await;
        let before = f.cache.snapshot(&all());

        let pending = f.coordinator.begin_delete_task(1).unwrap();
        assert!(f.coordinator.is_in_flight(EntityRef::task(1)));
        drop(pending);

        assert_eq!(f.cache.get::<Task>(&all()), before.data.and_then(Task::take_records));
        assert!(!f.coordinator.is_in_flight(EntityRef::task(1)));
        assert_eq!(f.storage.tasks(Some(1)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_lifecycle() {
        // GIVEN
        let f = fixture().await;
        let lists = CacheKey::List(ListView::All);

        // WHEN
        let list = f
            .coordinator
            .create_list(NewList::new("Garden"))
            .await
            .unwrap();
        let id = list.id.stored().unwrap();

        // THEN
        assert_eq!(f.cache.get::<List>(&lists).unwrap()[0], list);

        // WHEN
        f.coordinator
            .update_list(id, ListPatch::rename("Yard"))
            .await
            .unwrap();

        // THEN
        assert_eq!(f.cache.get::<List>(&lists).unwrap()[0].name, "Yard");

        // WHEN a list with tasks is deleted
        let pending = f.coordinator.begin_delete_list(1).unwrap();

        // THEN its tasks leave every task view at once
        assert!(tasks(&f.cache, &all()).iter().all(|task| task.list_id != 1));
        pending.commit().await.unwrap();
        assert_eq!(f.cache.get::<Task>(&by_list(1)), None);
        assert!(f
            .cache
            .get::<List>(&lists)
            .unwrap()
            .iter()
            .all(|list| list.id != EntityId::Stored(1)));
    }

    #[tokio::test]
    async fn test_failed_delete_restores_position() {
        // GIVEN
        let f = fixture().await;
        let keys = [all(), by_list(1)];
        let before: Vec<_> = keys.iter().map(|key| f.cache.snapshot(key)).collect();
        let index = tasks(&f.cache, &by_list(1))
            .iter()
            .position(|task| task.id == EntityId::Stored(1))
            .unwrap();
        f.storage.fail_next(1);

        // WHEN
        let pending = f.coordinator.begin_delete_task(1).unwrap();
        assert!(find(&f.cache, &all(), 1).is_none());
        let err = pending.commit().await.unwrap_err();

        // THEN
        assert!(matches!(err, ControllerError::Storage(_)));
        let after: Vec<_> = keys.iter().map(|key| f.cache.snapshot(key)).collect();
        assert_eq!(after, before);
        assert_eq!(tasks(&f.cache, &by_list(1))[index].id, EntityId::Stored(1));
        assert!(!f.coordinator.is_in_flight(EntityRef::task(1)));
    }

    #[tokio::test]
    async fn test_failed_move_returns_task_to_its_views() {
        // GIVEN `ByPriority(High)` loaded next to the list views
        let f = fixture().await;
        let high = CacheKey::Task(TaskView::ByPriority(Priority::High));
        assert!(f.coordinator.client.prefetch(high.clone()).await);
        let keys = [all(), by_list(1), by_list(2), high.clone()];
        let before: Vec<_> = keys.iter().map(|key| f.cache.snapshot(key)).collect();
        let patch = TaskPatch {
            list_id: Some(2),
            priority: Some(Priority::High),
            ..Default::default()
        };
        f.storage.fail_next(1);

        // WHEN
        let pending = f.coordinator.begin_update_task(1, patch).unwrap();
        assert!(find(&f.cache, &by_list(1), 1).is_none());
        assert!(find(&f.cache, &by_list(2), 1).is_some());
        assert!(find(&f.cache, &high, 1).is_some());
        let err = pending.commit().await.unwrap_err();

        // THEN
        assert!(matches!(err, ControllerError::Storage(_)));
        let after: Vec<_> = keys.iter().map(|key| f.cache.snapshot(key)).collect();
        assert_eq!(after, before);
        assert_eq!(find(&f.cache, &by_list(1), 1).unwrap().list_id, 1);
        assert!(find(&f.cache, &by_list(2), 1).is_none());
        assert!(find(&f.cache, &high, 1).is_none());
    }

    #[tokio::test]
    async fn test_failed_list_delete_restores_its_tasks() {
        // GIVEN
        let f = fixture().await;
        let lists = CacheKey::List(ListView::All);
        let keys = [all(), by_list(1), by_list(2), lists.clone()];
        let before: Vec<_> = keys.iter().map(|key| f.cache.snapshot(key)).collect();
        f.storage.fail_next(1);

        // WHEN
        let pending = f.coordinator.begin_delete_list(1).unwrap();
        assert!(tasks(&f.cache, &all()).iter().all(|task| task.list_id != 1));
        assert!(tasks(&f.cache, &by_list(1)).is_empty());
        let err = pending.commit().await.unwrap_err();

        // THEN
        assert!(matches!(err, ControllerError::Storage(_)));
        let after: Vec<_> = keys.iter().map(|key| f.cache.snapshot(key)).collect();
        assert_eq!(after, before);
        assert_eq!(tasks(&f.cache, &by_list(1)).len(), 2);
        assert_eq!(f.storage.tasks(Some(1)).await.unwrap().len(), 2);
        assert!(!f.coordinator.is_in_flight(EntityRef::list(1)));
    }
}
