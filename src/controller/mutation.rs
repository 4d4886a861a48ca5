use chrono::{NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};

use super::inflight::InFlightGuard;
use super::ControllerError;
use crate::cache::{CacheKey, CacheStore, EntrySnapshot, KeyPattern, PinId, Record, TaskView};
use crate::datastore::{Storage, StorageError};
use crate::model::{
    CorrelationId, EntityId, EntityKind, List, ListPatch, NewList, NewTask, Status, Task, TaskPatch,
};
use crate::query::QueryClient;

/// The value a record takes after a mutation; `None` removes it.
#[derive(Debug, Clone)]
pub(super) struct RecordEdit<T> {
    id: EntityId,
    after: Option<T>,
}

impl<T: Record> RecordEdit<T> {
    pub fn upsert(record: T) -> Self {
        Self {
            id: record.id(),
            after: Some(record),
        }
    }

    pub fn remove(id: EntityId) -> Self {
        Self { id, after: None }
    }
}

// where a record sat before the patch; `None` if the patch inserted it
#[derive(Debug)]
struct Prior<T> {
    id: EntityId,
    previous: Option<(usize, T)>,
}

#[derive(Debug)]
struct Touched<T> {
    key: CacheKey,
    snapshot: EntrySnapshot,
    revision: u64,
    priors: Vec<Prior<T>>,
}

impl<T> Touched<T> {
    fn was_absent(&self) -> bool {
        self.snapshot.data.is_none()
    }
}

/// Every entry a mutation changed at Begin, with what it held before, and
/// the pins that keep the edits on top of fetches landing before it settles.
#[derive(Debug, Default)]
pub(super) struct Patch {
    tasks: Vec<Touched<Task>>,
    lists: Vec<Touched<List>>,
    pins: Vec<PinId>,
}

impl Patch {
    pub fn new(
        cache: &CacheStore,
        tasks: &[RecordEdit<Task>],
        lists: &[RecordEdit<List>],
        forced: &[CacheKey],
    ) -> Self {
        let today = Utc::now().date_naive();
        let pins = pin_edits(cache, tasks, today)
            .into_iter()
            .chain(pin_edits(cache, lists, today))
            .collect();
        Self {
            tasks: apply_edits(cache, tasks, forced, today),
            lists: apply_edits(cache, lists, forced, today),
            pins,
        }
    }

    /// Releases the pins; returns the keys fetched with the edits applied.
    fn unpin(&mut self, cache: &CacheStore) -> Vec<CacheKey> {
        let mut rebased = vec![];
        for pin in self.pins.drain(..) {
            for key in cache.unpin(pin) {
                if !rebased.contains(&key) {
                    rebased.push(key);
                }
            }
        }
        rebased
    }

    fn keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.tasks
            .iter()
            .map(|touched| &touched.key)
            .chain(self.lists.iter().map(|touched| &touched.key))
    }

    /// Undoes the patch. Returns the keys that were fetched with the edits
    /// applied and must be refetched.
    fn rollback(mut self, cache: &CacheStore) -> Vec<CacheKey> {
        let rebased = self.unpin(cache);
        revert_entries(cache, self.tasks);
        revert_entries(cache, self.lists);
        rebased
    }
}

/// Storage call behind a mutation.
#[derive(Debug, Clone)]
pub(super) enum Operation {
    CreateTask { item: NewTask, token: CorrelationId },
    UpdateTask { id: i64, patch: TaskPatch },
    SetCompletion { id: i64, completed: bool },
    UpdateStatus { id: i64, status: Status },
    DeleteTask { id: i64 },
    CreateList { item: NewList, token: CorrelationId },
    UpdateList { id: i64, patch: ListPatch },
    DeleteList { id: i64 },
}

impl Operation {
    fn kind(&self) -> EntityKind {
        match self {
            Operation::CreateTask { .. }
            | Operation::UpdateTask { .. }
            | Operation::SetCompletion { .. }
            | Operation::UpdateStatus { .. }
            | Operation::DeleteTask { .. } => EntityKind::Task,
            Operation::CreateList { .. }
            | Operation::UpdateList { .. }
            | Operation::DeleteList { .. } => EntityKind::List,
        }
    }

    // deleting a list also takes its tasks
    fn affects(&self) -> impl Fn(&CacheKey) -> bool {
        let kind = self.kind();
        let cascade = matches!(self, Operation::DeleteList { .. });
        move |key: &CacheKey| key.kind() == kind || (cascade && key.kind() == EntityKind::Task)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::CreateTask { token, .. } => write!(f, "create_task/{}", token),
            Operation::UpdateTask { id, .. } => write!(f, "update_task/{}", id),
            Operation::SetCompletion { id, completed } => {
                write!(f, "set_completion/{}/{}", id, completed)
            }
            Operation::UpdateStatus { id, status } => write!(f, "update_status/{}/{}", id, status),
            Operation::DeleteTask { id } => write!(f, "delete_task/{}", id),
            Operation::CreateList { token, .. } => write!(f, "create_list/{}", token),
            Operation::UpdateList { id, .. } => write!(f, "update_list/{}", id),
            Operation::DeleteList { id } => write!(f, "delete_list/{}", id),
        }
    }
}

/// What storage confirmed.
#[derive(Debug, Clone, PartialEq)]
pub enum Committed {
    CreatedTask(Task),
    CreatedList(List),
    Applied,
}

/// A mutation whose optimistic patch is already visible in the cache.
///
/// [`PendingMutation::commit`] runs the storage call and then either
/// reconciles the cache with the result or rolls the patch back. A mutation
/// dropped before it settles, including a commit future dropped mid-flight,
/// is rolled back and the affected views are refetched.
#[must_use = "an uncommitted mutation is rolled back when dropped"]
pub struct PendingMutation<S: Storage> {
    client: QueryClient<S>,
    operation: Operation,
    patch: Option<Patch>,
    _guard: Option<InFlightGuard>,
}

impl<S: Storage> PendingMutation<S> {
    pub(super) fn new(
        client: QueryClient<S>,
        operation: Operation,
        patch: Patch,
        guard: Option<InFlightGuard>,
    ) -> Self {
        debug!(op = %operation, touched = patch.keys().count(), "Optimistic patch applied.");
        Self {
            client,
            operation,
            patch: Some(patch),
            _guard: guard,
        }
    }

    /// Id of the provisional record inserted by a create.
    pub fn temporary_id(&self) -> Option<EntityId> {
        match &self.operation {
            Operation::CreateTask { token, .. } | Operation::CreateList { token, .. } => {
                Some(EntityId::Temporary(*token))
            }
            _ => None,
        }
    }

    /// Cache keys changed by the optimistic patch.
    pub fn touched_keys(&self) -> Vec<CacheKey> {
        self.patch
            .iter()
            .flat_map(|patch| patch.keys().cloned())
            .collect()
    }

    #[instrument(skip(self), fields(op = %self.operation))]
    pub async fn commit(mut self) -> Result<Committed, ControllerError> {
        let result = self.call_storage().await;
        let mut patch = self.patch.take().unwrap_or_default();
        let cache = self.client.cache();
        match result {
            Ok(committed) => {
                // these may have read storage before the write landed
                let racing = cache.cancel_fetches(self.operation.affects());
                let rebased = patch.unpin(cache);
                self.reconcile(patch, &rebased, &committed);
                if !racing.is_empty() {
                    debug!(racing = racing.len(), "Refetching views read during the mutation.");
                    self.client.invalidate(move |key: &CacheKey| racing.contains(key));
                }
                info!("Mutation committed.");
                Ok(committed)
            }
            Err(err) => {
                warn!(reason = %err, "Mutation failed, rolling back.");
                let rebased = patch.rollback(cache);
                if !rebased.is_empty() {
                    self.client.invalidate(move |key: &CacheKey| rebased.contains(key));
                }
                Err(err.into())
            }
        }
    }

    async fn call_storage(&self) -> Result<Committed, StorageError> {
        let storage = self.client.storage();
        match &self.operation {
            Operation::CreateTask { item, .. } => storage
                .create_task(item.clone())
                .await
                .map(Committed::CreatedTask),
            Operation::UpdateTask { id, patch } => storage
                .update_task(*id, patch.clone())
                .await
                .map(|_| Committed::Applied),
            Operation::SetCompletion { id, completed } => storage
                .toggle_completion(*id, *completed)
                .await
                .map(|_| Committed::Applied),
            Operation::UpdateStatus { id, status } => storage
                .update_status(*id, *status)
                .await
                .map(|_| Committed::Applied),
            Operation::DeleteTask { id } => {
                storage.delete_task(*id).await.map(|_| Committed::Applied)
            }
            Operation::CreateList { item, .. } => storage
                .create_list(item.clone())
                .await
                .map(Committed::CreatedList),
            Operation::UpdateList { id, patch } => storage
                .update_list(*id, patch.clone())
                .await
                .map(|_| Committed::Applied),
            Operation::DeleteList { id } => {
                storage.delete_list(*id).await.map(|_| Committed::Applied)
            }
        }
    }

    fn reconcile(&self, patch: Patch, rebased: &[CacheKey], committed: &Committed) {
        let cache = self.client.cache();
        let kind = self.operation.kind();
        match (&self.operation, committed) {
            (Operation::CreateTask { token, .. }, Committed::CreatedTask(task)) => {
                self.confirm_created(&patch.tasks, rebased, EntityId::Temporary(*token), task);
            }
            (Operation::CreateList { token, .. }, Committed::CreatedList(list)) => {
                self.confirm_created(&patch.lists, rebased, EntityId::Temporary(*token), list);
            }
            (Operation::DeleteTask { id }, _) => {
                cache.remove(&CacheKey::by_id(kind, *id));
                self.client.invalidate(derived(kind));
            }
            (Operation::DeleteList { id }, _) => {
                cache.remove(&CacheKey::by_id(kind, *id));
                cache.remove(&CacheKey::Task(TaskView::ByList(*id)));
                // its tasks went with it
                self.client.invalidate(KeyPattern::kind(EntityKind::Task));
                self.client.invalidate(derived(kind));
            }
            (_, _) if patch.keys().next().is_none() => {
                // nothing was cached to patch, the views may still hold it
                self.client.invalidate(KeyPattern::kind(kind));
            }
            (_, _) => {
                self.client.invalidate(derived(kind));
            }
        }
    }

    /// Swaps the provisional record for the stored one in place.
    fn confirm_created<T: Record>(
        &self,
        touched: &[Touched<T>],
        rebased: &[CacheKey],
        temporary: EntityId,
        stored: &T,
    ) {
        let cache = self.client.cache();
        let keys = touched
            .iter()
            .map(|entry| &entry.key)
            .chain(rebased.iter().filter(|key| key.kind() == T::KIND));
        for key in keys {
            cache.patch(key, |items: &mut Vec<T>| confirm(items, temporary, stored));
        }
        if let Some(id) = stored.id().stored() {
            cache.set(&CacheKey::by_id(T::KIND, id), vec![stored.clone()]);
        }
        // views that were never loaded only hold the new record
        let partial: Vec<CacheKey> = touched
            .iter()
            .filter(|entry| entry.was_absent())
            .map(|entry| entry.key.clone())
            .collect();
        self.client.invalidate(move |key: &CacheKey| {
            key.kind() == T::KIND && (key.is_derived() || partial.contains(key))
        });
    }
}

impl<S: Storage> Drop for PendingMutation<S> {
    fn drop(&mut self) {
        if let Some(patch) = self.patch.take() {
            warn!(op = %self.operation, "Mutation dropped before it settled, rolling back.");
            // refetches whatever the pins wrote along with the rest
            patch.rollback(self.client.cache());
            self.client.invalidate(self.operation.affects());
        }
    }
}

fn derived(kind: EntityKind) -> impl Fn(&CacheKey) -> bool {
    move |key: &CacheKey| key.kind() == kind && key.is_derived()
}

/// Applies `edits` to every cached view of `T`, and to the `forced` views
/// even when they hold nothing yet.
fn apply_edits<T: Record>(
    cache: &CacheStore,
    edits: &[RecordEdit<T>],
    forced: &[CacheKey],
    today: NaiveDate,
) -> Vec<Touched<T>> {
    if edits.is_empty() {
        return vec![];
    }
    let pattern = KeyPattern::kind(T::KIND);
    let cancelled = cache.cancel_fetches(pattern);
    if !cancelled.is_empty() {
        debug!(cancelled = cancelled.len(), "Cancelled fetches racing a mutation.");
    }
    let mut keys = cache.cached_keys(pattern);
    for key in forced.iter().filter(|key| key.kind() == T::KIND) {
        if !keys.contains(key) {
            keys.push(key.clone());
        }
    }

    let mut touched = vec![];
    for key in keys {
        let mut priors = vec![];
        let patched = cache.patch(&key, |items: &mut Vec<T>| {
            for edit in edits {
                patch_view(&key, items, edit, today, &mut priors);
            }
            !priors.is_empty()
        });
        if let Some((snapshot, revision)) = patched {
            touched.push(Touched {
                key,
                snapshot,
                revision,
                priors,
            });
        }
    }
    touched
}

fn pin_edits<T: Record>(
    cache: &CacheStore,
    edits: &[RecordEdit<T>],
    today: NaiveDate,
) -> Option<PinId> {
    if edits.is_empty() {
        return None;
    }
    let edits = edits.to_vec();
    Some(cache.pin(move |key: &CacheKey, items: &mut Vec<T>| {
        let mut priors = vec![];
        for edit in &edits {
            patch_view(key, items, edit, today, &mut priors);
        }
        !priors.is_empty()
    }))
}

/// Replaces, removes or inserts the edited record depending on whether the
/// view holds it and whether the view admits its new value.
fn patch_view<T: Record>(
    key: &CacheKey,
    items: &mut Vec<T>,
    edit: &RecordEdit<T>,
    today: NaiveDate,
    priors: &mut Vec<Prior<T>>,
) {
    let position = items.iter().position(|item| item.id() == edit.id);
    let admitted = edit
        .after
        .as_ref()
        .filter(|after| after.admitted_by(key, today));
    let previous = match (position, admitted) {
        (Some(index), Some(after)) => Some((index, std::mem::replace(&mut items[index], after.clone()))),
        (Some(index), None) => Some((index, items.remove(index))),
        (None, Some(after)) => {
            items.insert(0, after.clone());
            None
        }
        (None, None) => return,
    };
    priors.push(Prior {
        id: edit.id,
        previous,
    });
}

/// Undoes the patch record by record, in reverse order.
fn revert<T: Record>(items: &mut Vec<T>, priors: &[Prior<T>]) {
    for prior in priors.iter().rev() {
        items.retain(|item| item.id() != prior.id);
        if let Some((index, value)) = &prior.previous {
            items.insert((*index).min(items.len()), value.clone());
        }
    }
}

fn revert_entries<T: Record>(cache: &CacheStore, touched: Vec<Touched<T>>) {
    for entry in touched.into_iter().rev() {
        let Touched {
            key,
            snapshot,
            revision,
            priors,
        } = entry;
        if cache.restore_if_unchanged(snapshot, revision) {
            continue;
        }
        // written by someone else since; keep their records
        debug!(key = %key, "Reverting records of a changed entry.");
        cache.update_many(
            |candidate: &CacheKey| *candidate == key,
            |_key: &CacheKey, items: &mut Vec<T>| revert(items, &priors),
        );
    }
}

fn confirm<T: Record>(items: &mut Vec<T>, temporary: EntityId, stored: &T) -> bool {
    let index = match items.iter().position(|item| item.id() == temporary) {
        Some(index) => index,
        None => return false,
    };
    items[index] = stored.clone();
    let id = stored.id();
    let mut position = 0;
    items.retain(|item| {
        let keep = item.id() != id || position == index;
        position += 1;
        keep
    });
    true
}
