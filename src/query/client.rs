use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info_span, warn};
use tracing_futures::Instrument;

use super::view::{SearchQuery, ViewQuery};
use crate::cache::{CacheKey, CacheStore, KeyPredicate, ListView, Record, TaskView};
use crate::datastore::{Storage, StorageError};
use crate::model::{EntityRef, List, Task};

/// Binds cache keys to storage reads.
pub struct QueryClient<S> {
    cache: Arc<CacheStore>,
    storage: Arc<S>,
}

impl<S> Clone for QueryClient<S> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            storage: self.storage.clone(),
        }
    }
}

impl<S: Storage> QueryClient<S> {
    pub fn new(cache: Arc<CacheStore>, storage: Arc<S>) -> Self {
        Self { cache, storage }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// A live view of tasks. A search view with an empty term stays idle.
    pub fn tasks(&self, view: TaskView) -> ViewQuery<Task, S> {
        let enabled = !matches!(&view, TaskView::Search(term) if term.is_empty());
        ViewQuery::new(self.clone(), CacheKey::Task(view), enabled)
    }

    /// A live view of lists. A search view with an empty term stays idle.
    pub fn lists(&self, view: ListView) -> ViewQuery<List, S> {
        let enabled = !matches!(&view, ListView::Search(term) if term.is_empty());
        ViewQuery::new(self.clone(), CacheKey::List(view), enabled)
    }

    pub fn search_tasks(&self, term: &str) -> SearchQuery<Task, S> {
        SearchQuery::new(self.clone(), term, |term| {
            CacheKey::Task(TaskView::Search(term))
        })
    }

    pub fn search_lists(&self, term: &str) -> SearchQuery<List, S> {
        SearchQuery::new(self.clone(), term, |term| {
            CacheKey::List(ListView::Search(term))
        })
    }

    /// Marks matching entries stale and refetches the ones somebody watches.
    pub fn invalidate<P: KeyPredicate>(&self, predicate: P) -> Vec<CacheKey> {
        let observed = self.cache.invalidate(predicate);
        for key in observed.iter() {
            self.spawn_fetch(key.clone());
        }
        observed
    }

    /// Loads `key` in the background unless a fetch is already running.
    ///
    /// The result is written only under `key`, and only if the fetch was not
    /// cancelled in the meantime.
    pub fn spawn_fetch(&self, key: CacheKey) -> Option<JoinHandle<bool>> {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                debug!(key = %key, "No runtime, fetch left to the next read.");
                return None;
            }
        };
        let ticket = self.cache.begin_fetch(&key)?;
        let cache = self.cache.clone();
        let storage = self.storage.clone();
        let span = info_span!("fetch", key = %key);
        Some(runtime.spawn(
            async move {
                let written = match ticket.key.clone() {
                    CacheKey::Task(view) => {
                        let result = load_tasks(storage.as_ref(), &view).await;
                        log_failure(&result);
                        cache.complete_fetch(ticket, result)
                    }
                    CacheKey::List(view) => {
                        let result = load_lists(storage.as_ref(), &view).await;
                        log_failure(&result);
                        cache.complete_fetch(ticket, result)
                    }
                };
                debug!(written, "fetch finished");
                written
            }
            .instrument(span),
        ))
    }

    /// Fetches `key` and waits for the result to land in the cache.
    pub async fn prefetch(&self, key: CacheKey) -> bool {
        match self.spawn_fetch(key) {
            Some(handle) => handle.await.unwrap_or(false),
            None => false,
        }
    }
}

fn log_failure<T: Record>(result: &Result<Vec<T>, StorageError>) {
    if let Err(err) = result {
        warn!(reason = %err, "Unable to fetch view.");
    }
}

async fn load_tasks<S: Storage>(storage: &S, view: &TaskView) -> Result<Vec<Task>, StorageError> {
    match view {
        TaskView::All => storage.tasks(None).await,
        TaskView::ById(id) => storage
            .task(*id)
            .await?
            .map(|task| vec![task])
            .ok_or(StorageError::NotFound(EntityRef::task(*id))),
        TaskView::ByList(list_id) => storage.tasks(Some(*list_id)).await,
        TaskView::ByStatus(status) => storage.tasks_by_status(*status).await,
        TaskView::ByPriority(priority) => storage.tasks_by_priority(*priority).await,
        TaskView::Search(term) => storage.search_tasks(term).await,
        TaskView::Upcoming => storage.upcoming_tasks().await,
        TaskView::Completed => storage.completed_tasks().await,
    }
}

async fn load_lists<S: Storage>(storage: &S, view: &ListView) -> Result<Vec<List>, StorageError> {
    match view {
        ListView::All => storage.lists().await,
        ListView::ById(id) => storage
            .list(*id)
            .await?
            .map(|list| vec![list])
            .ok_or(StorageError::NotFound(EntityRef::list(*id))),
        ListView::Search(term) => storage.search_lists(term).await,
    }
}
