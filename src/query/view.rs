use std::marker::PhantomData;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::trace;

use super::client::QueryClient;
use crate::cache::{CacheEvent, CacheKey, EntryStatus, Record};
use crate::datastore::{Storage, StorageError};

/// What a view shows right now.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
    /// Disabled view, e.g. a search without a term.
    Idle,
    Loading,
    Error(StorageError),
    Data(Vec<T>),
}

impl<T> QueryState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, QueryState::Loading)
    }

    pub fn data(&self) -> Option<&[T]> {
        match self {
            QueryState::Data(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn into_data(self) -> Option<Vec<T>> {
        match self {
            QueryState::Data(items) => Some(items),
            _ => None,
        }
    }
}

/// Live handle on one cache key.
///
/// The handle counts as an observer of its key while it lives, so the key is
/// refetched when invalidated and a fetch still pending when the last handle
/// goes away is discarded.
pub struct ViewQuery<T: Record, S: Storage> {
    client: QueryClient<S>,
    key: CacheKey,
    enabled: bool,
    events: broadcast::Receiver<CacheEvent>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record, S: Storage> ViewQuery<T, S> {
    pub(super) fn new(client: QueryClient<S>, key: CacheKey, enabled: bool) -> Self {
        debug_assert_eq!(key.kind(), T::KIND);
        // subscribe before the first read so no change slips in between
        let events = client.cache().subscribe();
        if enabled {
            client.cache().observe(&key);
        }
        Self {
            client,
            key,
            enabled,
            events,
            _record: PhantomData,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Reads the cached value, starting a fetch when the key is absent or
    /// stale. Reading a fresh entry never touches storage.
    pub fn state(&self) -> QueryState<T> {
        if !self.enabled {
            return QueryState::Idle;
        }
        let cache = self.client.cache();
        if cache.needs_fetch(&self.key) {
            self.client.spawn_fetch(self.key.clone());
        }
        if let Some(items) = cache.get::<T>(&self.key) {
            return QueryState::Data(items);
        }
        match cache.status(&self.key) {
            EntryStatus::Failed => cache
                .error(&self.key)
                .map_or(QueryState::Loading, QueryState::Error),
            _ => QueryState::Loading,
        }
    }

    /// Waits for the next change of this key. Returns `false` once the cache
    /// is gone.
    pub async fn changed(&mut self) -> bool {
        loop {
            match self.events.recv().await {
                Ok(event) if event.key == self.key => return true,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    trace!(skipped, key = %self.key, "cache events lagged");
                    return true;
                }
                Err(RecvError::Closed) => return false,
            }
        }
    }

    /// Waits until the view is no longer loading.
    pub async fn settled(&mut self) -> QueryState<T> {
        loop {
            let state = self.state();
            if !state.is_loading() || !self.changed().await {
                return state;
            }
        }
    }
}

impl<T: Record, S: Storage> Drop for ViewQuery<T, S> {
    fn drop(&mut self) {
        if self.enabled {
            self.client.cache().unobserve(&self.key);
        }
    }
}

/// A view whose parameter follows user input.
///
/// Changing the term swaps the underlying view; a fetch for the old term that
/// is still running is discarded and never written under the new key.
pub struct SearchQuery<T: Record, S: Storage> {
    key_for: fn(String) -> CacheKey,
    term: String,
    current: ViewQuery<T, S>,
}

impl<T: Record, S: Storage> SearchQuery<T, S> {
    pub(super) fn new(client: QueryClient<S>, term: &str, key_for: fn(String) -> CacheKey) -> Self {
        let current = ViewQuery::new(client, key_for(term.to_owned()), !term.is_empty());
        Self {
            key_for,
            term: term.to_owned(),
            current,
        }
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn set_term(&mut self, term: &str) {
        if term == self.term {
            return;
        }
        let client = self.current.client.clone();
        let next = ViewQuery::new(client, (self.key_for)(term.to_owned()), !term.is_empty());
        // the old view unobserves its key when dropped here
        self.current = next;
        self.term = term.to_owned();
    }

    pub fn view(&self) -> &ViewQuery<T, S> {
        &self.current
    }

    pub fn state(&self) -> QueryState<T> {
        self.current.state()
    }

    pub async fn settled(&mut self) -> QueryState<T> {
        self.current.settled().await
    }
}
