use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::key::{CacheKey, KeyPredicate, ViewClass};
use super::record::{Record, Records};
use crate::config::EVENT_CAPACITY;
use crate::datastore::StorageError;

#[derive(Debug, Default)]
struct Entry {
    data: Option<Records>,
    stale: bool,
    fetching: bool,
    error: Option<StorageError>,
    // bumped to orphan an in-flight fetch
    generation: u64,
    // bumped on every write of `data`
    revision: u64,
    observers: usize,
}

impl Entry {
    fn status(&self) -> EntryStatus {
        match (&self.data, self.fetching, &self.error) {
            (Some(_), _, _) if self.stale => EntryStatus::Stale,
            (Some(_), _, _) => EntryStatus::Fresh,
            (None, true, _) => EntryStatus::Pending,
            (None, false, Some(_)) => EntryStatus::Failed,
            (None, false, None) => EntryStatus::Absent,
        }
    }

    fn is_idle(&self) -> bool {
        self.data.is_none() && !self.fetching && self.observers == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Nothing cached and no fetch running.
    Absent,
    /// First fetch in flight.
    Pending,
    Fresh,
    /// Data present but due for a refetch.
    Stale,
    /// Last fetch failed and nothing is cached.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Updated,
    Invalidated,
    Removed,
    Fetching,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
    pub key: CacheKey,
    pub change: Change,
}

/// Exact copy of one entry, used to roll a mutation back.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySnapshot {
    pub key: CacheKey,
    pub data: Option<Records>,
    pub stale: bool,
}

/// Permission to write a fetch result; void once the entry's generation moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub key: CacheKey,
    generation: u64,
}

type Overlay = Box<dyn Fn(&CacheKey, &mut Records) -> bool + Send + Sync>;

/// Handle of an edit kept on top of fetch results, see [`CacheStore::pin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinId(u64);

struct Pin {
    overlay: Overlay,
    // keys whose fetch results the overlay changed
    applied: Vec<CacheKey>,
}

#[derive(Default)]
struct Pins {
    next: u64,
    active: BTreeMap<u64, Pin>,
}

impl Pins {
    fn apply(&mut self, key: &CacheKey, records: &mut Records) {
        for pin in self.active.values_mut() {
            if (pin.overlay)(key, records) && !pin.applied.contains(key) {
                pin.applied.push(key.clone());
            }
        }
    }
}

/// Keyed query results shared by the query hooks and the mutation coordinator.
///
/// Every method takes the lock for its whole duration, so a reader never
/// observes a half-applied write. Subscribers are notified once the lock is
/// released.
pub struct CacheStore {
    entries: Mutex<HashMap<CacheKey, Entry>>,
    // lock order: `entries` before `pins`
    pins: Mutex<Pins>,
    events: broadcast::Sender<CacheEvent>,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(EVENT_CAPACITY)
    }
}

impl CacheStore {
    pub fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            entries: Mutex::new(HashMap::new()),
            pins: Mutex::new(Pins::default()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    fn write<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut HashMap<CacheKey, Entry>, &mut Vec<CacheEvent>) -> R,
    {
        let mut events = vec![];
        let res = {
            let mut entries = self.entries.lock();
            f(&mut entries, &mut events)
        };
        for event in events {
            if self.events.send(event).is_err() {
                trace!("no subscribers for cache event");
            }
        }
        res
    }

    pub fn get<T: Record>(&self, key: &CacheKey) -> Option<Vec<T>> {
        let entries = self.entries.lock();
        entries
            .get(key)
            .and_then(|entry| entry.data.as_ref())
            .and_then(T::from_records)
            .map(|items| items.to_vec())
    }

    pub fn status(&self, key: &CacheKey) -> EntryStatus {
        self.entries
            .lock()
            .get(key)
            .map_or(EntryStatus::Absent, Entry::status)
    }

    pub fn error(&self, key: &CacheKey) -> Option<StorageError> {
        self.entries
            .lock()
            .get(key)
            .and_then(|entry| entry.error.clone())
    }

    /// No fetch running, and either nothing was ever loaded or the entry was
    /// invalidated.
    pub fn needs_fetch(&self, key: &CacheKey) -> bool {
        self.entries.lock().get(key).map_or(true, |entry| {
            !entry.fetching && (entry.stale || (entry.data.is_none() && entry.error.is_none()))
        })
    }

    pub fn revision(&self, key: &CacheKey) -> u64 {
        self.entries
            .lock()
            .get(key)
            .map_or(0, |entry| entry.revision)
    }

    /// Keys of the entries currently holding data.
    pub fn cached_keys<P: KeyPredicate>(&self, predicate: P) -> Vec<CacheKey> {
        self.entries
            .lock()
            .iter()
            .filter(|(key, entry)| entry.data.is_some() && predicate.matches(key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Full replace.
    pub fn set<T: Record>(&self, key: &CacheKey, items: Vec<T>) {
        debug_assert_eq!(key.kind(), T::KIND);
        self.write(|entries, events| {
            let entry = entries.entry(key.clone()).or_default();
            entry.data = Some(T::into_records(items));
            entry.stale = false;
            entry.error = None;
            entry.revision += 1;
            events.push(CacheEvent {
                key: key.clone(),
                change: Change::Updated,
            });
        })
    }

    /// Read-modify-write of one entry; an absent entry is handed over as an
    /// empty sequence.
    pub fn update<T, R, F>(&self, key: &CacheKey, f: F) -> R
    where
        T: Record,
        F: FnOnce(&mut Vec<T>) -> R,
    {
        debug_assert_eq!(key.kind(), T::KIND);
        self.write(|entries, events| {
            let entry = entries.entry(key.clone()).or_default();
            let mut items = entry
                .data
                .take()
                .and_then(T::take_records)
                .unwrap_or_default();
            let res = f(&mut items);
            entry.data = Some(T::into_records(items));
            entry.revision += 1;
            events.push(CacheEvent {
                key: key.clone(),
                change: Change::Updated,
            });
            res
        })
    }

    /// Read-modify-write of one entry that reports the entry as it was before
    /// and its revision after the write. When `f` returns `false` nothing is
    /// written and `None` is returned.
    pub fn patch<T, F>(&self, key: &CacheKey, f: F) -> Option<(EntrySnapshot, u64)>
    where
        T: Record,
        F: FnOnce(&mut Vec<T>) -> bool,
    {
        debug_assert_eq!(key.kind(), T::KIND);
        self.write(|entries, events| {
            let entry = entries.entry(key.clone()).or_default();
            let snapshot = EntrySnapshot {
                key: key.clone(),
                data: entry.data.clone(),
                stale: entry.stale,
            };
            let mut items = entry
                .data
                .as_ref()
                .and_then(T::from_records)
                .map(<[T]>::to_vec)
                .unwrap_or_default();
            if !f(&mut items) {
                if entry.is_idle() {
                    entries.remove(key);
                }
                return None;
            }
            entry.data = Some(T::into_records(items));
            entry.revision += 1;
            let revision = entry.revision;
            events.push(CacheEvent {
                key: key.clone(),
                change: Change::Updated,
            });
            Some((snapshot, revision))
        })
    }

    /// Applies `f` to every entry holding data whose key matches.
    pub fn update_many<T, P, F>(&self, predicate: P, mut f: F) -> Vec<CacheKey>
    where
        T: Record,
        P: KeyPredicate,
        F: FnMut(&CacheKey, &mut Vec<T>),
    {
        self.write(|entries, events| {
            let mut touched = vec![];
            for (key, entry) in entries.iter_mut() {
                if key.kind() != T::KIND || entry.data.is_none() || !predicate.matches(key) {
                    continue;
                }
                let mut items = entry
                    .data
                    .take()
                    .and_then(T::take_records)
                    .unwrap_or_default();
                f(key, &mut items);
                entry.data = Some(T::into_records(items));
                entry.revision += 1;
                events.push(CacheEvent {
                    key: key.clone(),
                    change: Change::Updated,
                });
                touched.push(key.clone());
            }
            touched
        })
    }

    /// Marks matching entries stale so their next read refetches. Returns the
    /// keys that are currently observed.
    pub fn invalidate<P: KeyPredicate>(&self, predicate: P) -> Vec<CacheKey> {
        self.write(|entries, events| {
            let mut observed = vec![];
            for (key, entry) in entries.iter_mut() {
                if !predicate.matches(key) {
                    continue;
                }
                entry.stale = true;
                if entry.observers > 0 {
                    observed.push(key.clone());
                }
                events.push(CacheEvent {
                    key: key.clone(),
                    change: Change::Invalidated,
                });
            }
            debug!(observed = observed.len(), "cache entries invalidated");
            observed
        })
    }

    /// Drops the cached data of one entry and orphans its running fetch.
    pub fn remove(&self, key: &CacheKey) {
        self.write(|entries, events| {
            let idle = match entries.get_mut(key) {
                Some(entry) => {
                    entry.data = None;
                    entry.stale = false;
                    entry.error = None;
                    entry.fetching = false;
                    entry.generation += 1;
                    entry.revision += 1;
                    entry.is_idle()
                }
                None => return,
            };
            if idle {
                entries.remove(key);
            }
            events.push(CacheEvent {
                key: key.clone(),
                change: Change::Removed,
            });
        })
    }

    pub fn snapshot(&self, key: &CacheKey) -> EntrySnapshot {
        let entries = self.entries.lock();
        let entry = entries.get(key);
        EntrySnapshot {
            key: key.clone(),
            data: entry.and_then(|e| e.data.clone()),
            stale: entry.map_or(false, |e| e.stale),
        }
    }

    pub fn restore(&self, snapshot: EntrySnapshot) {
        self.write(|entries, events| restore_entry(entries, events, snapshot))
    }

    /// Restores `snapshot` only if nothing was written to the entry since it
    /// reached `revision`.
    pub fn restore_if_unchanged(&self, snapshot: EntrySnapshot, revision: u64) -> bool {
        self.write(|entries, events| {
            let current = entries.get(&snapshot.key).map_or(0, |entry| entry.revision);
            if current != revision {
                return false;
            }
            restore_entry(entries, events, snapshot);
            true
        })
    }

    /// Starts a fetch for `key`, or returns `None` while one is running.
    pub fn begin_fetch(&self, key: &CacheKey) -> Option<FetchTicket> {
        self.write(|entries, events| {
            let entry = entries.entry(key.clone()).or_default();
            if entry.fetching {
                return None;
            }
            entry.fetching = true;
            events.push(CacheEvent {
                key: key.clone(),
                change: Change::Fetching,
            });
            Some(FetchTicket {
                key: key.clone(),
                generation: entry.generation,
            })
        })
    }

    /// Writes a fetch result under the ticket's key. Results of orphaned
    /// fetches are dropped and `false` is returned.
    pub fn complete_fetch<T: Record>(
        &self,
        ticket: FetchTicket,
        result: Result<Vec<T>, StorageError>,
    ) -> bool {
        debug_assert_eq!(ticket.key.kind(), T::KIND);
        self.write(|entries, events| {
            let entry = match entries.get_mut(&ticket.key) {
                Some(entry) if entry.generation == ticket.generation && entry.fetching => entry,
                _ => {
                    debug!(key = %ticket.key, "Discarding result of a cancelled fetch.");
                    return false;
                }
            };
            entry.fetching = false;
            let change = match result {
                Ok(items) => {
                    let mut records = T::into_records(items);
                    self.pins.lock().apply(&ticket.key, &mut records);
                    entry.data = Some(records);
                    entry.stale = false;
                    entry.error = None;
                    entry.revision += 1;
                    Change::Updated
                }
                Err(err) => {
                    entry.error = Some(err);
                    entry.stale = false;
                    Change::Failed
                }
            };
            events.push(CacheEvent {
                key: ticket.key,
                change,
            });
            true
        })
    }

    /// Orphans every running fetch of the matching entries and marks them
    /// stale.
    pub fn cancel_fetches<P: KeyPredicate>(&self, predicate: P) -> Vec<CacheKey> {
        self.write(|entries, events| {
            let mut cancelled = vec![];
            for (key, entry) in entries.iter_mut() {
                if !entry.fetching || !predicate.matches(key) {
                    continue;
                }
                entry.fetching = false;
                entry.generation += 1;
                entry.stale = true;
                cancelled.push(key.clone());
                events.push(CacheEvent {
                    key: key.clone(),
                    change: Change::Invalidated,
                });
            }
            cancelled
        })
    }

    /// Applies `f` to every fetch result of a `T` view written until the pin
    /// is released with [`CacheStore::unpin`]. `f` reports whether it changed
    /// anything.
    pub fn pin<T, F>(&self, f: F) -> PinId
    where
        T: Record,
        F: Fn(&CacheKey, &mut Vec<T>) -> bool + Send + Sync + 'static,
    {
        let overlay: Overlay = Box::new(move |key: &CacheKey, records: &mut Records| {
            if key.kind() != T::KIND {
                return false;
            }
            let mut items = match T::from_records(records) {
                Some(items) => items.to_vec(),
                None => return false,
            };
            if !f(key, &mut items) {
                return false;
            }
            *records = T::into_records(items);
            true
        });
        let mut pins = self.pins.lock();
        pins.next += 1;
        let id = pins.next;
        pins.active.insert(
            id,
            Pin {
                overlay,
                applied: vec![],
            },
        );
        PinId(id)
    }

    /// Releases a pin and returns the keys whose fetch results it changed.
    pub fn unpin(&self, pin: PinId) -> Vec<CacheKey> {
        self.pins
            .lock()
            .active
            .remove(&pin.0)
            .map(|pin| pin.applied)
            .unwrap_or_default()
    }

    pub fn observe(&self, key: &CacheKey) {
        self.entries
            .lock()
            .entry(key.clone())
            .or_default()
            .observers += 1;
    }

    /// Drops one observer. When the last observer of an entry without data
    /// leaves, its running fetch is orphaned so the late result is dropped.
    /// Search entries are evicted as soon as nobody observes them.
    pub fn unobserve(&self, key: &CacheKey) {
        let mut entries = self.entries.lock();
        let evict = match entries.get_mut(key) {
            Some(entry) => {
                entry.observers = entry.observers.saturating_sub(1);
                if entry.observers == 0 && entry.fetching && entry.data.is_none() {
                    entry.fetching = false;
                    entry.generation += 1;
                }
                entry.is_idle() || (entry.observers == 0 && key.class() == ViewClass::Search)
            }
            None => false,
        };
        if evict {
            trace!(key = %key, "cache entry evicted");
            entries.remove(key);
        }
    }

    pub fn is_observed(&self, key: &CacheKey) -> bool {
        self.entries
            .lock()
            .get(key)
            .map_or(false, |entry| entry.observers > 0)
    }
}

fn restore_entry(
    entries: &mut HashMap<CacheKey, Entry>,
    events: &mut Vec<CacheEvent>,
    snapshot: EntrySnapshot,
) {
    let entry = entries.entry(snapshot.key.clone()).or_default();
    let change = if snapshot.data.is_some() {
        Change::Updated
    } else {
        Change::Removed
    };
    entry.data = snapshot.data;
    entry.stale = snapshot.stale;
    entry.revision += 1;
    if entry.is_idle() {
        entries.remove(&snapshot.key);
    }
    events.push(CacheEvent {
        key: snapshot.key,
        change,
    });
}
