mod key;
mod record;
mod store;

pub use key::{CacheKey, KeyPattern, KeyPredicate, ListView, TaskView, ViewClass};
pub use record::{Record, Records};
pub use store::{CacheEvent, CacheStore, Change, EntrySnapshot, EntryStatus, FetchTicket, PinId};
