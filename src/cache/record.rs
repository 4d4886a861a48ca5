use chrono::NaiveDate;

use super::key::{CacheKey, ListView, TaskView};
use crate::model::{EntityId, EntityKind, List, Task};

/// Concrete content of a cache entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Records {
    Tasks(Vec<Task>),
    Lists(Vec<List>),
}

impl Records {
    pub fn len(&self) -> usize {
        match self {
            Records::Tasks(tasks) => tasks.len(),
            Records::Lists(lists) => lists.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An entity that can live in cache views.
pub trait Record: Clone + PartialEq + std::fmt::Debug + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> EntityId;

    /// Whether a view of `key` would contain this record.
    fn admitted_by(&self, key: &CacheKey, today: NaiveDate) -> bool;

    fn into_records(items: Vec<Self>) -> Records;

    fn from_records(records: &Records) -> Option<&[Self]>;

    fn take_records(records: Records) -> Option<Vec<Self>>;
}

impl Record for Task {
    const KIND: EntityKind = EntityKind::Task;

    fn id(&self) -> EntityId {
        self.id
    }

    fn admitted_by(&self, key: &CacheKey, today: NaiveDate) -> bool {
        let view = match key {
            CacheKey::Task(view) => view,
            CacheKey::List(_) => return false,
        };
        match view {
            TaskView::All => true,
            TaskView::ById(id) => self.id == EntityId::Stored(*id),
            TaskView::ByList(id) => self.list_id == *id,
            TaskView::ByStatus(status) => self.status == *status,
            TaskView::ByPriority(priority) => self.priority == *priority,
            TaskView::Search(term) => self.name.contains(term.as_str()),
            TaskView::Upcoming => self.is_upcoming(today),
            TaskView::Completed => self.is_completed,
        }
    }

    fn into_records(items: Vec<Self>) -> Records {
        Records::Tasks(items)
    }

    fn from_records(records: &Records) -> Option<&[Self]> {
        match records {
            Records::Tasks(tasks) => Some(tasks.as_slice()),
            Records::Lists(_) => None,
        }
    }

    fn take_records(records: Records) -> Option<Vec<Self>> {
        match records {
            Records::Tasks(tasks) => Some(tasks),
            Records::Lists(_) => None,
        }
    }
}

impl Record for List {
    const KIND: EntityKind = EntityKind::List;

    fn id(&self) -> EntityId {
        self.id
    }

    fn admitted_by(&self, key: &CacheKey, _today: NaiveDate) -> bool {
        match key {
            CacheKey::List(ListView::All) => true,
            CacheKey::List(ListView::ById(id)) => self.id == EntityId::Stored(*id),
            CacheKey::List(ListView::Search(term)) => self.name.contains(term.as_str()),
            CacheKey::Task(_) => false,
        }
    }

    fn into_records(items: Vec<Self>) -> Records {
        Records::Lists(items)
    }

    fn from_records(records: &Records) -> Option<&[Self]> {
        match records {
            Records::Lists(lists) => Some(lists.as_slice()),
            Records::Tasks(_) => None,
        }
    }

    fn take_records(records: Records) -> Option<Vec<Self>> {
        match records {
            Records::Lists(lists) => Some(lists),
            Records::Tasks(_) => None,
        }
    }
}
