use crate::model::{EntityKind, Priority, Status};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskView {
    All,
    ById(i64),
    ByList(i64),
    ByStatus(Status),
    ByPriority(Priority),
    Search(String),
    Upcoming,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListView {
    All,
    ById(i64),
    Search(String),
}

/// Address of a cached query result: entity kind, view and its parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Task(TaskView),
    List(ListView),
}

/// A view without its parameter, e.g. "every `ByStatus` view".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewClass {
    All,
    ById,
    ByList,
    ByStatus,
    ByPriority,
    Search,
    Upcoming,
    Completed,
}

impl CacheKey {
    pub fn by_id(kind: EntityKind, id: i64) -> Self {
        match kind {
            EntityKind::Task => CacheKey::Task(TaskView::ById(id)),
            EntityKind::List => CacheKey::List(ListView::ById(id)),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            CacheKey::Task(_) => EntityKind::Task,
            CacheKey::List(_) => EntityKind::List,
        }
    }

    pub fn class(&self) -> ViewClass {
        match self {
            CacheKey::Task(view) => match view {
                TaskView::All => ViewClass::All,
                TaskView::ById(_) => ViewClass::ById,
                TaskView::ByList(_) => ViewClass::ByList,
                TaskView::ByStatus(_) => ViewClass::ByStatus,
                TaskView::ByPriority(_) => ViewClass::ByPriority,
                TaskView::Search(_) => ViewClass::Search,
                TaskView::Upcoming => ViewClass::Upcoming,
                TaskView::Completed => ViewClass::Completed,
            },
            CacheKey::List(view) => match view {
                ListView::All => ViewClass::All,
                ListView::ById(_) => ViewClass::ById,
                ListView::Search(_) => ViewClass::Search,
            },
        }
    }

    /// Views whose membership or order is computed by storage; an optimistic
    /// patch only approximates them, so they are refetched after every write.
    pub fn is_derived(&self) -> bool {
        matches!(
            self.class(),
            ViewClass::Search | ViewClass::Upcoming | ViewClass::Completed
        )
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Task(view) => match view {
                TaskView::All => write!(f, "task/all"),
                TaskView::ById(id) => write!(f, "task/byId/{}", id),
                TaskView::ByList(id) => write!(f, "task/byList/{}", id),
                TaskView::ByStatus(status) => write!(f, "task/byStatus/{}", status),
                TaskView::ByPriority(priority) => write!(f, "task/byPriority/{}", priority),
                TaskView::Search(term) => write!(f, "task/search/{:?}", term),
                TaskView::Upcoming => write!(f, "task/upcoming"),
                TaskView::Completed => write!(f, "task/completed"),
            },
            CacheKey::List(view) => match view {
                ListView::All => write!(f, "list/all"),
                ListView::ById(id) => write!(f, "list/byId/{}", id),
                ListView::Search(term) => write!(f, "list/search/{:?}", term),
            },
        }
    }
}

pub trait KeyPredicate {
    fn matches(&self, key: &CacheKey) -> bool;
}

impl<F> KeyPredicate for F
where
    F: Fn(&CacheKey) -> bool,
{
    fn matches(&self, key: &CacheKey) -> bool {
        self(key)
    }
}

/// Statically expressible key predicate; `None` matches anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyPattern {
    pub kind: Option<EntityKind>,
    pub class: Option<ViewClass>,
}

impl KeyPattern {
    pub fn any() -> Self {
        Self::default()
    }

    /// Every view of one entity kind.
    pub fn kind(kind: EntityKind) -> Self {
        Self {
            kind: Some(kind),
            class: None,
        }
    }

    /// Every parameter value of one view, e.g. all `ByList` task views.
    pub fn view(kind: EntityKind, class: ViewClass) -> Self {
        Self {
            kind: Some(kind),
            class: Some(class),
        }
    }
}

impl KeyPredicate for KeyPattern {
    fn matches(&self, key: &CacheKey) -> bool {
        self.kind.map_or(true, |kind| key.kind() == kind)
            && self.class.map_or(true, |class| key.class() == class)
    }
}
