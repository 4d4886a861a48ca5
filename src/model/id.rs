use serde_derive::{Deserialize, Serialize};

use super::CorrelationId;

/// Identity of a record as seen by the cache.
///
/// Records created optimistically carry the token of the mutation that
/// created them until storage confirms a permanent id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityId {
    Temporary(CorrelationId),
    Stored(i64),
}

impl EntityId {
    pub fn stored(&self) -> Option<i64> {
        match self {
            EntityId::Stored(id) => Some(*id),
            EntityId::Temporary(_) => None,
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, EntityId::Temporary(_))
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityId::Temporary(cid) => write!(f, "tmp:{}", cid),
            EntityId::Stored(id) => write!(f, "{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Task,
    List,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Task => f.write_str("task"),
            EntityKind::List => f.write_str("list"),
        }
    }
}

/// A stored entity of a given kind, used to mark mutations in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: i64,
}

impl EntityRef {
    pub fn task(id: i64) -> Self {
        Self {
            kind: EntityKind::Task,
            id,
        }
    }

    pub fn list(id: i64) -> Self {
        Self {
            kind: EntityKind::List,
            id,
        }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}
