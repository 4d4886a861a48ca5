use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};

use super::error::ModelError;
use super::{CorrelationId, EntityId};

pub const LIST_NAME_MAX: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct List {
    pub id: EntityId,
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl List {
    pub fn optimistic(token: CorrelationId, item: &NewList) -> List {
        Self {
            id: EntityId::Temporary(token),
            name: item.name.clone(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn stored(id: i64, item: &NewList, now: DateTime<Utc>) -> List {
        Self {
            id: EntityId::Stored(id),
            name: item.name.clone(),
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    pub fn patched(&self, patch: &ListPatch) -> List {
        let mut list = self.clone();
        if let Some(name) = &patch.name {
            list.name = name.clone();
        }
        list
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NewList {
    pub name: String,
}

impl NewList {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self { name: name.into() }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        validate_name(&self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ListPatch {
    pub name: Option<String>,
}

impl ListPatch {
    pub fn rename<N: Into<String>>(name: N) -> Self {
        Self {
            name: Some(name.into()),
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        match &self.name {
            Some(name) => validate_name(name),
            None => Ok(()),
        }
    }
}

fn validate_name(name: &str) -> Result<(), ModelError> {
    if name.trim().is_empty() {
        return Err(ModelError::NameRequired);
    }
    let actual = name.chars().count();
    if actual > LIST_NAME_MAX {
        return Err(ModelError::NameTooLong {
            max: LIST_NAME_MAX,
            actual,
        });
    }
    Ok(())
}
