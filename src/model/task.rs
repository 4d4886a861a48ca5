use chrono::{DateTime, NaiveDate, Utc};
use serde_derive::{Deserialize, Serialize};
use std::str::FromStr;

use super::error::ModelError;
use super::{CorrelationId, EntityId};

pub const TASK_NAME_MAX: usize = 100;
pub const TASK_DESCRIPTION_MAX: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(format!("unknown priority: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    InProgress,
    Completed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "in_progress",
            Status::Completed => "completed",
        }
    }

    /// The completion flag that corresponds to this status.
    pub fn is_completed(&self) -> bool {
        *self == Status::Completed
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::Pending
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Status::Pending),
            "in_progress" => Ok(Status::InProgress),
            "completed" => Ok(Status::Completed),
            _ => Err(format!("unknown status: {}", s)),
        }
    }
}

/// Task is a unit of work inside a list.
///
/// `status` is authoritative, `is_completed` is always derived from it.
/// Mutate both through [`Task::set_status`] or [`Task::set_completed`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Task {
    pub id: EntityId,
    pub name: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub status: Status,
    pub is_completed: bool,
    pub due_date: Option<NaiveDate>,
    pub list_id: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Provisional record shown in the cache while storage creates the row.
    pub fn optimistic(token: CorrelationId, item: &NewTask) -> Task {
        Self::from_new(EntityId::Temporary(token), item, None)
    }

    /// Record as persisted by storage, with its assigned id and timestamps.
    pub fn stored(id: i64, item: &NewTask, now: DateTime<Utc>) -> Task {
        Self::from_new(EntityId::Stored(id), item, Some(now))
    }

    fn from_new(id: EntityId, item: &NewTask, now: Option<DateTime<Utc>>) -> Task {
        Self {
            id,
            name: item.name.clone(),
            description: item.description.clone(),
            priority: item.priority,
            status: item.status,
            is_completed: item.status.is_completed(),
            due_date: item.due_date,
            list_id: item.list_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
        self.is_completed = status.is_completed();
    }

    /// Completing moves to `completed`, un-completing a completed task moves
    /// it back to `pending`. Other statuses are left alone when un-completing.
    pub fn set_completed(&mut self, completed: bool) {
        let status = match (completed, self.status) {
            (true, _) => Status::Completed,
            (false, Status::Completed) => Status::Pending,
            (false, other) => other,
        };
        self.set_status(status);
    }

    /// Returns a copy with the patch applied. Timestamps are left to storage.
    pub fn patched(&self, patch: &TaskPatch) -> Task {
        let mut task = self.clone();
        if let Some(name) = &patch.name {
            task.name = name.clone();
        }
        if let Some(description) = &patch.description {
            task.description = description.clone();
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(due_date) = patch.due_date {
            task.due_date = due_date;
        }
        if let Some(list_id) = patch.list_id {
            task.list_id = list_id;
        }
        if let Some(status) = patch.status {
            task.set_status(status);
        }
        task
    }

    /// Due strictly after `today` and not completed yet.
    pub fn is_upcoming(&self, today: NaiveDate) -> bool {
        !self.is_completed && self.due_date.map_or(false, |due| due > today)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NewTask {
    pub name: String,
    pub description: Option<String>,
    pub priority: Priority,
    #[serde(default)]
    pub status: Status,
    pub due_date: Option<NaiveDate>,
    pub list_id: i64,
}

impl NewTask {
    pub fn new<N: Into<String>>(name: N, list_id: i64) -> Self {
        Self {
            name: name.into(),
            description: None,
            priority: Priority::default(),
            status: Status::default(),
            due_date: None,
            list_id,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn with_description<D: Into<String>>(mut self, description: D) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        validate_name(&self.name)?;
        if let Some(description) = &self.description {
            validate_description(description)?;
        }
        Ok(())
    }
}

/// Partial update of a task; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub status: Option<Status>,
    pub due_date: Option<Option<NaiveDate>>,
    pub list_id: Option<i64>,
}

impl TaskPatch {
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(Some(description)) = &self.description {
            validate_description(description)?;
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<(), ModelError> {
    if name.trim().is_empty() {
        return Err(ModelError::NameRequired);
    }
    let actual = name.chars().count();
    if actual > TASK_NAME_MAX {
        return Err(ModelError::NameTooLong {
            max: TASK_NAME_MAX,
            actual,
        });
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), ModelError> {
    let actual = description.chars().count();
    if actual > TASK_DESCRIPTION_MAX {
        return Err(ModelError::DescriptionTooLong {
            max: TASK_DESCRIPTION_MAX,
            actual,
        });
    }
    Ok(())
}

/// Accepts a plain ISO date (`2024-05-01`) or a full RFC 3339 timestamp.
pub fn parse_due_date(input: &str) -> Result<NaiveDate, ModelError> {
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(input).map(|ts| ts.date_naive()))
        .map_err(|_| ModelError::InvalidDueDate(input.to_string()))
}
