pub mod correlation_id;
pub mod error;
pub mod id;
pub mod list;
pub mod task;
pub mod validation;

pub use correlation_id::CorrelationId;
pub use error::ModelError;
pub use id::{EntityId, EntityKind, EntityRef};
pub use list::{List, ListPatch, NewList};
pub use task::{parse_due_date, NewTask, Priority, Status, Task, TaskPatch};
