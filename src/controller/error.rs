use thiserror::Error;

use crate::datastore::StorageError;
use crate::model::{EntityRef, ModelError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControllerError {
    #[error("invalid input: {0}")]
    Validation(#[from] ModelError),

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("{0} has a change in flight")]
    Busy(EntityRef),

    #[error("{0} is not cached")]
    NotFound(EntityRef),
}

impl ControllerError {
    /// The same mutation may succeed if issued again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ControllerError::Storage(_) | ControllerError::Busy(_))
    }
}
