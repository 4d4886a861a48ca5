use thiserror::*;

use crate::model::EntityRef;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("the item not found {0}")]
    NotFound(EntityRef),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
