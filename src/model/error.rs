use thiserror::Error;

// Input validation errors, raised before any cache or storage interaction.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ModelError {
    #[error("name is required.")]
    NameRequired,
    #[error("name is too long: {actual} characters, at most {max} allowed.")]
    NameTooLong { max: usize, actual: usize },
    #[error("description is too long: {actual} characters, at most {max} allowed.")]
    DescriptionTooLong { max: usize, actual: usize },
    #[error("invalid due date {0:?}, expecting YYYY-MM-DD.")]
    InvalidDueDate(String),
}
