//! Correlation-ID is a per-mutation UUID that tags an optimistic record
//! until storage assigns it a permanent id.

use serde_derive::{Deserialize, Serialize};
use std::convert::TryFrom;
use thiserror::*;
use uuid::{fmt::Hyphenated, Uuid};

/// Token correlating an optimistic record with the mutation that created it
#[derive(Clone, Debug, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generates a fresh random token.
    pub fn new() -> Self {
        CorrelationId(Uuid::new_v4())
    }

    pub fn as_hyphenated(&self) -> Hyphenated {
        self.0.hyphenated()
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CorrelationId {
    fn from(c: Uuid) -> Self {
        CorrelationId(c)
    }
}

impl From<CorrelationId> for Uuid {
    fn from(c: CorrelationId) -> Self {
        c.0
    }
}

/// Parses a correlation-id from its textual form
///
/// # Examples
///
/// ```
/// # use todocache::model::CorrelationId;
/// # use std::convert::TryFrom;
///
/// let cid = CorrelationId::try_from("02497eac-edab-4d96-9f6c-a2c8c1766dee");
/// assert!(cid.is_ok());
/// ```
impl<'a> TryFrom<&'a str> for CorrelationId {
    type Error = InvalidCorrelationId;

    fn try_from(input: &'a str) -> Result<Self, Self::Error> {
        Uuid::parse_str(input)
            .map(CorrelationId)
            .map_err(|_| InvalidCorrelationId::InvalidString(input.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum InvalidCorrelationId {
    #[error("Invalid correlation-id string {0}")]
    InvalidString(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_unique() {
        let a = CorrelationId::new();
        let b = CorrelationId::new();
        assert_ne!(a, b, "two mutations never share a token");
    }

    #[test]
    fn test_parse() {
        let cid = CorrelationId::try_from("b7b054ca-0d37-418b-ab16-ebe8aa409285").unwrap();
        assert_eq!(
            cid.as_hyphenated().to_string(),
            "b7b054ca-0d37-418b-ab16-ebe8aa409285"
        );
        assert!(CorrelationId::try_from("not-a-uuid").is_err());
    }
}
