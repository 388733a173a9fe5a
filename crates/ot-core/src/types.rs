//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },
}

/// A validated user identifier.
///
/// User IDs are opaque non-empty strings handed over by the transport (a chat
/// id, a CLI `--user` value). Uniqueness per end user is the transport's job;
/// the storage layer enforces it with a primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Creates a new ID after validation.
    ///
    /// Surrounding whitespace is trimmed before the emptiness check.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty { field: "user ID" });
        }
        if trimmed.len() == id.len() {
            return Ok(Self(id));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_rejects_empty_and_blank() {
        assert_eq!(
            UserId::new(""),
            Err(ValidationError::Empty { field: "user ID" })
        );
        assert!(UserId::new("   ").is_err());
    }

    #[test]
    fn user_id_trims_whitespace() {
        let id = UserId::new("  12345 ").unwrap();
        assert_eq!(id.as_str(), "12345");
    }

    #[test]
    fn user_id_deserialization_validates() {
        let parsed: Result<UserId, _> = serde_json::from_str(r#""""#);
        assert!(parsed.is_err());

        let parsed: UserId = serde_json::from_str(r#""rider-1""#).unwrap();
        assert_eq!(parsed.to_string(), "rider-1");
    }
}
