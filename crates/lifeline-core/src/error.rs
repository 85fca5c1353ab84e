// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Lifeline safety coordinator.

use thiserror::Error;

/// The primary error type used across all Lifeline mutators, adapters and storage.
///
/// The first six variants form the user-facing taxonomy: they decide whether an
/// intent is rolled back, queued for replay, or surfaced to the caller. The
/// remaining variants cover infrastructure failures.
#[derive(Debug, Error)]
pub enum LifelineError {
    /// A ping was requested in a direction the contact's roles do not allow.
    /// Rejected locally, before any remote call.
    #[error("role violation: {message}")]
    RoleViolation { message: String },

    /// Bad interval, lead time, or other parameter.
    #[error("validation error: {0}")]
    Validation(String),

    /// The remote service could not be reached.
    #[error("connectivity error: {message}")]
    Connectivity {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The server rejected a write as stale; the authoritative value wins.
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// The authenticated session is no longer valid.
    #[error("authorization error: {0}")]
    Authorization(String),

    /// Unclassified remote failure.
    #[error("unknown error: {message}")]
    Unknown {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A referenced contact, ping or record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Local persistence errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LifelineError {
    /// Shorthand for a [`LifelineError::Connectivity`] without a source.
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::Connectivity {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a [`LifelineError::RoleViolation`].
    pub fn role_violation(message: impl Into<String>) -> Self {
        Self::RoleViolation {
            message: message.into(),
        }
    }

    /// Shorthand for a [`LifelineError::NotFound`].
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// Returns `true` when the remote could not be reached at all.
    ///
    /// Timeouts count as connectivity failures: the write may be replayed later.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. } | Self::Timeout { .. })
    }

    /// Returns `true` for failures worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        self.is_connectivity() || matches!(self, Self::Unknown { .. })
    }

    /// Returns `true` when the server rejected the write as stale.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns `true` when the error should be shown to the user verbatim.
    ///
    /// Connectivity and unknown failures degrade to "pending sync" instead.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Self::RoleViolation { .. } | Self::Validation(_) | Self::Authorization(_)
        )
    }
}

impl From<serde_json::Error> for LifelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage {
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_and_timeout_are_connectivity() {
        assert!(LifelineError::connectivity("offline").is_connectivity());
        assert!(
            LifelineError::Timeout {
                duration: std::time::Duration::from_secs(5)
            }
            .is_connectivity()
        );
        assert!(!LifelineError::Authorization("expired".into()).is_connectivity());
    }

    #[test]
    fn unknown_is_retryable_but_conflict_is_not() {
        let unknown = LifelineError::Unknown {
            message: "500".into(),
            source: None,
        };
        assert!(unknown.is_retryable());
        let conflict = LifelineError::Conflict {
            message: "stale".into(),
        };
        assert!(!conflict.is_retryable());
        assert!(conflict.is_conflict());
    }

    #[test]
    fn only_validation_role_and_auth_are_user_visible() {
        assert!(LifelineError::role_violation("dependent cannot ping").is_user_visible());
        assert!(LifelineError::Validation("interval".into()).is_user_visible());
        assert!(LifelineError::Authorization("expired".into()).is_user_visible());
        assert!(!LifelineError::connectivity("offline").is_user_visible());
        assert!(!LifelineError::Internal("bug".into()).is_user_visible());
    }

    #[test]
    fn not_found_formats_entity_and_id() {
        let err = LifelineError::not_found("contact", "c-9");
        assert_eq!(err.to_string(), "contact not found: c-9");
    }
}
