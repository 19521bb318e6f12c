//! Authorization error types.

use thiserror::Error;
use warden_core::error::WardenError;

/// Engine-local error. Denial messages are deliberately generic so a
/// caller probing routes cannot enumerate the required scope set.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthzError {
    #[error("insufficient scope")]
    InsufficientScope,

    #[error("insufficient rank")]
    InsufficientRank,

    #[error("insufficient record scope")]
    InsufficientRecordScope,

    #[error("assignment forbidden")]
    AssignmentForbidden,

    #[error("no authorized targets")]
    EmptyBulkTarget,

    #[error("too many bulk targets: {count} exceeds {max}")]
    TooManyTargets { count: usize, max: usize },

    #[error("unresolved scope placeholder: {path}")]
    UnresolvedPlaceholder { path: String },

    #[error("invalid scope token {token:?}: {reason}")]
    InvalidTemplate { token: String, reason: String },

    #[error("unknown permission: {name}")]
    UnknownPermission { name: String },

    #[error("unknown role: {name}")]
    UnknownRole { name: String },
}

impl AuthzError {
    /// Expected denials (403-class) as opposed to configuration faults.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            AuthzError::InsufficientScope
                | AuthzError::InsufficientRank
                | AuthzError::InsufficientRecordScope
                | AuthzError::AssignmentForbidden
                | AuthzError::EmptyBulkTarget
        )
    }
}

impl From<AuthzError> for WardenError {
    fn from(err: AuthzError) -> Self {
        match err {
            e if e.is_denial() => WardenError::AuthorizationDenied {
                reason: e.to_string(),
            },
            e @ AuthzError::TooManyTargets { .. } => WardenError::Validation {
                message: e.to_string(),
            },
            e => WardenError::Configuration(e.to_string()),
        }
    }
}
