//! Error types for the Warden system.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WardenError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    /// Expected denial; mapped to a 403-class response by callers.
    #[error("Authorization denied: {reason}")]
    AuthorizationDenied { reason: String },

    /// Unresolvable template or unknown permission/role reference.
    /// Fatal: surfaced at startup or as a 5xx, never silently ignored.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WardenError {
    /// Collapse `NotFound` into a denial for credential-adjacent paths
    /// where the existence of a principal or record must not leak.
    pub fn conceal_not_found(self, reason: &str) -> Self {
        match self {
            WardenError::NotFound { .. } => WardenError::AuthorizationDenied {
                reason: reason.into(),
            },
            other => other,
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, WardenError::AuthorizationDenied { .. })
    }
}

pub type WardenResult<T> = Result<T, WardenError>;
