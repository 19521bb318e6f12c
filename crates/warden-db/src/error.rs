//! Database-specific error types and conversions.

use warden_core::error::WardenError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    /// A stored row could not be mapped back to its domain type.
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// A table or field name that cannot be spliced into a query.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
}

impl From<DbError> for WardenError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => WardenError::NotFound { entity, id },
            DbError::InvalidIdentifier(name) => {
                WardenError::Configuration(format!("invalid identifier: {name}"))
            }
            other => WardenError::Database(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_keeps_entity_and_id() {
        let err: WardenError = DbError::NotFound {
            entity: "role".into(),
            id: "admin".into(),
        }
        .into();
        assert!(matches!(
            err,
            WardenError::NotFound { ref entity, ref id } if entity == "role" && id == "admin"
        ));
    }

    #[test]
    fn other_errors_become_database_errors() {
        let err: WardenError = DbError::InvalidRow("bad uuid".into()).into();
        assert!(matches!(err, WardenError::Database(msg) if msg.contains("bad uuid")));
    }
}
