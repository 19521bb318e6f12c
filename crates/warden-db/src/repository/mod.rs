//! SurrealDB repository implementations.

mod grant;
mod group;
mod permission;
mod principal;
mod record;
mod role;

pub use group::SurrealGroupRepository;
pub use permission::SurrealPermissionRepository;
pub use principal::SurrealPrincipalRepository;
pub use record::SurrealRecordRepository;
pub use role::SurrealRoleRepository;

use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

impl CountRow {
    fn total(rows: &[CountRow]) -> u64 {
        rows.first().map(|r| r.total).unwrap_or(0)
    }
}

fn parse_uuid(entity: &str, raw: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(raw).map_err(|e| DbError::InvalidRow(format!("invalid {entity} UUID: {e}")))
}
