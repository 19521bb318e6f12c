//! SurrealDB implementation of [`RoleRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::permission::{Grant, PermissionState};
use warden_core::models::role::{CreateRole, Role};
use warden_core::repository::RoleRepository;

use super::grant::{self, Grantor};
use super::parse_uuid;
use crate::error::DbError;

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct RoleRow {
    name: String,
    rank: i64,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct RoleRowWithId {
    record_id: String,
    name: String,
    rank: i64,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RoleRowWithId {
    fn try_into_role(self) -> Result<Role, DbError> {
        Ok(Role {
            id: parse_uuid("role", &self.record_id)?,
            name: self.name,
            rank: self.rank,
            description: self.description,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Load one role by id. Shared with the principal repository.
pub(crate) async fn fetch_role<C: Connection>(db: &Surreal<C>, id: Uuid) -> Result<Role, DbError> {
    let id_str = id.to_string();

    let mut result = db
        .query("SELECT meta::id(id) AS record_id, * FROM type::record('role', $id)")
        .bind(("id", id_str.clone()))
        .await?;

    let rows: Vec<RoleRowWithId> = result.take(0)?;
    rows.into_iter()
        .next()
        .ok_or(DbError::NotFound {
            entity: "role".into(),
            id: id_str,
        })?
        .try_into_role()
}

/// SurrealDB implementation of the Role repository.
#[derive(Clone)]
pub struct SurrealRoleRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealRoleRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> RoleRepository for SurrealRoleRepository<C> {
    async fn create(&self, input: CreateRole) -> WardenResult<Role> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('role', $id) SET \
                 name = $name, rank = $rank, description = $description",
            )
            .bind(("id", id_str.clone()))
            .bind(("name", input.name))
            .bind(("rank", input.rank))
            .bind(("description", input.description))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<RoleRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "role".into(),
            id: id_str,
        })?;

        Ok(Role {
            id,
            name: row.name,
            rank: row.rank,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<Role> {
        Ok(fetch_role(&self.db, id).await?)
    }

    async fn get_by_name(&self, name: &str) -> WardenResult<Role> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM role WHERE name = $name LIMIT 1")
            .bind(("name", name.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RoleRowWithId> = result.take(0).map_err(DbError::from)?;
        let role = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::NotFound {
                entity: "role".into(),
                id: name.into(),
            })?
            .try_into_role()?;

        Ok(role)
    }

    async fn list(&self) -> WardenResult<Vec<Role>> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM role ORDER BY rank ASC")
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RoleRowWithId> = result.take(0).map_err(DbError::from)?;
        let roles = rows
            .into_iter()
            .map(RoleRowWithId::try_into_role)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(roles)
    }

    async fn grant_permission(
        &self,
        role_id: Uuid,
        permission: &str,
        state: PermissionState,
    ) -> WardenResult<()> {
        grant::set_grant(&self.db, Grantor::Role, role_id, permission, state).await?;
        Ok(())
    }

    async fn revoke_permission(&self, role_id: Uuid, permission: &str) -> WardenResult<()> {
        grant::remove_grant(&self.db, Grantor::Role, role_id, permission).await?;
        Ok(())
    }

    async fn role_grants(&self, role_id: Uuid) -> WardenResult<Vec<Grant>> {
        Ok(grant::grants_of(&self.db, Grantor::Role, role_id).await?)
    }
}
