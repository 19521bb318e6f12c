//! SurrealDB implementation of [`PermissionRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::permission::{CreatePermission, Permission};
use warden_core::repository::PermissionRepository;

use super::parse_uuid;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct PermissionRow {
    name: String,
    description: String,
    assign_scope: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct PermissionRowWithId {
    record_id: String,
    name: String,
    description: String,
    assign_scope: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PermissionRowWithId {
    fn try_into_permission(self) -> Result<Permission, DbError> {
        Ok(Permission {
            id: parse_uuid("permission", &self.record_id)?,
            name: self.name,
            description: self.description,
            assign_scope: self.assign_scope.into_iter().collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the Permission repository.
#[derive(Clone)]
pub struct SurrealPermissionRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealPermissionRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn fetch_by_name(&self, name: &str) -> Result<Permission, DbError> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM permission \
                 WHERE name = $name LIMIT 1",
            )
            .bind(("name", name.to_string()))
            .await?;

        let rows: Vec<PermissionRowWithId> = result.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| DbError::NotFound {
                entity: "permission".into(),
                id: name.into(),
            })?
            .try_into_permission()
    }
}

impl<C: Connection> PermissionRepository for SurrealPermissionRepository<C> {
    async fn create(&self, input: CreatePermission) -> WardenResult<Permission> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let assign_scope: Vec<String> = input.assign_scope.into_iter().collect();

        let result = self
            .db
            .query(
                "CREATE type::record('permission', $id) SET \
                 name = $name, description = $description, \
                 assign_scope = $assign_scope",
            )
            .bind(("id", id_str.clone()))
            .bind(("name", input.name))
            .bind(("description", input.description))
            .bind(("assign_scope", assign_scope))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<PermissionRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "permission".into(),
            id: id_str,
        })?;

        Ok(Permission {
            id,
            name: row.name,
            description: row.description,
            assign_scope: row.assign_scope.into_iter().collect(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    async fn get_by_name(&self, name: &str) -> WardenResult<Permission> {
        Ok(self.fetch_by_name(name).await?)
    }

    async fn update_assign_scope(
        &self,
        name: &str,
        assign_scope: Vec<String>,
    ) -> WardenResult<Permission> {
        let mut result = self
            .db
            .query(
                "UPDATE permission SET assign_scope = $assign_scope, \
                 updated_at = time::now() WHERE name = $name \
                 RETURN AFTER",
            )
            .bind(("name", name.to_string()))
            .bind(("assign_scope", assign_scope))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<PermissionRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::NotFound {
                entity: "permission".into(),
                id: name.into(),
            }
            .into());
        }

        Ok(self.fetch_by_name(name).await?)
    }

    async fn list_all(&self) -> WardenResult<Vec<Permission>> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM permission ORDER BY name ASC")
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PermissionRowWithId> = result.take(0).map_err(DbError::from)?;
        let permissions = rows
            .into_iter()
            .map(PermissionRowWithId::try_into_permission)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(permissions)
    }
}
