//! SurrealDB implementation of [`PrincipalRepository`].
//!
//! Principals live in the `user` table. Each holds exactly one role by
//! id; direct grants are `grants` edges leaving the user record.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::permission::{Grant, PermissionState};
use warden_core::models::principal::{CreatePrincipal, Principal};
use warden_core::models::role::Role;
use warden_core::repository::PrincipalRepository;

use super::grant::{self, Grantor};
use super::parse_uuid;
use super::role::fetch_role;
use crate::error::DbError;

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct UserRow {
    username: String,
    role_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_principal(self, id: Uuid) -> Result<Principal, DbError> {
        Ok(Principal {
            id,
            username: self.username,
            role_id: parse_uuid("role", &self.role_id)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the Principal repository.
#[derive(Clone)]
pub struct SurrealPrincipalRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealPrincipalRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn fetch(&self, id: Uuid) -> Result<Principal, DbError> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('user', $id)")
            .bind(("id", id_str.clone()))
            .await?;

        let rows: Vec<UserRow> = result.take(0)?;
        rows.into_iter()
            .next()
            .ok_or(DbError::NotFound {
                entity: "user".into(),
                id: id_str,
            })?
            .into_principal(id)
    }
}

impl<C: Connection> PrincipalRepository for SurrealPrincipalRepository<C> {
    async fn create(&self, input: CreatePrincipal) -> WardenResult<Principal> {
        // Reject dangling role references up front.
        fetch_role(&self.db, input.role_id).await?;

        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('user', $id) SET \
                 username = $username, role_id = $role_id",
            )
            .bind(("id", id_str.clone()))
            .bind(("username", input.username))
            .bind(("role_id", input.role_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let principal = rows
            .into_iter()
            .next()
            .ok_or(DbError::NotFound {
                entity: "user".into(),
                id: id_str,
            })?
            .into_principal(id)?;

        Ok(principal)
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<Principal> {
        Ok(self.fetch(id).await?)
    }

    async fn find_with_role(&self, id: Uuid) -> WardenResult<(Principal, Role)> {
        let principal = self.fetch(id).await?;
        let role = fetch_role(&self.db, principal.role_id).await?;
        Ok((principal, role))
    }

    async fn set_role(&self, id: Uuid, role_id: Uuid) -> WardenResult<()> {
        fetch_role(&self.db, role_id).await?;

        let id_str = id.to_string();
        let mut result = self
            .db
            .query(
                "UPDATE type::record('user', $id) SET \
                 role_id = $role_id, updated_at = time::now()",
            )
            .bind(("id", id_str.clone()))
            .bind(("role_id", role_id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::NotFound {
                entity: "user".into(),
                id: id_str,
            }
            .into());
        }

        Ok(())
    }

    async fn grant_direct(
        &self,
        id: Uuid,
        permission: &str,
        state: PermissionState,
    ) -> WardenResult<()> {
        grant::set_grant(&self.db, Grantor::User, id, permission, state).await?;
        Ok(())
    }

    async fn revoke_direct(&self, id: Uuid, permission: &str) -> WardenResult<()> {
        grant::remove_grant(&self.db, Grantor::User, id, permission).await?;
        Ok(())
    }

    async fn direct_grants(&self, id: Uuid) -> WardenResult<Vec<Grant>> {
        Ok(grant::grants_of(&self.db, Grantor::User, id).await?)
    }

    async fn delete(&self, id: Uuid) -> WardenResult<()> {
        let id_str = id.to_string();

        // Edges first, then the user record.
        grant::clear_grants(&self.db, Grantor::User, id).await?;
        self.db
            .query(
                "DELETE member_of WHERE in = type::record('user', $id); \
                 DELETE type::record('user', $id);",
            )
            .bind(("id", id_str))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        Ok(())
    }
}
