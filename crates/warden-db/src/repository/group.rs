//! SurrealDB implementation of [`GroupRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::group::{CreateGroup, Group};
use warden_core::models::permission::{Grant, PermissionState};
use warden_core::repository::GroupRepository;

use super::grant::{self, Grantor};
use super::{CountRow, parse_uuid};
use crate::error::DbError;

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct GroupRow {
    name: String,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct GroupRowWithId {
    record_id: String,
    name: String,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl GroupRowWithId {
    fn try_into_group(self) -> Result<Group, DbError> {
        Ok(Group {
            id: parse_uuid("group", &self.record_id)?,
            name: self.name,
            description: self.description,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the Group repository.
#[derive(Clone)]
pub struct SurrealGroupRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealGroupRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> GroupRepository for SurrealGroupRepository<C> {
    async fn create(&self, input: CreateGroup) -> WardenResult<Group> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('group', $id) SET \
                 name = $name, description = $description",
            )
            .bind(("id", id_str.clone()))
            .bind(("name", input.name))
            .bind(("description", input.description))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<GroupRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "group".into(),
            id: id_str,
        })?;

        Ok(Group {
            id,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<Group> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('group', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<GroupRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "group".into(),
            id: id_str,
        })?;

        Ok(Group {
            id,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    async fn add_member(&self, principal_id: Uuid, group_id: Uuid) -> WardenResult<()> {
        let user_id_str = principal_id.to_string();
        let group_id_str = group_id.to_string();

        // Both ends must exist before the edge is created.
        let mut check = self
            .db
            .query(
                "SELECT count() AS total FROM type::record('user', $user_id) GROUP ALL; \
                 SELECT count() AS total FROM type::record('group', $group_id) GROUP ALL; \
                 SELECT count() AS total FROM member_of \
                 WHERE in = type::record('user', $user_id) \
                 AND out = type::record('group', $group_id) GROUP ALL;",
            )
            .bind(("user_id", user_id_str.clone()))
            .bind(("group_id", group_id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let user_count: Vec<CountRow> = check.take(0).map_err(DbError::from)?;
        if CountRow::total(&user_count) == 0 {
            return Err(DbError::NotFound {
                entity: "user".into(),
                id: user_id_str,
            }
            .into());
        }

        let group_count: Vec<CountRow> = check.take(1).map_err(DbError::from)?;
        if CountRow::total(&group_count) == 0 {
            return Err(DbError::NotFound {
                entity: "group".into(),
                id: group_id_str,
            }
            .into());
        }

        let existing: Vec<CountRow> = check.take(2).map_err(DbError::from)?;
        if CountRow::total(&existing) > 0 {
            return Ok(());
        }

        let query = format!("RELATE user:`{user_id_str}` -> member_of -> group:`{group_id_str}`;");
        self.db
            .query(query)
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        Ok(())
    }

    async fn remove_member(&self, principal_id: Uuid, group_id: Uuid) -> WardenResult<()> {
        self.db
            .query(
                "DELETE member_of WHERE \
                 in = type::record('user', $user_id) AND \
                 out = type::record('group', $group_id)",
            )
            .bind(("user_id", principal_id.to_string()))
            .bind(("group_id", group_id.to_string()))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn groups_of(&self, principal_id: Uuid) -> WardenResult<Vec<Group>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM group \
                 WHERE id IN (\
                     SELECT VALUE out FROM member_of \
                     WHERE in = type::record('user', $user_id)\
                 ) \
                 ORDER BY name ASC",
            )
            .bind(("user_id", principal_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<GroupRowWithId> = result.take(0).map_err(DbError::from)?;

        let groups = rows
            .into_iter()
            .map(GroupRowWithId::try_into_group)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(groups)
    }

    async fn set_grant(
        &self,
        group_id: Uuid,
        permission: &str,
        state: PermissionState,
    ) -> WardenResult<()> {
        grant::set_grant(&self.db, Grantor::Group, group_id, permission, state).await?;
        Ok(())
    }

    async fn remove_grant(&self, group_id: Uuid, permission: &str) -> WardenResult<()> {
        grant::remove_grant(&self.db, Grantor::Group, group_id, permission).await?;
        Ok(())
    }

    async fn group_grants(&self, group_id: Uuid) -> WardenResult<Vec<Grant>> {
        Ok(grant::grants_of(&self.db, Grantor::Group, group_id).await?)
    }

    async fn grants_of_groups(&self, principal_id: Uuid) -> WardenResult<Vec<Vec<Grant>>> {
        Ok(grant::grants_of_member_groups(&self.db, principal_id).await?)
    }
}
