//! `grants` edge helpers shared by the role, group and principal
//! repositories.
//!
//! Every grantor table relates to `permission` through the same edge
//! type; the edge's `state` field carries the grantor's
//! [`PermissionState`]. At most one edge exists per (grantor,
//! permission) pair.

use std::collections::BTreeMap;

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::models::permission::{Grant, PermissionState};

use super::CountRow;
use crate::error::DbError;

/// Tables that may appear on the `in` side of a `grants` edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Grantor {
    Role,
    Group,
    User,
}

impl Grantor {
    fn table(self) -> &'static str {
        match self {
            Grantor::Role => "role",
            Grantor::Group => "group",
            Grantor::User => "user",
        }
    }
}

#[derive(Debug, SurrealValue)]
struct IdRow {
    record_id: String,
}

#[derive(Debug, SurrealValue)]
struct GrantRow {
    permission: String,
    state: String,
}

impl GrantRow {
    fn try_into_grant(self) -> Result<Grant, DbError> {
        let state = self
            .state
            .parse::<PermissionState>()
            .map_err(DbError::InvalidRow)?;
        Ok(Grant::new(self.permission, state))
    }
}

#[derive(Debug, SurrealValue)]
struct OwnedGrantRow {
    owner_id: String,
    permission: String,
    state: String,
}

async fn permission_id<C: Connection>(db: &Surreal<C>, name: &str) -> Result<String, DbError> {
    let mut result = db
        .query("SELECT meta::id(id) AS record_id FROM permission WHERE name = $name LIMIT 1")
        .bind(("name", name.to_string()))
        .await?;
    let rows: Vec<IdRow> = result.take(0)?;
    rows.into_iter()
        .next()
        .map(|r| r.record_id)
        .ok_or_else(|| DbError::NotFound {
            entity: "permission".into(),
            id: name.into(),
        })
}

async fn ensure_exists<C: Connection>(
    db: &Surreal<C>,
    grantor: Grantor,
    id: &str,
) -> Result<(), DbError> {
    let mut result = db
        .query("SELECT count() AS total FROM type::record($table, $id) GROUP ALL")
        .bind(("table", grantor.table()))
        .bind(("id", id.to_string()))
        .await?;
    let rows: Vec<CountRow> = result.take(0)?;
    if CountRow::total(&rows) == 0 {
        return Err(DbError::NotFound {
            entity: grantor.table().into(),
            id: id.into(),
        });
    }
    Ok(())
}

/// Create or replace the grantor's edge to `permission`.
pub(crate) async fn set_grant<C: Connection>(
    db: &Surreal<C>,
    grantor: Grantor,
    id: Uuid,
    permission: &str,
    state: PermissionState,
) -> Result<(), DbError> {
    let id_str = id.to_string();
    ensure_exists(db, grantor, &id_str).await?;
    let permission_id = permission_id(db, permission).await?;

    // One edge id per (grantor, permission) pair.
    let table = grantor.table();
    let edge = format!("{table}_{id_str}_{permission_id}");
    let query = format!(
        "BEGIN TRANSACTION; \
         DELETE grants:`{edge}`; \
         RELATE {table}:`{id_str}` -> grants:`{edge}` -> permission:`{permission_id}` \
         SET state = $state; \
         COMMIT TRANSACTION;"
    );

    db.query(query)
        .bind(("state", state.as_str()))
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    Ok(())
}

/// Remove the grantor's edge to `permission`; absent edges are ignored.
pub(crate) async fn remove_grant<C: Connection>(
    db: &Surreal<C>,
    grantor: Grantor,
    id: Uuid,
    permission: &str,
) -> Result<(), DbError> {
    db.query(
        "DELETE grants WHERE in = type::record($table, $id) \
         AND out.name = $permission",
    )
    .bind(("table", grantor.table()))
    .bind(("id", id.to_string()))
    .bind(("permission", permission.to_string()))
    .await?
    .check()
    .map_err(|e| DbError::Migration(e.to_string()))?;

    Ok(())
}

/// All grants held by one grantor.
pub(crate) async fn grants_of<C: Connection>(
    db: &Surreal<C>,
    grantor: Grantor,
    id: Uuid,
) -> Result<Vec<Grant>, DbError> {
    let mut result = db
        .query(
            "SELECT out.name AS permission, state FROM grants \
             WHERE in = type::record($table, $id) \
             ORDER BY permission ASC",
        )
        .bind(("table", grantor.table()))
        .bind(("id", id.to_string()))
        .await?;

    let rows: Vec<GrantRow> = result.take(0)?;
    rows.into_iter().map(GrantRow::try_into_grant).collect()
}

/// Grants of every group `user_id` belongs to, one vector per group.
/// Groups without any grant contribute nothing.
pub(crate) async fn grants_of_member_groups<C: Connection>(
    db: &Surreal<C>,
    user_id: Uuid,
) -> Result<Vec<Vec<Grant>>, DbError> {
    let mut result = db
        .query(
            "SELECT meta::id(in) AS owner_id, out.name AS permission, state \
             FROM grants WHERE in IN (\
                 SELECT VALUE out FROM member_of \
                 WHERE in = type::record('user', $user_id)\
             )",
        )
        .bind(("user_id", user_id.to_string()))
        .await?;

    let rows: Vec<OwnedGrantRow> = result.take(0)?;

    let mut by_group: BTreeMap<String, Vec<Grant>> = BTreeMap::new();
    for row in rows {
        let grant = GrantRow {
            permission: row.permission,
            state: row.state,
        }
        .try_into_grant()?;
        by_group.entry(row.owner_id).or_default().push(grant);
    }

    Ok(by_group.into_values().collect())
}

/// Drop every `grants` edge leaving the grantor.
pub(crate) async fn clear_grants<C: Connection>(
    db: &Surreal<C>,
    grantor: Grantor,
    id: Uuid,
) -> Result<(), DbError> {
    db.query("DELETE grants WHERE in = type::record($table, $id)")
        .bind(("table", grantor.table()))
        .bind(("id", id.to_string()))
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;
    Ok(())
}
