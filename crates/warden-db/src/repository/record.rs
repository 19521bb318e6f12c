//! SurrealDB implementation of [`RecordRepository`].
//!
//! Record-scoped models are plain tables named by the caller. Each row
//! keeps its [`RecordScope`] as an object under a configurable field
//! and its payload under `data`. List predicates compile to a SurrealQL
//! `WHERE` clause so filtering happens before `LIMIT`/`START`.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::record::{RecordAction, RecordScope, StoredRecord, validate_token};
use warden_core::repository::{PaginatedResult, Pagination, RecordPredicate, RecordRepository};

use super::{CountRow, parse_uuid};
use crate::error::DbError;

/// Tables owned by the authorization schema; never addressable as models.
const RESERVED_TABLES: &[&str] = &[
    "_migration",
    "grants",
    "group",
    "member_of",
    "permission",
    "role",
    "user",
];

#[derive(Debug, SurrealValue)]
struct RecordRow {
    record_id: String,
    record_scope: serde_json::Value,
    data: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl RecordRow {
    fn try_into_record(self) -> Result<StoredRecord, DbError> {
        Ok(StoredRecord {
            id: parse_uuid("record", &self.record_id)?,
            record_scope: decode_scope(self.record_scope)?,
            data: self.data,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct ScopeRow {
    record_id: String,
    record_scope: serde_json::Value,
}

fn decode_scope(value: serde_json::Value) -> Result<RecordScope, DbError> {
    if value.is_null() {
        return Ok(RecordScope::default());
    }
    serde_json::from_value(value).map_err(|e| DbError::InvalidRow(format!("invalid record scope: {e}")))
}

fn encode_scope(scope: &RecordScope) -> Result<serde_json::Value, DbError> {
    serde_json::to_value(scope).map_err(|e| DbError::InvalidRow(format!("invalid record scope: {e}")))
}

fn validate_identifier(name: &str) -> Result<(), DbError> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(DbError::InvalidIdentifier(name.into()))
    }
}

fn validate_model(model: &str) -> Result<(), DbError> {
    validate_identifier(model)?;
    if RESERVED_TABLES.contains(&model) {
        return Err(DbError::InvalidIdentifier(model.into()));
    }
    Ok(())
}

/// SurrealQL condition for `predicate`. Binds `$tokens`.
///
/// A row passes when its action bucket and root bucket are both empty,
/// or when either intersects the actor's tokens.
fn filter_clause(scope_key: &str, predicate: &RecordPredicate) -> String {
    match predicate {
        RecordPredicate::Unrestricted => "true".into(),
        RecordPredicate::ScopeOverlap { action, .. } => {
            let bucket = format!("(`{scope_key}`.`{action}` ?? [])");
            let root = format!("(`{scope_key}`.`root` ?? [])");
            format!(
                "(array::len(array::union({bucket}, {root})) = 0 \
                 OR {bucket} CONTAINSANY $tokens \
                 OR {root} CONTAINSANY $tokens)"
            )
        }
    }
}

/// Comma-separated record ids for `model`, used as a `FROM` target so
/// bulk reads and deletes touch only the named rows.
fn record_targets(model: &str, ids: &[Uuid]) -> String {
    ids.iter()
        .map(|id| format!("`{model}`:`{id}`"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn predicate_tokens(predicate: &RecordPredicate) -> Vec<String> {
    match predicate {
        RecordPredicate::Unrestricted => Vec::new(),
        RecordPredicate::ScopeOverlap { tokens, .. } => tokens.clone(),
    }
}

/// SurrealDB implementation of the Record repository.
#[derive(Clone)]
pub struct SurrealRecordRepository<C: Connection> {
    db: Surreal<C>,
    scope_key: String,
}

impl<C: Connection> SurrealRecordRepository<C> {
    /// `scope_key` names the field holding each row's record scope.
    pub fn new(db: Surreal<C>, scope_key: &str) -> Result<Self, DbError> {
        validate_identifier(scope_key)?;
        Ok(Self {
            db,
            scope_key: scope_key.into(),
        })
    }

    fn select_columns(&self) -> String {
        format!(
            "meta::id(id) AS record_id, `{}` AS record_scope, data, created_at",
            self.scope_key
        )
    }

    /// Validate `model` and define its table if nothing has been written
    /// to it yet, so reads see an empty table rather than an error.
    async fn ensure_model(&self, model: &str) -> Result<(), DbError> {
        validate_model(model)?;
        self.db
            .query(format!("DEFINE TABLE IF NOT EXISTS `{model}` SCHEMALESS"))
            .await?
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;
        Ok(())
    }

    /// Rewrite one action bucket in a single statement with `function`
    /// applied to the stored bucket and `$tokens`.
    async fn update_bucket(
        &self,
        model: &str,
        id: Uuid,
        action: RecordAction,
        function: &str,
        tokens: Vec<String>,
    ) -> Result<RecordScope, DbError> {
        self.ensure_model(model).await?;
        let id_str = id.to_string();
        let bucket = format!("`{}`.`{action}`", self.scope_key);

        let query = format!(
            "UPDATE type::record($model, $id) SET {bucket} = {function}(({bucket} ?? []), $tokens); \
             SELECT meta::id(id) AS record_id, `{key}` AS record_scope \
             FROM type::record($model, $id);",
            key = self.scope_key,
        );
        let mut result = self
            .db
            .query(query)
            .bind(("model", model.to_string()))
            .bind(("id", id_str.clone()))
            .bind(("tokens", tokens))
            .await?
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<ScopeRow> = result.take(1)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: model.into(),
            id: id_str,
        })?;
        decode_scope(row.record_scope)
    }
}

impl<C: Connection> RecordRepository for SurrealRecordRepository<C> {
    async fn create(
        &self,
        model: &str,
        record_scope: RecordScope,
        data: serde_json::Value,
    ) -> WardenResult<StoredRecord> {
        self.ensure_model(model).await?;
        record_scope.validate()?;

        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let query = format!(
            "CREATE type::record($model, $id) SET \
             `{key}` = $record_scope, data = $data, created_at = time::now(); \
             SELECT {columns} FROM type::record($model, $id);",
            key = self.scope_key,
            columns = self.select_columns(),
        );

        let mut result = self
            .db
            .query(query)
            .bind(("model", model.to_string()))
            .bind(("id", id_str.clone()))
            .bind(("record_scope", encode_scope(&record_scope)?))
            .bind(("data", data))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<RecordRow> = result.take(1).map_err(DbError::from)?;
        let record = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::NotFound {
                entity: model.into(),
                id: id_str,
            })?
            .try_into_record()?;

        Ok(record)
    }

    async fn get(&self, model: &str, id: Uuid) -> WardenResult<StoredRecord> {
        self.ensure_model(model).await?;
        let id_str = id.to_string();

        let query = format!(
            "SELECT {} FROM type::record($model, $id)",
            self.select_columns()
        );
        let mut result = self
            .db
            .query(query)
            .bind(("model", model.to_string()))
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RecordRow> = result.take(0).map_err(DbError::from)?;
        let record = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::NotFound {
                entity: model.into(),
                id: id_str,
            })?
            .try_into_record()?;

        Ok(record)
    }

    async fn scopes_for(&self, model: &str, ids: &[Uuid]) -> WardenResult<Vec<(Uuid, RecordScope)>> {
        if ids.is_empty() {
            validate_model(model)?;
            return Ok(Vec::new());
        }
        self.ensure_model(model).await?;

        let query = format!(
            "SELECT meta::id(id) AS record_id, `{}` AS record_scope FROM {}",
            self.scope_key,
            record_targets(model, ids),
        );
        let mut result = self.db.query(query).await.map_err(DbError::from)?;

        let rows: Vec<ScopeRow> = result.take(0).map_err(DbError::from)?;
        let mut scopes = rows
            .into_iter()
            .map(|row| {
                Ok((
                    parse_uuid("record", &row.record_id)?,
                    decode_scope(row.record_scope)?,
                ))
            })
            .collect::<Result<Vec<_>, DbError>>()?;

        // Preserve the caller's order.
        scopes.sort_by_key(|(id, _)| ids.iter().position(|i| i == id));

        Ok(scopes)
    }

    async fn query_with_predicate(
        &self,
        model: &str,
        predicate: &RecordPredicate,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<StoredRecord>> {
        self.ensure_model(model).await?;
        let filter = filter_clause(&self.scope_key, predicate);
        let tokens = predicate_tokens(predicate);

        let mut count_result = self
            .db
            .query(format!(
                "SELECT count() AS total FROM type::table($model) \
                 WHERE {filter} GROUP ALL"
            ))
            .bind(("model", model.to_string()))
            .bind(("tokens", tokens.clone()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = CountRow::total(&count_rows);

        let mut result = self
            .db
            .query(format!(
                "SELECT {columns} FROM type::table($model) \
                 WHERE {filter} \
                 ORDER BY created_at ASC, record_id ASC \
                 LIMIT $limit START $offset",
                columns = self.select_columns(),
            ))
            .bind(("model", model.to_string()))
            .bind(("tokens", tokens))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RecordRow> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(RecordRow::try_into_record)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn delete_many(&self, model: &str, ids: &[Uuid]) -> WardenResult<u64> {
        if ids.is_empty() {
            validate_model(model)?;
            return Ok(0);
        }
        self.ensure_model(model).await?;

        let targets = record_targets(model, ids);
        let mut result = self
            .db
            .query(format!(
                "SELECT count() AS total FROM {targets} GROUP ALL; \
                 DELETE {targets};"
            ))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(CountRow::total(&count_rows))
    }

    async fn add_scope(
        &self,
        model: &str,
        id: Uuid,
        action: RecordAction,
        tokens: Vec<String>,
    ) -> WardenResult<RecordScope> {
        for token in &tokens {
            validate_token(token)?;
        }
        Ok(self
            .update_bucket(model, id, action, "array::union", tokens)
            .await?)
    }

    async fn remove_scope(
        &self,
        model: &str,
        id: Uuid,
        action: RecordAction,
        tokens: Vec<String>,
    ) -> WardenResult<RecordScope> {
        Ok(self
            .update_bucket(model, id, action, "array::complement", tokens)
            .await?)
    }
}
