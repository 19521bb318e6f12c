//! SurrealDB connection management.

use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use tracing::info;

use crate::error::DbError;
use crate::repository::{
    SurrealGroupRepository, SurrealPermissionRepository, SurrealPrincipalRepository,
    SurrealRecordRepository, SurrealRoleRepository,
};
use crate::schema::run_migrations;

/// Configuration for connecting to SurrealDB.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// WebSocket URL (e.g., `127.0.0.1:8000`).
    pub url: String,
    pub namespace: String,
    pub database: String,
    /// Root credentials.
    pub username: String,
    pub password: String,
    /// Apply pending schema migrations right after connecting.
    pub migrate_on_connect: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "127.0.0.1:8000".into(),
            namespace: "warden".into(),
            database: "main".into(),
            username: "root".into(),
            password: "root".into(),
            migrate_on_connect: true,
        }
    }
}

/// Owns the SurrealDB client and hands out repositories bound to it.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Client>,
}

impl DbManager {
    /// Connect, sign in as root, select namespace and database, and
    /// optionally bring the schema up to date.
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        info!(
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
            "Connecting to SurrealDB"
        );

        let db = Surreal::new::<Ws>(&config.url).await?;

        db.signin(Root {
            username: config.username.clone(),
            password: config.password.clone(),
        })
        .await?;

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;

        if config.migrate_on_connect {
            run_migrations(&db).await?;
        }

        info!("Connected to SurrealDB");

        Ok(Self { db })
    }

    pub fn client(&self) -> &Surreal<Client> {
        &self.db
    }

    pub fn principals(&self) -> SurrealPrincipalRepository<Client> {
        SurrealPrincipalRepository::new(self.db.clone())
    }

    pub fn roles(&self) -> SurrealRoleRepository<Client> {
        SurrealRoleRepository::new(self.db.clone())
    }

    pub fn groups(&self) -> SurrealGroupRepository<Client> {
        SurrealGroupRepository::new(self.db.clone())
    }

    pub fn permissions(&self) -> SurrealPermissionRepository<Client> {
        SurrealPermissionRepository::new(self.db.clone())
    }

    /// Record repository storing each row's scope under `record_scope_key`.
    pub fn records(&self, record_scope_key: &str) -> Result<SurrealRecordRepository<Client>, DbError> {
        SurrealRecordRepository::new(self.db.clone(), record_scope_key)
    }
}
