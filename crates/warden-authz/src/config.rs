//! Authorization engine configuration.

/// Configuration for the authorization engine, passed into
/// [`AuthzEngine::new`](crate::engine::AuthzEngine::new).
#[derive(Debug, Clone)]
pub struct AuthzConfig {
    /// Universal token; a scope holding it passes every guard
    /// (default: `root`).
    pub root_scope: String,
    /// Prefix of the record-creator ownership token (default: `user-`).
    pub owner_scope_prefix: String,
    /// Add the principal's role name to its effective scope
    /// (default: true). Required for assignment checks, since
    /// `assign_scope` lists role names.
    pub include_role_in_scope: bool,
    /// Primary-key field name of record-scoped models (default: `id`).
    pub primary_key: String,
    /// Field carrying a principal's scope in credentials (default: `scope`).
    pub scope_key: String,
    /// Column holding the per-row record scope (default: `record_scope`).
    pub record_scope_key: String,
    /// Maximum number of targets accepted by one bulk request
    /// (default: 1000).
    pub max_bulk_targets: usize,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            root_scope: "root".into(),
            owner_scope_prefix: "user-".into(),
            include_role_in_scope: true,
            primary_key: "id".into(),
            scope_key: "scope".into(),
            record_scope_key: "record_scope".into(),
            max_bulk_targets: 1000,
        }
    }
}
