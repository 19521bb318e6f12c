//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. The authorization engine is
//! generic over these traits so it has no dependency on a concrete
//! storage backend.

use uuid::Uuid;

use crate::error::WardenResult;
use crate::models::{
    group::{CreateGroup, Group},
    permission::{CreatePermission, Grant, Permission, PermissionState},
    principal::{CreatePrincipal, Principal},
    record::{RecordAction, RecordScope, StoredRecord},
    role::{CreateRole, Role},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Principals, roles and groups
// ---------------------------------------------------------------------------

pub trait PrincipalRepository: Send + Sync {
    fn create(&self, input: CreatePrincipal) -> impl Future<Output = WardenResult<Principal>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = WardenResult<Principal>> + Send;

    /// Load a principal together with its (single) role.
    fn find_with_role(&self, id: Uuid)
    -> impl Future<Output = WardenResult<(Principal, Role)>> + Send;

    /// Replace the principal's role.
    fn set_role(&self, id: Uuid, role_id: Uuid) -> impl Future<Output = WardenResult<()>> + Send;

    /// Grant a permission directly to a principal, replacing any
    /// previous direct state for the same permission.
    fn grant_direct(
        &self,
        id: Uuid,
        permission: &str,
        state: PermissionState,
    ) -> impl Future<Output = WardenResult<()>> + Send;

    fn revoke_direct(&self, id: Uuid, permission: &str)
    -> impl Future<Output = WardenResult<()>> + Send;

    /// Direct grants held by a principal.
    fn direct_grants(&self, id: Uuid) -> impl Future<Output = WardenResult<Vec<Grant>>> + Send;

    fn delete(&self, id: Uuid) -> impl Future<Output = WardenResult<()>> + Send;
}

pub trait RoleRepository: Send + Sync {
    fn create(&self, input: CreateRole) -> impl Future<Output = WardenResult<Role>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = WardenResult<Role>> + Send;
    fn get_by_name(&self, name: &str) -> impl Future<Output = WardenResult<Role>> + Send;
    /// All roles ordered by rank (most privileged first).
    fn list(&self) -> impl Future<Output = WardenResult<Vec<Role>>> + Send;

    /// Associate a permission with a role (creates or replaces a `grants` edge).
    fn grant_permission(
        &self,
        role_id: Uuid,
        permission: &str,
        state: PermissionState,
    ) -> impl Future<Output = WardenResult<()>> + Send;

    fn revoke_permission(
        &self,
        role_id: Uuid,
        permission: &str,
    ) -> impl Future<Output = WardenResult<()>> + Send;

    /// Baseline grants inherited by every principal holding the role.
    fn role_grants(&self, role_id: Uuid) -> impl Future<Output = WardenResult<Vec<Grant>>> + Send;
}

pub trait GroupRepository: Send + Sync {
    fn create(&self, input: CreateGroup) -> impl Future<Output = WardenResult<Group>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = WardenResult<Group>> + Send;

    /// Add a principal to a group (creates a `member_of` edge).
    fn add_member(
        &self,
        principal_id: Uuid,
        group_id: Uuid,
    ) -> impl Future<Output = WardenResult<()>> + Send;

    fn remove_member(
        &self,
        principal_id: Uuid,
        group_id: Uuid,
    ) -> impl Future<Output = WardenResult<()>> + Send;

    /// Get all groups a principal belongs to.
    fn groups_of(&self, principal_id: Uuid) -> impl Future<Output = WardenResult<Vec<Group>>> + Send;

    /// Set a group's override for a permission.
    fn set_grant(
        &self,
        group_id: Uuid,
        permission: &str,
        state: PermissionState,
    ) -> impl Future<Output = WardenResult<()>> + Send;

    fn remove_grant(
        &self,
        group_id: Uuid,
        permission: &str,
    ) -> impl Future<Output = WardenResult<()>> + Send;

    fn group_grants(&self, group_id: Uuid) -> impl Future<Output = WardenResult<Vec<Grant>>> + Send;

    /// Overrides of every group the principal belongs to, one vector
    /// per group.
    fn grants_of_groups(
        &self,
        principal_id: Uuid,
    ) -> impl Future<Output = WardenResult<Vec<Vec<Grant>>>> + Send;
}

pub trait PermissionRepository: Send + Sync {
    fn create(
        &self,
        input: CreatePermission,
    ) -> impl Future<Output = WardenResult<Permission>> + Send;
    fn get_by_name(&self, name: &str) -> impl Future<Output = WardenResult<Permission>> + Send;

    /// Administrative update of the roles allowed to assign a permission.
    fn update_assign_scope(
        &self,
        name: &str,
        assign_scope: Vec<String>,
    ) -> impl Future<Output = WardenResult<Permission>> + Send;

    /// The full catalog, used to populate the engine at startup.
    fn list_all(&self) -> impl Future<Output = WardenResult<Vec<Permission>>> + Send;
}

// ---------------------------------------------------------------------------
// Record-scoped models
// ---------------------------------------------------------------------------

/// Declarative row filter pushed into the storage query for list
/// operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordPredicate {
    /// No record-scope restriction (the actor holds the root token).
    Unrestricted,
    /// Keep rows whose `action` bucket or `root` bucket intersects
    /// `tokens`, or whose buckets are both empty.
    ScopeOverlap {
        action: RecordAction,
        tokens: Vec<String>,
    },
}

impl RecordPredicate {
    /// In-process evaluation of the same predicate, for backends
    /// without native array-overlap support.
    pub fn matches(&self, scope: &RecordScope) -> bool {
        match self {
            RecordPredicate::Unrestricted => true,
            RecordPredicate::ScopeOverlap { action, tokens } => {
                let row = scope.tokens_for(*action);
                row.is_empty() || row.iter().any(|t| tokens.iter().any(|s| s == t))
            }
        }
    }
}

pub trait RecordRepository: Send + Sync {
    fn create(
        &self,
        model: &str,
        record_scope: RecordScope,
        data: serde_json::Value,
    ) -> impl Future<Output = WardenResult<StoredRecord>> + Send;

    fn get(&self, model: &str, id: Uuid) -> impl Future<Output = WardenResult<StoredRecord>> + Send;

    /// Fetch only the id and record scope of the given rows. Missing ids
    /// are omitted from the result.
    fn scopes_for(
        &self,
        model: &str,
        ids: &[Uuid],
    ) -> impl Future<Output = WardenResult<Vec<(Uuid, RecordScope)>>> + Send;

    /// Paginated select with the predicate applied before pagination.
    fn query_with_predicate(
        &self,
        model: &str,
        predicate: &RecordPredicate,
        pagination: Pagination,
    ) -> impl Future<Output = WardenResult<PaginatedResult<StoredRecord>>> + Send;

    /// Delete the given rows in one batch; returns the number removed.
    fn delete_many(&self, model: &str, ids: &[Uuid]) -> impl Future<Output = WardenResult<u64>> + Send;

    fn add_scope(
        &self,
        model: &str,
        id: Uuid,
        action: RecordAction,
        tokens: Vec<String>,
    ) -> impl Future<Output = WardenResult<RecordScope>> + Send;

    fn remove_scope(
        &self,
        model: &str,
        id: Uuid,
        action: RecordAction,
        tokens: Vec<String>,
    ) -> impl Future<Output = WardenResult<RecordScope>> + Send;
}
