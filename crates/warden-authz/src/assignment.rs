//! Assignment guard: an actor may only hand out what it could assign
//! itself.

use uuid::Uuid;
use warden_core::models::permission::{Grant, Permission, PermissionState};

use crate::algebra::EffectiveScope;
use crate::catalog::PermissionCatalog;
use crate::error::AuthzError;

/// Something an actor is trying to grant to another principal, group
/// or role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignable {
    Permission(String),
    Permissions(Vec<String>),
    /// Adding a principal to a group grants everything the group includes.
    Group(Uuid),
    RolePermission { role: Uuid, permission: String },
}

/// `true` iff the permission's assign scope intersects `scope`, or
/// `scope` holds the root token.
pub fn can_assign(scope: &EffectiveScope, permission: &Permission, root_token: &str) -> bool {
    scope.is_root(root_token) || scope.contains_any(permission.assign_scope.iter().map(String::as_str))
}

/// All-or-nothing over a batch of permissions.
pub fn guard_permissions(
    scope: &EffectiveScope,
    permissions: &[&Permission],
    root_token: &str,
) -> Result<(), AuthzError> {
    if permissions.iter().all(|p| can_assign(scope, p, root_token)) {
        Ok(())
    } else {
        Err(AuthzError::AssignmentForbidden)
    }
}

/// Resolve names through the catalog, then guard them as one batch.
pub fn guard_permission_names<S: AsRef<str>>(
    scope: &EffectiveScope,
    names: &[S],
    catalog: &PermissionCatalog,
    root_token: &str,
) -> Result<(), AuthzError> {
    let permissions = names
        .iter()
        .map(|n| catalog.lookup(n.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    guard_permissions(scope, &permissions, root_token)
}

/// A group may be assigned only if every permission it includes could
/// be assigned independently. Excluded and Forbidden overrides only
/// restrict, so they need no entitlement.
pub fn guard_group(
    scope: &EffectiveScope,
    group_grants: &[Grant],
    catalog: &PermissionCatalog,
    root_token: &str,
) -> Result<(), AuthzError> {
    let included: Vec<&str> = group_grants
        .iter()
        .filter(|g| g.state == PermissionState::Included)
        .map(|g| g.permission.as_str())
        .collect();
    guard_permission_names(scope, &included, catalog, root_token)
}
