//! Permission catalog: read-mostly registry of named permissions.

use std::collections::{BTreeSet, HashMap};

use warden_core::models::permission::Permission;

use crate::error::AuthzError;

/// Immutable snapshot of every known permission, keyed by name.
///
/// The engine swaps whole snapshots on reload, so lookups never
/// observe a half-refreshed catalog.
#[derive(Debug, Clone, Default)]
pub struct PermissionCatalog {
    permissions: HashMap<String, Permission>,
}

impl PermissionCatalog {
    pub fn new(permissions: Vec<Permission>) -> Self {
        Self {
            permissions: permissions
                .into_iter()
                .map(|p| (p.name.clone(), p))
                .collect(),
        }
    }

    pub fn lookup(&self, name: &str) -> Result<&Permission, AuthzError> {
        self.permissions
            .get(name)
            .ok_or_else(|| AuthzError::UnknownPermission { name: name.into() })
    }

    /// Role names allowed to grant `name`.
    pub fn assign_scope_of(&self, name: &str) -> Result<&BTreeSet<String>, AuthzError> {
        self.lookup(name).map(|p| &p.assign_scope)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.permissions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }
}
