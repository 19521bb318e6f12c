//! Permission domain model.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Permission {
    pub id: Uuid,
    /// The scope token this permission contributes (e.g., `readUser`).
    pub name: String,
    pub description: String,
    /// Role names allowed to grant this permission to others.
    pub assign_scope: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePermission {
    pub name: String,
    pub description: String,
    pub assign_scope: BTreeSet<String>,
}

/// State attached to a (grantor, permission) pair.
///
/// Variants are declared in ascending precedence so the derived `Ord`
/// is the merge order: `Included < Excluded < Forbidden`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PermissionState {
    Included,
    Excluded,
    Forbidden,
}

impl PermissionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionState::Included => "Included",
            PermissionState::Excluded => "Excluded",
            PermissionState::Forbidden => "Forbidden",
        }
    }
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Included" => Ok(PermissionState::Included),
            "Excluded" => Ok(PermissionState::Excluded),
            "Forbidden" => Ok(PermissionState::Forbidden),
            other => Err(format!("unknown permission state: {other}")),
        }
    }
}

/// A permission name paired with the state one grantor assigns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grant {
    pub permission: String,
    pub state: PermissionState,
}

impl Grant {
    pub fn new(permission: impl Into<String>, state: PermissionState) -> Self {
        Self {
            permission: permission.into(),
            state,
        }
    }

    pub fn included(permission: impl Into<String>) -> Self {
        Self::new(permission, PermissionState::Included)
    }

    pub fn excluded(permission: impl Into<String>) -> Self {
        Self::new(permission, PermissionState::Excluded)
    }

    pub fn forbidden(permission: impl Into<String>) -> Self {
        Self::new(permission, PermissionState::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_precedence_order() {
        assert!(PermissionState::Forbidden > PermissionState::Excluded);
        assert!(PermissionState::Excluded > PermissionState::Included);
        assert_eq!(
            [PermissionState::Excluded, PermissionState::Included]
                .into_iter()
                .max(),
            Some(PermissionState::Excluded)
        );
    }

    #[test]
    fn state_string_round_trip() {
        for state in [
            PermissionState::Included,
            PermissionState::Excluded,
            PermissionState::Forbidden,
        ] {
            assert_eq!(state.as_str().parse::<PermissionState>(), Ok(state));
        }
        assert!("Granted".parse::<PermissionState>().is_err());
    }
}
