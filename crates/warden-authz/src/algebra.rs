//! Scope algebra: folds role, group and direct grants into an
//! effective scope.
//!
//! # Precedence
//!
//! ```text
//! role baseline  →  groups (merged)  →  direct grants
//!
//! within a layer:   max(state)               Included < Excluded < Forbidden
//! across layers:    later layer replaces     unless either side is Forbidden
//! ```
//!
//! Forbidden is sticky: once any layer forbids a permission, nothing
//! re-includes it. Groups are merged by maximum before they are applied,
//! so two groups disagreeing resolve the same way whatever order storage
//! returns them in.

use std::collections::{BTreeMap, BTreeSet};

use sha2::{Digest, Sha256};
use uuid::Uuid;
use warden_core::models::permission::{Grant, PermissionState};

/// Grant sources for one principal, loaded fresh per request.
#[derive(Debug, Clone, Default)]
pub struct GrantLayers {
    pub role: Vec<Grant>,
    pub groups: Vec<Vec<Grant>>,
    pub direct: Vec<Grant>,
}

fn merge_layer<'a, I>(grants: I) -> BTreeMap<&'a str, PermissionState>
where
    I: IntoIterator<Item = &'a Grant>,
{
    let mut merged: BTreeMap<&str, PermissionState> = BTreeMap::new();
    for grant in grants {
        merged
            .entry(grant.permission.as_str())
            .and_modify(|s| *s = (*s).max(grant.state))
            .or_insert(grant.state);
    }
    merged
}

fn apply_layer(acc: &mut BTreeMap<String, PermissionState>, layer: BTreeMap<&str, PermissionState>) {
    for (name, state) in layer {
        acc.entry(name.to_string())
            .and_modify(|current| {
                if *current != PermissionState::Forbidden {
                    *current = state;
                }
            })
            .or_insert(state);
    }
}

/// Final state of every permission mentioned by any layer.
pub fn resolve_states(layers: &GrantLayers) -> BTreeMap<String, PermissionState> {
    let mut states = BTreeMap::new();
    apply_layer(&mut states, merge_layer(&layers.role));
    apply_layer(&mut states, merge_layer(layers.groups.iter().flatten()));
    apply_layer(&mut states, merge_layer(&layers.direct));
    states
}

/// Permission names whose final state is `Included`.
pub fn effective_scope(layers: &GrantLayers) -> EffectiveScope {
    resolve_states(layers)
        .into_iter()
        .filter(|(_, state)| *state == PermissionState::Included)
        .map(|(name, _)| name)
        .collect()
}

/// Record-ownership token for a principal: `prefix` followed by the
/// hex SHA-256 of the principal id.
pub fn ownership_token(prefix: &str, principal_id: Uuid) -> String {
    let mut hasher = Sha256::new();
    hasher.update(principal_id.to_string().as_bytes());
    format!("{prefix}{}", hex::encode(hasher.finalize()))
}

/// The resolved set of scope tokens a principal holds for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectiveScope(BTreeSet<String>);

impl EffectiveScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }

    pub fn contains_any<'a, I>(&self, tokens: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        tokens.into_iter().any(|t| self.0.contains(t))
    }

    pub fn contains_all<'a, I>(&self, tokens: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        tokens.into_iter().all(|t| self.0.contains(t))
    }

    pub fn is_root(&self, root_token: &str) -> bool {
        self.0.contains(root_token)
    }

    pub fn insert(&mut self, token: impl Into<String>) -> bool {
        self.0.insert(token.into())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for EffectiveScope {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
