//! Record scope authorizer: row-level authorization.
//!
//! Single rows are checked in-process with the scope matcher. Lists
//! are never filtered in memory: the actor's scope is compiled into a
//! [`RecordPredicate`] that the storage layer applies before
//! pagination.

use std::collections::BTreeSet;

use warden_core::error::WardenResult;
use warden_core::models::record::{RecordAction, RecordScope};
pub use warden_core::repository::RecordPredicate;

use crate::algebra::EffectiveScope;
use crate::error::AuthzError;
use crate::expression::ScopeRequirement;

/// Per-model record-scope configuration applied on create.
#[derive(Debug, Clone, Default)]
pub struct RecordScopePolicy {
    /// Statically configured scope every new row starts with.
    pub defaults: RecordScope,
    /// Actions for which the creator's ownership token is granted.
    pub creator_actions: BTreeSet<RecordAction>,
}

impl RecordScopePolicy {
    pub fn new<I>(defaults: RecordScope, creator_actions: I) -> WardenResult<Self>
    where
        I: IntoIterator<Item = RecordAction>,
    {
        defaults.validate()?;
        Ok(Self {
            defaults,
            creator_actions: creator_actions.into_iter().collect(),
        })
    }

    /// Grant the creator every action (read, update, delete, associate,
    /// recover) on top of `defaults`.
    pub fn creator_owned(defaults: RecordScope) -> WardenResult<Self> {
        Self::new(defaults, RecordAction::ALL)
    }

    pub fn authorizes_creator(&self) -> bool {
        !self.creator_actions.is_empty()
    }

    /// Scope persisted with a new row: defaults plus the owner token for
    /// each configured action.
    pub fn scope_for_create(&self, owner_token: &str) -> RecordScope {
        let mut scope = self.defaults.clone();
        for action in &self.creator_actions {
            scope.add_tokens(*action, [owner_token]);
        }
        scope
    }
}

/// Check one row. The action bucket is unioned with `root` and every
/// token is a selection token: any overlap with `scope` passes, and a
/// row with no tokens for the action is unrestricted.
pub fn authorize_record(
    scope: &EffectiveScope,
    record_scope: &RecordScope,
    action: RecordAction,
) -> Result<(), AuthzError> {
    let requirement = ScopeRequirement::parse(record_scope.tokens_for(action))?;
    requirement.evaluate(scope, None).map_err(|e| match e {
        AuthzError::InsufficientScope => AuthzError::InsufficientRecordScope,
        other => other,
    })
}

/// Bulk path: keep the candidates `scope` may act on, in input order.
/// Denies the whole operation when nothing survives.
pub fn filter_authorized<Id>(
    scope: &EffectiveScope,
    candidates: Vec<(Id, RecordScope)>,
    action: RecordAction,
) -> Result<Vec<Id>, AuthzError> {
    let mut allowed = Vec::with_capacity(candidates.len());
    for (id, record_scope) in candidates {
        match authorize_record(scope, &record_scope, action) {
            Ok(()) => allowed.push(id),
            Err(AuthzError::InsufficientRecordScope) => {}
            Err(other) => return Err(other),
        }
    }
    if allowed.is_empty() {
        return Err(AuthzError::EmptyBulkTarget);
    }
    Ok(allowed)
}

/// Compile `scope` into the storage predicate for list queries.
pub fn compile_record_predicate(
    scope: &EffectiveScope,
    action: RecordAction,
    root_token: &str,
) -> RecordPredicate {
    if scope.is_root(root_token) {
        RecordPredicate::Unrestricted
    } else {
        RecordPredicate::ScopeOverlap {
            action,
            tokens: scope.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(tokens: &[&str]) -> EffectiveScope {
        tokens.iter().copied().collect()
    }

    fn owned_by(owner: &str) -> RecordScope {
        RecordScope {
            read: vec![owner.into()],
            update: vec![owner.into()],
            delete: vec![owner.into()],
            root: vec!["Super Admin".into()],
            ..Default::default()
        }
    }

    #[test]
    fn policy_adds_owner_token_to_configured_actions() {
        let defaults = RecordScope {
            read: vec!["Admin".into()],
            ..Default::default()
        };
        let policy =
            RecordScopePolicy::new(defaults, [RecordAction::Read, RecordAction::Update]).unwrap();

        let created = policy.scope_for_create("user-abc");
        assert_eq!(created.read, vec!["Admin".to_string(), "user-abc".to_string()]);
        assert_eq!(created.update, vec!["user-abc".to_string()]);
        assert!(created.delete.is_empty());
        assert!(policy.authorizes_creator());
    }

    #[test]
    fn policy_rejects_invalid_defaults() {
        let defaults = RecordScope {
            root: vec!["+Admin".into()],
            ..Default::default()
        };
        assert!(RecordScopePolicy::new(defaults, []).is_err());
    }

    #[test]
    fn owner_and_root_may_act() {
        let row = owned_by("user-a");
        assert!(authorize_record(&scope(&["user-a"]), &row, RecordAction::Read).is_ok());
        assert!(authorize_record(&scope(&["Super Admin"]), &row, RecordAction::Delete).is_ok());
        assert_eq!(
            authorize_record(&scope(&["user-b"]), &row, RecordAction::Update),
            Err(AuthzError::InsufficientRecordScope)
        );
    }

    #[test]
    fn empty_buckets_are_unrestricted() {
        let row = owned_by("user-a");
        // `associate` is empty on `row`, but its root bucket still applies.
        let unrestricted = RecordScope::default();
        assert!(
            authorize_record(&scope(&["anyone"]), &unrestricted, RecordAction::Associate).is_ok()
        );
        assert!(authorize_record(&scope(&["anyone"]), &row, RecordAction::Associate).is_err());
    }

    #[test]
    fn bulk_filter_reduces_to_matching_ids() {
        let candidates = vec![
            (1, owned_by("user-x")),
            (2, owned_by("user-a")),
            (3, owned_by("user-y")),
        ];
        assert_eq!(
            filter_authorized(&scope(&["user-a"]), candidates, RecordAction::Delete),
            Ok(vec![2])
        );
    }

    #[test]
    fn bulk_filter_denies_when_nothing_matches() {
        let candidates = vec![(1, owned_by("user-x")), (2, owned_by("user-y"))];
        assert_eq!(
            filter_authorized(&scope(&["user-a"]), candidates, RecordAction::Delete),
            Err(AuthzError::EmptyBulkTarget)
        );
        assert_eq!(
            filter_authorized::<u32>(&scope(&["user-a"]), vec![], RecordAction::Delete),
            Err(AuthzError::EmptyBulkTarget)
        );
    }

    #[test]
    fn predicate_agrees_with_single_record_check() {
        let rows = [
            owned_by("user-a"),
            owned_by("user-b"),
            RecordScope::default(),
            RecordScope {
                root: vec!["Admin".into()],
                ..Default::default()
            },
        ];
        for tokens in [
            &["user-a"][..],
            &["Admin"][..],
            &["Super Admin", "user-b"][..],
            &["x"][..],
        ] {
            let s = scope(tokens);
            let predicate = compile_record_predicate(&s, RecordAction::Read, "root");
            for row in &rows {
                assert_eq!(
                    predicate.matches(row),
                    authorize_record(&s, row, RecordAction::Read).is_ok(),
                    "scope {tokens:?} row {row:?}"
                );
            }
        }
    }

    #[test]
    fn root_compiles_to_unrestricted() {
        assert_eq!(
            compile_record_predicate(&scope(&["root"]), RecordAction::Read, "root"),
            RecordPredicate::Unrestricted
        );
        assert_eq!(
            compile_record_predicate(&scope(&["user-a"]), RecordAction::Update, "root"),
            RecordPredicate::ScopeOverlap {
                action: RecordAction::Update,
                tokens: vec!["user-a".into()],
            }
        );
    }
}
