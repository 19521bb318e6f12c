//! Rank guard: who may act on whom in the role hierarchy.
//!
//! Lower rank means higher privilege. An actor may only act on
//! principals strictly below it, and may only hand out roles strictly
//! below its own.

use crate::error::AuthzError;

/// `true` iff `actor_rank` is strictly more privileged than `target_rank`.
pub fn can_act(actor_rank: i64, target_rank: i64) -> bool {
    actor_rank < target_rank
}

/// All-or-nothing check over every target of a (possibly bulk) mutation.
pub fn guard_targets(actor_rank: i64, target_ranks: &[i64]) -> Result<(), AuthzError> {
    match target_ranks.iter().find(|t| !can_act(actor_rank, **t)) {
        Some(_) => Err(AuthzError::InsufficientRank),
        None => Ok(()),
    }
}

/// Promotion check: compares against the rank of the role being
/// assigned, not the target's current role.
pub fn guard_promotion(actor_rank: i64, assigned_role_rank: i64) -> Result<(), AuthzError> {
    if can_act(actor_rank, assigned_role_rank) {
        Ok(())
    } else {
        Err(AuthzError::InsufficientRank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUPER_ADMIN: i64 = 0;
    const ADMIN: i64 = 1;
    const USER: i64 = 2;

    #[test]
    fn admin_acts_only_below_itself() {
        assert!(can_act(ADMIN, USER));
        assert!(!can_act(ADMIN, SUPER_ADMIN));
        assert!(!can_act(ADMIN, ADMIN));
    }

    #[test]
    fn bulk_targets_fail_closed() {
        assert!(guard_targets(ADMIN, &[USER, USER]).is_ok());
        assert_eq!(
            guard_targets(ADMIN, &[USER, ADMIN, USER]),
            Err(AuthzError::InsufficientRank)
        );
        assert!(guard_targets(ADMIN, &[]).is_ok());
    }

    #[test]
    fn promotion_to_own_rank_is_denied() {
        assert!(guard_promotion(ADMIN, USER).is_ok());
        assert_eq!(
            guard_promotion(ADMIN, ADMIN),
            Err(AuthzError::InsufficientRank)
        );
        assert_eq!(
            guard_promotion(ADMIN, SUPER_ADMIN),
            Err(AuthzError::InsufficientRank)
        );
    }
}
