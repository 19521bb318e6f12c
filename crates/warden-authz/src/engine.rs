//! Authorization engine: orchestrates scope resolution, the rank and
//! assignment guards, route matching and record-level checks.

use std::sync::Arc;

use futures::future::try_join_all;
use parking_lot::RwLock;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::permission::PermissionState;
use warden_core::models::principal::Principal;
use warden_core::models::record::{RecordAction, RecordScope, StoredRecord, validate_token};
use warden_core::models::role::Role;
use warden_core::repository::{
    GroupRepository, PaginatedResult, Pagination, PermissionRepository, PrincipalRepository,
    RecordRepository, RoleRepository,
};

use crate::algebra::{EffectiveScope, GrantLayers, effective_scope, ownership_token};
use crate::assignment::{self, Assignable};
use crate::catalog::PermissionCatalog;
use crate::config::AuthzConfig;
use crate::error::AuthzError;
use crate::expression::{RequestContext, ScopeRequirement};
use crate::rank;
use crate::record::{self, RecordPredicate, RecordScopePolicy};

/// A principal with its scope resolved for the current request.
///
/// Built fresh by [`AuthzEngine::resolve_effective_scope`] and dropped
/// with the request; never cached.
#[derive(Debug, Clone)]
pub struct Actor {
    pub principal: Principal,
    pub role: Role,
    pub scope: EffectiveScope,
}

impl Actor {
    /// Credentials-backed request context for resolving scope templates.
    pub fn request_context(&self, config: &AuthzConfig) -> RequestContext {
        let mut user = serde_json::Map::new();
        user.insert(config.primary_key.clone(), json!(self.principal.id.to_string()));
        user.insert("username".into(), json!(self.principal.username));

        let mut credentials = serde_json::Map::new();
        credentials.insert("user".into(), serde_json::Value::Object(user));
        credentials.insert(
            "role".into(),
            json!({ "name": self.role.name, "rank": self.role.rank }),
        );
        credentials.insert(config.scope_key.clone(), json!(self.scope.to_vec()));

        RequestContext::new(serde_json::Value::Object(credentials))
    }
}

/// Authorization engine.
///
/// Generic over repository implementations so that the engine has no
/// dependency on the database crate.
pub struct AuthzEngine<P, R, G, M, D>
where
    P: PrincipalRepository,
    R: RoleRepository,
    G: GroupRepository,
    M: PermissionRepository,
    D: RecordRepository,
{
    principals: P,
    roles: R,
    groups: G,
    permissions: M,
    records: D,
    catalog: RwLock<Arc<PermissionCatalog>>,
    config: AuthzConfig,
}

impl<P, R, G, M, D> AuthzEngine<P, R, G, M, D>
where
    P: PrincipalRepository,
    R: RoleRepository,
    G: GroupRepository,
    M: PermissionRepository,
    D: RecordRepository,
{
    /// Build the engine and load the permission catalog.
    pub async fn new(
        principals: P,
        roles: R,
        groups: G,
        permissions: M,
        records: D,
        config: AuthzConfig,
    ) -> WardenResult<Self> {
        let catalog = PermissionCatalog::new(permissions.list_all().await?);
        info!(permissions = catalog.len(), "Permission catalog loaded");

        Ok(Self {
            principals,
            roles,
            groups,
            permissions,
            records,
            catalog: RwLock::new(Arc::new(catalog)),
            config,
        })
    }

    pub fn config(&self) -> &AuthzConfig {
        &self.config
    }

    /// Current catalog snapshot.
    pub fn catalog(&self) -> Arc<PermissionCatalog> {
        self.catalog.read().clone()
    }

    /// Replace the catalog with a fresh snapshot from storage.
    pub async fn reload_catalog(&self) -> WardenResult<()> {
        let catalog = PermissionCatalog::new(self.permissions.list_all().await?);
        info!(permissions = catalog.len(), "Permission catalog reloaded");
        *self.catalog.write() = Arc::new(catalog);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Scope resolution
    // -----------------------------------------------------------------------

    /// Compute the principal's effective scope from role, group and
    /// direct grants.
    pub async fn resolve_effective_scope(&self, principal_id: Uuid) -> WardenResult<Actor> {
        // 1. Load the principal and its role.
        let (principal, role) = self.principals.find_with_role(principal_id).await?;

        // 2. Load all three grant layers.
        let (role_grants, group_grants, direct_grants) = futures::try_join!(
            self.roles.role_grants(role.id),
            self.groups.grants_of_groups(principal.id),
            self.principals.direct_grants(principal.id),
        )?;

        // 3. Fold role → groups → direct.
        let mut scope = effective_scope(&GrantLayers {
            role: role_grants,
            groups: group_grants,
            direct: direct_grants,
        });

        // 4. Synthetic tokens.
        if self.config.include_role_in_scope {
            scope.insert(role.name.clone());
        }
        scope.insert(ownership_token(&self.config.owner_scope_prefix, principal.id));

        debug!(principal_id = %principal.id, tokens = scope.len(), "Effective scope resolved");

        Ok(Actor {
            principal,
            role,
            scope,
        })
    }

    fn is_root(&self, actor: &Actor) -> bool {
        actor.scope.is_root(&self.config.root_scope)
    }

    fn reject(&self, actor: &Actor, stage: &'static str, err: AuthzError) -> WardenError {
        if err.is_denial() {
            debug!(
                target: "warden::audit",
                principal_id = %actor.principal.id,
                stage,
                reason = %err,
                "Authorization denied"
            );
        } else {
            warn!(
                principal_id = %actor.principal.id,
                stage,
                error = %err,
                "Authorization configuration error"
            );
        }
        err.into()
    }

    fn check_bulk_size(&self, actor: &Actor, stage: &'static str, count: usize) -> WardenResult<()> {
        let max = self.config.max_bulk_targets;
        if count > max {
            debug!(
                principal_id = %actor.principal.id,
                stage,
                count,
                max,
                "Bulk request rejected"
            );
            return Err(AuthzError::TooManyTargets { count, max }.into());
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Route and record checks
    // -----------------------------------------------------------------------

    /// Match the actor's scope against a route's declared requirement.
    pub fn authorize_route(
        &self,
        actor: &Actor,
        requirement: &ScopeRequirement,
        ctx: &RequestContext,
    ) -> WardenResult<()> {
        if self.is_root(actor) {
            return Ok(());
        }
        requirement
            .evaluate(&actor.scope, Some(ctx))
            .map_err(|e| self.reject(actor, "scope", e))
    }

    pub fn authorize_record(
        &self,
        actor: &Actor,
        record_scope: &RecordScope,
        action: RecordAction,
    ) -> WardenResult<()> {
        if self.is_root(actor) {
            return Ok(());
        }
        record::authorize_record(&actor.scope, record_scope, action)
            .map_err(|e| self.reject(actor, "record", e))
    }

    pub fn compile_record_predicate(&self, actor: &Actor, action: RecordAction) -> RecordPredicate {
        record::compile_record_predicate(&actor.scope, action, &self.config.root_scope)
    }

    /// Load one row and return it only if the actor may perform `action`.
    pub async fn find_record(
        &self,
        actor: &Actor,
        model: &str,
        id: Uuid,
        action: RecordAction,
    ) -> WardenResult<StoredRecord> {
        let stored = self.records.get(model, id).await?;
        self.authorize_record(actor, &stored.record_scope, action)?;
        Ok(stored)
    }

    /// Paginated read with the record-scope filter pushed into storage.
    pub async fn list_records(
        &self,
        actor: &Actor,
        model: &str,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<StoredRecord>> {
        let predicate = self.compile_record_predicate(actor, RecordAction::Read);
        self.records
            .query_with_predicate(model, &predicate, pagination)
            .await
    }

    /// Write path: persist the row with its policy-derived record scope.
    pub async fn create_record(
        &self,
        actor: &Actor,
        model: &str,
        policy: &RecordScopePolicy,
        data: serde_json::Value,
    ) -> WardenResult<StoredRecord> {
        let owner = ownership_token(&self.config.owner_scope_prefix, actor.principal.id);
        let record_scope = policy.scope_for_create(&owner);
        record_scope.validate()?;
        self.records.create(model, record_scope, data).await
    }

    /// Bulk delete: fetch id + scope only, drop what the actor may not
    /// delete, then remove the survivors in one batch. Returns the ids
    /// deleted.
    pub async fn delete_many(
        &self,
        actor: &Actor,
        model: &str,
        ids: &[Uuid],
    ) -> WardenResult<Vec<Uuid>> {
        self.check_bulk_size(actor, "record", ids.len())?;

        let candidates = self.records.scopes_for(model, ids).await?;
        let allowed = if self.is_root(actor) {
            let all: Vec<Uuid> = candidates.into_iter().map(|(id, _)| id).collect();
            if all.is_empty() {
                return Err(self.reject(actor, "record", AuthzError::EmptyBulkTarget));
            }
            all
        } else {
            record::filter_authorized(&actor.scope, candidates, RecordAction::Delete)
                .map_err(|e| self.reject(actor, "record", e))?
        };

        let deleted = self.records.delete_many(model, &allowed).await?;
        info!(
            target: "warden::audit",
            principal_id = %actor.principal.id,
            model,
            requested = ids.len(),
            deleted,
            "Bulk delete authorized"
        );
        Ok(allowed)
    }

    /// Add tokens to one action bucket of a row the actor may update.
    pub async fn add_record_scope(
        &self,
        actor: &Actor,
        model: &str,
        id: Uuid,
        action: RecordAction,
        tokens: Vec<String>,
    ) -> WardenResult<RecordScope> {
        for token in &tokens {
            validate_token(token)?;
        }
        self.find_record(actor, model, id, RecordAction::Update).await?;
        self.records.add_scope(model, id, action, tokens).await
    }

    /// Remove tokens from one action bucket of a row the actor may update.
    pub async fn remove_record_scope(
        &self,
        actor: &Actor,
        model: &str,
        id: Uuid,
        action: RecordAction,
        tokens: Vec<String>,
    ) -> WardenResult<RecordScope> {
        self.find_record(actor, model, id, RecordAction::Update).await?;
        self.records.remove_scope(model, id, action, tokens).await
    }

    // -----------------------------------------------------------------------
    // Guards on mutations of other principals' access
    // -----------------------------------------------------------------------

    /// Deny unless the actor outranks every target.
    pub async fn guard_rank(&self, actor: &Actor, target_ids: &[Uuid]) -> WardenResult<()> {
        if self.is_root(actor) {
            return Ok(());
        }
        self.check_bulk_size(actor, "rank", target_ids.len())?;

        let targets = try_join_all(
            target_ids
                .iter()
                .map(|id| self.principals.find_with_role(*id)),
        )
        .await?;
        let ranks: Vec<i64> = targets.iter().map(|(_, role)| role.rank).collect();

        rank::guard_targets(actor.role.rank, &ranks).map_err(|e| self.reject(actor, "rank", e))
    }

    /// Deny assigning a role at or above the actor's own rank.
    pub async fn guard_promotion(&self, actor: &Actor, role_id: Uuid) -> WardenResult<()> {
        if self.is_root(actor) {
            return Ok(());
        }
        let role = self.roles.get_by_id(role_id).await?;
        rank::guard_promotion(actor.role.rank, role.rank).map_err(|e| self.reject(actor, "rank", e))
    }

    /// Deny changing the grants of a role at or above the actor's own
    /// rank. A role's grants reach every principal holding it, the actor
    /// included.
    pub async fn guard_role(&self, actor: &Actor, role_id: Uuid) -> WardenResult<()> {
        if self.is_root(actor) {
            return Ok(());
        }
        let role = self.roles.get_by_id(role_id).await?;
        rank::guard_targets(actor.role.rank, &[role.rank])
            .map_err(|e| self.reject(actor, "rank", e))
    }

    /// Deny granting anything the actor could not assign itself.
    pub async fn guard_assignment(&self, actor: &Actor, target: &Assignable) -> WardenResult<()> {
        if self.is_root(actor) {
            return Ok(());
        }
        let catalog = self.catalog();
        let root = self.config.root_scope.as_str();

        let outcome = match target {
            Assignable::Permission(name) => {
                assignment::guard_permission_names(&actor.scope, &[name], &catalog, root)
            }
            Assignable::Permissions(names) => {
                self.check_bulk_size(actor, "assignment", names.len())?;
                assignment::guard_permission_names(&actor.scope, names, &catalog, root)
            }
            Assignable::Group(group_id) => {
                let grants = self.groups.group_grants(*group_id).await?;
                assignment::guard_group(&actor.scope, &grants, &catalog, root)
            }
            Assignable::RolePermission { role, permission } => {
                self.roles.get_by_id(*role).await?;
                assignment::guard_permission_names(&actor.scope, &[permission], &catalog, root)
            }
        };
        outcome.map_err(|e| self.reject(actor, "assignment", e))
    }

    // -----------------------------------------------------------------------
    // Guarded administrative writes
    // -----------------------------------------------------------------------

    /// Grant a permission directly to another principal.
    pub async fn grant_to_principal(
        &self,
        actor: &Actor,
        target_id: Uuid,
        permission: &str,
        state: PermissionState,
    ) -> WardenResult<()> {
        self.guard_rank(actor, &[target_id]).await?;
        self.guard_assignment(actor, &Assignable::Permission(permission.into())).await?;
        self.principals.grant_direct(target_id, permission, state).await?;
        info!(
            target: "warden::audit",
            principal_id = %actor.principal.id,
            %target_id,
            permission,
            %state,
            "Direct grant applied"
        );
        Ok(())
    }

    /// Add another principal to a group.
    pub async fn add_to_group(
        &self,
        actor: &Actor,
        target_id: Uuid,
        group_id: Uuid,
    ) -> WardenResult<()> {
        self.guard_rank(actor, &[target_id]).await?;
        self.guard_assignment(actor, &Assignable::Group(group_id)).await?;
        self.groups.add_member(target_id, group_id).await?;
        info!(
            target: "warden::audit",
            principal_id = %actor.principal.id,
            %target_id,
            %group_id,
            "Group membership granted"
        );
        Ok(())
    }

    /// Move another principal to a different role.
    pub async fn assign_role(
        &self,
        actor: &Actor,
        target_id: Uuid,
        role_id: Uuid,
    ) -> WardenResult<()> {
        self.guard_rank(actor, &[target_id]).await?;
        self.guard_promotion(actor, role_id).await?;
        self.principals.set_role(target_id, role_id).await?;
        info!(
            target: "warden::audit",
            principal_id = %actor.principal.id,
            %target_id,
            %role_id,
            "Role assigned"
        );
        Ok(())
    }

    /// Associate a permission with a role.
    pub async fn grant_to_role(
        &self,
        actor: &Actor,
        role_id: Uuid,
        permission: &str,
        state: PermissionState,
    ) -> WardenResult<()> {
        self.guard_role(actor, role_id).await?;
        self.guard_assignment(
            actor,
            &Assignable::RolePermission {
                role: role_id,
                permission: permission.into(),
            },
        )
        .await?;
        self.roles.grant_permission(role_id, permission, state).await?;
        info!(
            target: "warden::audit",
            principal_id = %actor.principal.id,
            %role_id,
            permission,
            %state,
            "Role permission granted"
        );
        Ok(())
    }
}
