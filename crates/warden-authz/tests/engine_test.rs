//! End-to-end tests of the authorization engine over in-memory
//! SurrealDB repositories.

use serde_json::json;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;
use warden_authz::{Actor, Assignable, AuthzConfig, AuthzEngine, RecordScopePolicy, ScopeRequirement};
use warden_core::error::WardenError;
use warden_core::models::group::CreateGroup;
use warden_core::models::permission::{CreatePermission, PermissionState};
use warden_core::models::principal::CreatePrincipal;
use warden_core::models::record::{RecordAction, RecordScope};
use warden_core::models::role::{CreateRole, Role};
use warden_core::repository::{
    GroupRepository, Pagination, PermissionRepository, PrincipalRepository, RoleRepository,
};
use warden_db::repository::{
    SurrealGroupRepository, SurrealPermissionRepository, SurrealPrincipalRepository,
    SurrealRecordRepository, SurrealRoleRepository,
};

type Engine = AuthzEngine<
    SurrealPrincipalRepository<Db>,
    SurrealRoleRepository<Db>,
    SurrealGroupRepository<Db>,
    SurrealPermissionRepository<Db>,
    SurrealRecordRepository<Db>,
>;

struct Fixture {
    db: Surreal<Db>,
    engine: Engine,
    super_admin: Role,
    admin: Role,
    user: Role,
    root_id: Uuid,
    admin_id: Uuid,
    alice_id: Uuid,
    bob_id: Uuid,
}

async fn add_principal(db: &Surreal<Db>, username: &str, role: &Role) -> Uuid {
    SurrealPrincipalRepository::new(db.clone())
        .create(CreatePrincipal {
            username: username.into(),
            role_id: role.id,
        })
        .await
        .unwrap()
        .id
}

/// Helper: three ranked roles, a small catalog, one principal per role
/// plus a second user.
async fn setup_with(config: AuthzConfig) -> Fixture {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    warden_db::run_migrations(&db).await.unwrap();

    let permissions = SurrealPermissionRepository::new(db.clone());
    for (name, assign_scope) in [
        ("root", &["Super Admin"][..]),
        ("readUser", &["User", "Admin", "Super Admin"][..]),
        ("createUser", &["Admin", "Super Admin"][..]),
        ("deleteUser", &["Admin", "Super Admin"][..]),
        ("deleteRole", &["Super Admin"][..]),
    ] {
        permissions
            .create(CreatePermission {
                name: name.into(),
                description: String::new(),
                assign_scope: assign_scope.iter().map(|s| s.to_string()).collect(),
            })
            .await
            .unwrap();
    }

    let roles = SurrealRoleRepository::new(db.clone());
    let mut created = Vec::new();
    for (name, rank) in [("Super Admin", 0), ("Admin", 1), ("User", 2)] {
        created.push(
            roles
                .create(CreateRole {
                    name: name.into(),
                    rank,
                    description: String::new(),
                })
                .await
                .unwrap(),
        );
    }
    let (super_admin, admin, user) = (created[0].clone(), created[1].clone(), created[2].clone());

    let role_grants = [
        (&super_admin, "root"),
        (&admin, "readUser"),
        (&admin, "createUser"),
        (&admin, "deleteUser"),
        (&user, "readUser"),
    ];
    for (role, permission) in role_grants {
        roles
            .grant_permission(role.id, permission, PermissionState::Included)
            .await
            .unwrap();
    }

    let root_id = add_principal(&db, "root", &super_admin).await;
    let admin_id = add_principal(&db, "admin", &admin).await;
    let alice_id = add_principal(&db, "alice", &user).await;
    let bob_id = add_principal(&db, "bob", &user).await;

    let record_scope_key = config.record_scope_key.clone();
    let engine = AuthzEngine::new(
        SurrealPrincipalRepository::new(db.clone()),
        SurrealRoleRepository::new(db.clone()),
        SurrealGroupRepository::new(db.clone()),
        SurrealPermissionRepository::new(db.clone()),
        SurrealRecordRepository::new(db.clone(), &record_scope_key).unwrap(),
        config,
    )
    .await
    .unwrap();

    Fixture {
        db,
        engine,
        super_admin,
        admin,
        user,
        root_id,
        admin_id,
        alice_id,
        bob_id,
    }
}

async fn setup() -> Fixture {
    setup_with(AuthzConfig::default()).await
}

impl Fixture {
    async fn actor(&self, id: Uuid) -> Actor {
        self.engine.resolve_effective_scope(id).await.unwrap()
    }

    async fn group_with(&self, name: &str, grants: &[(&str, PermissionState)]) -> Uuid {
        let groups = SurrealGroupRepository::new(self.db.clone());
        let group = groups
            .create(CreateGroup {
                name: name.into(),
                description: String::new(),
            })
            .await
            .unwrap();
        for (permission, state) in grants {
            groups.set_grant(group.id, permission, *state).await.unwrap();
        }
        group.id
    }
}

fn is_denied(err: &WardenError) -> bool {
    matches!(err, WardenError::AuthorizationDenied { .. })
}

fn requirement(tokens: &[&str]) -> ScopeRequirement {
    ScopeRequirement::parse(tokens).unwrap()
}

// -----------------------------------------------------------------------
// Scope resolution
// -----------------------------------------------------------------------

#[tokio::test]
async fn scope_includes_role_grants_and_synthetic_tokens() {
    let fx = setup().await;
    let alice = fx.actor(fx.alice_id).await;

    assert!(alice.scope.contains("readUser"));
    assert!(!alice.scope.contains("createUser"));
    assert!(alice.scope.contains("User"));
    assert!(alice.scope.iter().any(|t| t.starts_with("user-")));
    assert_eq!(alice.role.id, fx.user.id);
}

#[tokio::test]
async fn group_forbidden_beats_direct_inclusion() {
    let fx = setup().await;
    let restricted = fx
        .group_with("Restricted", &[("readUser", PermissionState::Forbidden)])
        .await;

    let groups = SurrealGroupRepository::new(fx.db.clone());
    groups.add_member(fx.alice_id, restricted).await.unwrap();

    let principals = SurrealPrincipalRepository::new(fx.db.clone());
    principals
        .grant_direct(fx.alice_id, "readUser", PermissionState::Included)
        .await
        .unwrap();
    principals
        .grant_direct(fx.alice_id, "createUser", PermissionState::Included)
        .await
        .unwrap();

    let alice = fx.actor(fx.alice_id).await;
    assert!(!alice.scope.contains("readUser"));
    assert!(alice.scope.contains("createUser"));
}

#[tokio::test]
async fn direct_exclusion_overrides_group_inclusion() {
    let fx = setup().await;
    let editors = fx
        .group_with("Editors", &[("deleteUser", PermissionState::Included)])
        .await;

    SurrealGroupRepository::new(fx.db.clone())
        .add_member(fx.bob_id, editors)
        .await
        .unwrap();
    assert!(fx.actor(fx.bob_id).await.scope.contains("deleteUser"));

    SurrealPrincipalRepository::new(fx.db.clone())
        .grant_direct(fx.bob_id, "deleteUser", PermissionState::Excluded)
        .await
        .unwrap();
    assert!(!fx.actor(fx.bob_id).await.scope.contains("deleteUser"));
}

#[tokio::test]
async fn unknown_principal_is_not_found() {
    let fx = setup().await;
    let err = fx
        .engine
        .resolve_effective_scope(Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::NotFound { .. }));
}

// -----------------------------------------------------------------------
// Route authorization
// -----------------------------------------------------------------------

#[tokio::test]
async fn route_requirements_are_matched() {
    let fx = setup().await;
    let alice = fx.actor(fx.alice_id).await;
    let admin = fx.actor(fx.admin_id).await;
    let ctx = alice.request_context(fx.engine.config());

    fx.engine
        .authorize_route(&alice, &requirement(&["readUser"]), &ctx)
        .unwrap();

    let err = fx
        .engine
        .authorize_route(&alice, &requirement(&["+deleteUser"]), &ctx)
        .unwrap_err();
    assert!(is_denied(&err));

    let admin_ctx = admin.request_context(fx.engine.config());
    let err = fx
        .engine
        .authorize_route(&admin, &requirement(&["readUser", "!deleteUser"]), &admin_ctx)
        .unwrap_err();
    assert!(is_denied(&err));
}

#[tokio::test]
async fn templated_requirement_resolves_from_request() {
    let fx = setup().await;
    let alice = fx.actor(fx.alice_id).await;
    let req = requirement(&["+{params.role}"]);

    let ctx = alice.request_context(fx.engine.config()).with_param("role", "User");
    fx.engine.authorize_route(&alice, &req, &ctx).unwrap();

    let ctx = alice.request_context(fx.engine.config()).with_param("role", "Admin");
    assert!(is_denied(&fx.engine.authorize_route(&alice, &req, &ctx).unwrap_err()));

    let ctx = alice.request_context(fx.engine.config());
    let err = fx.engine.authorize_route(&alice, &req, &ctx).unwrap_err();
    assert!(matches!(err, WardenError::Configuration(_)));
}

#[tokio::test]
async fn root_passes_every_route() {
    let fx = setup().await;
    let root = fx.actor(fx.root_id).await;
    let ctx = root.request_context(fx.engine.config());

    fx.engine
        .authorize_route(&root, &requirement(&["+deleteRole", "+neverGranted"]), &ctx)
        .unwrap();
}

// -----------------------------------------------------------------------
// Record scope
// -----------------------------------------------------------------------

fn article_policy() -> RecordScopePolicy {
    RecordScopePolicy::creator_owned(RecordScope {
        root: vec!["Admin".into()],
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn owners_and_admins_see_records() {
    let fx = setup().await;
    let alice = fx.actor(fx.alice_id).await;
    let bob = fx.actor(fx.bob_id).await;
    let admin = fx.actor(fx.admin_id).await;
    let policy = article_policy();

    let mut alice_rows = Vec::new();
    for n in 0..3 {
        alice_rows.push(
            fx.engine
                .create_record(&alice, "article", &policy, json!({ "n": n }))
                .await
                .unwrap(),
        );
        fx.engine
            .create_record(&bob, "article", &policy, json!({ "n": n }))
            .await
            .unwrap();
    }

    let page = fx
        .engine
        .list_records(&alice, "article", Pagination { offset: 0, limit: 2 })
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 2);

    let page = fx
        .engine
        .list_records(&admin, "article", Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 6);

    let first = &alice_rows[0];
    fx.engine
        .find_record(&alice, "article", first.id, RecordAction::Update)
        .await
        .unwrap();
    let err = fx
        .engine
        .find_record(&bob, "article", first.id, RecordAction::Read)
        .await
        .unwrap_err();
    assert!(is_denied(&err));
}

#[tokio::test]
async fn bulk_delete_keeps_only_authorized_targets() {
    let fx = setup().await;
    let alice = fx.actor(fx.alice_id).await;
    let bob = fx.actor(fx.bob_id).await;
    let policy = article_policy();

    let b1 = fx.engine.create_record(&bob, "article", &policy, json!({})).await.unwrap();
    let a1 = fx.engine.create_record(&alice, "article", &policy, json!({})).await.unwrap();
    let b2 = fx.engine.create_record(&bob, "article", &policy, json!({})).await.unwrap();

    let deleted = fx
        .engine
        .delete_many(&alice, "article", &[b1.id, a1.id, b2.id])
        .await
        .unwrap();
    assert_eq!(deleted, vec![a1.id]);

    let err = fx
        .engine
        .delete_many(&alice, "article", &[b1.id, b2.id])
        .await
        .unwrap_err();
    assert!(is_denied(&err));

    let remaining = fx
        .engine
        .list_records(&bob, "article", Pagination::default())
        .await
        .unwrap();
    assert_eq!(remaining.total, 2);
}

#[tokio::test]
async fn bulk_requests_are_bounded() {
    let fx = setup_with(AuthzConfig {
        max_bulk_targets: 2,
        ..Default::default()
    })
    .await;
    let alice = fx.actor(fx.alice_id).await;

    let ids = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
    let err = fx.engine.delete_many(&alice, "article", &ids).await.unwrap_err();
    assert!(matches!(err, WardenError::Validation { .. }));
}

#[tokio::test]
async fn record_scope_can_be_shared_by_its_owner() {
    let fx = setup().await;
    let alice = fx.actor(fx.alice_id).await;
    let bob = fx.actor(fx.bob_id).await;

    let row = fx
        .engine
        .create_record(&alice, "article", &article_policy(), json!({}))
        .await
        .unwrap();

    let err = fx
        .engine
        .add_record_scope(&bob, "article", row.id, RecordAction::Read, vec!["User".into()])
        .await
        .unwrap_err();
    assert!(is_denied(&err));

    fx.engine
        .add_record_scope(&alice, "article", row.id, RecordAction::Read, vec!["User".into()])
        .await
        .unwrap();
    fx.engine
        .find_record(&bob, "article", row.id, RecordAction::Read)
        .await
        .unwrap();

    fx.engine
        .remove_record_scope(&alice, "article", row.id, RecordAction::Read, vec!["User".into()])
        .await
        .unwrap();
    assert!(
        fx.engine
            .find_record(&bob, "article", row.id, RecordAction::Read)
            .await
            .is_err()
    );
}

// -----------------------------------------------------------------------
// Rank and assignment guards
// -----------------------------------------------------------------------

#[tokio::test]
async fn rank_guard_blocks_peers_and_superiors() {
    let fx = setup().await;
    let admin = fx.actor(fx.admin_id).await;
    let peer_id = add_principal(&fx.db, "admin2", &fx.admin).await;

    fx.engine
        .guard_rank(&admin, &[fx.alice_id, fx.bob_id])
        .await
        .unwrap();

    let err = fx
        .engine
        .guard_rank(&admin, &[fx.alice_id, peer_id])
        .await
        .unwrap_err();
    assert!(is_denied(&err));

    let err = fx.engine.guard_rank(&admin, &[fx.root_id]).await.unwrap_err();
    assert!(is_denied(&err));
}

#[tokio::test]
async fn promotion_is_capped_below_own_rank() {
    let fx = setup().await;
    let admin = fx.actor(fx.admin_id).await;

    let err = fx
        .engine
        .assign_role(&admin, fx.alice_id, fx.admin.id)
        .await
        .unwrap_err();
    assert!(is_denied(&err));

    let root = fx.actor(fx.root_id).await;
    fx.engine
        .assign_role(&root, fx.alice_id, fx.admin.id)
        .await
        .unwrap();
    assert_eq!(fx.actor(fx.alice_id).await.role.id, fx.admin.id);
}

#[tokio::test]
async fn assignment_requires_assign_scope() {
    let fx = setup().await;
    let admin = fx.actor(fx.admin_id).await;

    fx.engine
        .grant_to_principal(&admin, fx.alice_id, "createUser", PermissionState::Included)
        .await
        .unwrap();
    assert!(fx.actor(fx.alice_id).await.scope.contains("createUser"));

    let err = fx
        .engine
        .grant_to_principal(&admin, fx.alice_id, "deleteRole", PermissionState::Included)
        .await
        .unwrap_err();
    assert!(is_denied(&err));
    assert!(!fx.actor(fx.alice_id).await.scope.contains("deleteRole"));

    let err = fx
        .engine
        .guard_assignment(&admin, &Assignable::Permission("ghost".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::Configuration(_)));
}

#[tokio::test]
async fn group_assignment_checks_included_permissions() {
    let fx = setup().await;
    let admin = fx.actor(fx.admin_id).await;

    let escalating = fx
        .group_with("Escalating", &[("deleteRole", PermissionState::Included)])
        .await;
    let err = fx
        .engine
        .add_to_group(&admin, fx.alice_id, escalating)
        .await
        .unwrap_err();
    assert!(is_denied(&err));

    let restrictive = fx
        .group_with("Restrictive", &[("deleteRole", PermissionState::Forbidden)])
        .await;
    fx.engine
        .add_to_group(&admin, fx.alice_id, restrictive)
        .await
        .unwrap();
}

#[tokio::test]
async fn role_permission_changes_are_guarded() {
    let fx = setup().await;
    let admin = fx.actor(fx.admin_id).await;

    fx.engine
        .grant_to_role(&admin, fx.user.id, "createUser", PermissionState::Included)
        .await
        .unwrap();
    assert!(fx.actor(fx.bob_id).await.scope.contains("createUser"));

    let err = fx
        .engine
        .grant_to_role(&admin, fx.user.id, "deleteRole", PermissionState::Included)
        .await
        .unwrap_err();
    assert!(is_denied(&err));

    let root = fx.actor(fx.root_id).await;
    fx.engine
        .guard_assignment(
            &root,
            &Assignable::RolePermission {
                role: fx.super_admin.id,
                permission: "deleteRole".into(),
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn role_grants_only_reach_lower_roles() {
    let fx = setup().await;
    SurrealPermissionRepository::new(fx.db.clone())
        .create(CreatePermission {
            name: "exportUser".into(),
            description: String::new(),
            assign_scope: ["Admin".to_string()].into_iter().collect(),
        })
        .await
        .unwrap();
    fx.engine.reload_catalog().await.unwrap();
    let admin = fx.actor(fx.admin_id).await;

    // Assignable, but granting it to the actor's own role would raise
    // the actor's access.
    let err = fx
        .engine
        .grant_to_role(&admin, fx.admin.id, "exportUser", PermissionState::Included)
        .await
        .unwrap_err();
    assert!(is_denied(&err));
    assert!(!fx.actor(fx.admin_id).await.scope.contains("exportUser"));

    let err = fx
        .engine
        .grant_to_role(&admin, fx.super_admin.id, "readUser", PermissionState::Forbidden)
        .await
        .unwrap_err();
    assert!(is_denied(&err));
    let super_admin_grants = SurrealRoleRepository::new(fx.db.clone())
        .role_grants(fx.super_admin.id)
        .await
        .unwrap();
    assert!(super_admin_grants.iter().all(|g| g.permission != "readUser"));

    fx.engine
        .grant_to_role(&admin, fx.user.id, "exportUser", PermissionState::Included)
        .await
        .unwrap();
    assert!(fx.actor(fx.alice_id).await.scope.contains("exportUser"));
}

#[tokio::test]
async fn catalog_reload_picks_up_new_permissions() {
    let fx = setup().await;
    let admin = fx.actor(fx.admin_id).await;

    SurrealPermissionRepository::new(fx.db.clone())
        .create(CreatePermission {
            name: "exportUser".into(),
            description: String::new(),
            assign_scope: ["Admin".to_string()].into_iter().collect(),
        })
        .await
        .unwrap();

    let target = Assignable::Permission("exportUser".into());
    assert!(fx.engine.guard_assignment(&admin, &target).await.is_err());

    fx.engine.reload_catalog().await.unwrap();
    fx.engine.guard_assignment(&admin, &target).await.unwrap();
}
