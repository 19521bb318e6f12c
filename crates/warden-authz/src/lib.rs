//! Warden Authz: effective-scope resolution, scope expression
//! matching, rank and assignment guards, and record-level authorization.

pub mod algebra;
pub mod assignment;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod expression;
pub mod rank;
pub mod record;

pub use algebra::{EffectiveScope, GrantLayers};
pub use assignment::Assignable;
pub use catalog::PermissionCatalog;
pub use config::AuthzConfig;
pub use engine::{Actor, AuthzEngine};
pub use error::AuthzError;
pub use expression::{RequestContext, ScopeRequirement};
pub use record::{RecordPredicate, RecordScopePolicy};
