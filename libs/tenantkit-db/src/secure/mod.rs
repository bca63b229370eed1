//! Secure ORM layer for tenant-scoped database access.
//!
//! Every query against a tenant-scoped table goes through a wrapper that cannot
//! execute until an [`AccessScope`] has been applied (typestate pattern), and the
//! scope of a [`UnitOfWork`] always comes from its tenant context store.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use tenantkit_db::secure::{Scopable, SecureEntityExt};
//! use sea_orm::entity::prelude::*;
//!
//! #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Scopable)]
//! #[sea_orm(table_name = "accounts")]
//! #[secure(tenant_col = "tenant_id", resource_col = "id")]
//! pub struct Model {
//!     #[sea_orm(primary_key, auto_increment = false)]
//!     pub id: Uuid,
//!     pub tenant_id: String,
//!     pub name: String,
//! }
//!
//! let uow = db.begin_unit_of_work(&ctx).await?;
//! let accounts = Entity::find()
//!     .secure()
//!     .scope_with(&uow.scope())
//!     .all(&uow)
//!     .await?;
//! uow.commit().await?;
//! ```
//!
//! # Policy
//!
//! | Scope | Behavior |
//! |-------|----------|
//! | Empty | Deny all (`WHERE false`) |
//! | Tenants only | `tenant_col IN (...)` |
//! | Resources only | `resource_col IN (...)` |
//! | Both | AND them together |
//!
//! On `PostgreSQL` the same rule is also enforced by row-level security policies
//! keyed on [`TENANT_SETTING`], installed by [`migrate::enable_tenant_policy`].

/// Run `$body` against whichever `SeaORM` executor backs `$runner`.
macro_rules! with_runner {
    ($runner:expr, |$c:ident| $body:expr) => {
        match $crate::secure::runner::DBRunnerInternal::as_seaorm($runner) {
            $crate::secure::runner::SeaOrmRunner::Conn($c) => $body,
            $crate::secure::runner::SeaOrmRunner::Tx($c) => $body,
        }
    };
}

mod cond;
mod db;
mod db_ops;
mod entity_traits;
mod error;
pub mod migrate;
pub mod policy;
pub mod provider;
mod repo;
mod runner;
mod select;
mod unit_of_work;

/// Postgres session setting that row-level security policies compare against.
pub const TENANT_SETTING: &str = "app.current_tenant";

pub use cond::{build_scope_condition, like_contains};
pub use db::{Db, DbConn};
pub use db_ops::{
    InsertManyOutcome, SecureDeleteExt, SecureDeleteMany, SecureUpdateExt, SecureUpdateMany,
    secure_insert, secure_insert_many, secure_update_with_scope, validate_tenant_in_scope,
};
pub use entity_traits::ScopableEntity;
pub use error::ScopeError;
pub use provider::{SimpleTenantFilter, TenantFilterProvider};
pub use repo::{RepoError, TenantRepo};
pub use runner::DBRunner;
pub use select::{Scoped, SecureEntityExt, SecureSelect, Unscoped};
pub use unit_of_work::{Outcome, UnitOfWork};

pub use tenantkit_security::{AccessScope, SecurityContext, TenantContextStore};

pub use tenantkit_db_macros::Scopable;
