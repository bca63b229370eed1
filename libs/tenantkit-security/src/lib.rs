#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Tenant isolation primitives shared by the storage layer and the domain modules.
//!
//! - [`TenantContextStore`]: the session-local "current tenant" value.
//! - [`SecurityContext`]: the verified identity of the caller.
//! - [`AccessScope`]: the predicate input derived from the current tenant.
pub mod access_scope;
pub mod context;
pub mod context_store;

pub use access_scope::AccessScope;
pub use context::{SecurityContext, SecurityContextBuilder};
pub use context_store::TenantContextStore;
