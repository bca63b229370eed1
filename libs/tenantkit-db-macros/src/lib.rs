// Proc-macro crate for tenantkit-db secure ORM derives
//
//! # tenantkit-db-macros
//!
//! ## `#[derive(Scopable)]`
//!
//! Implements `ScopableEntity` for a `SeaORM` entity from `#[secure(...)]` attributes.
//!
//! Both scope dimensions must be decided explicitly; there are no implicit defaults.
//!
//! ```ignore
//! use sea_orm::entity::prelude::*;
//! use tenantkit_db::secure::Scopable;
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
//! ```
//!
//! ### Attributes
//!
//! - **Tenant**: `tenant_col = "column_name"` OR `no_tenant`
//! - **Resource**: `resource_col = "column_name"` OR `no_resource`
//! - **Unrestricted**: `unrestricted` (forbids all other attributes)

use proc_macro::TokenStream;
use proc_macro_error2::proc_macro_error;
use syn::{DeriveInput, parse_macro_input};

mod scopable;

/// Derive macro for implementing `ScopableEntity`.
///
/// Place this on the `SeaORM` `Model` struct next to `#[secure(...)]`.
///
/// - `tenant_col = "column_name"` OR `no_tenant`
/// - `resource_col = "column_name"` OR `no_resource`
/// - `unrestricted` marks a global entity and forbids every other attribute
#[proc_macro_derive(Scopable, attributes(secure))]
#[proc_macro_error]
pub fn derive_scopable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    scopable::expand_derive_scopable(input).into()
}
