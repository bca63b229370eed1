use sea_orm::{ColumnTrait, Condition, EntityTrait, sea_query::Expr};

use crate::secure::{AccessScope, ScopableEntity};

/// Builds the tenant part of a scope condition.
///
/// Kept behind a trait so a hierarchical provider (parent tenants seeing child
/// tenants) can replace the flat one without touching callers.
pub trait TenantFilterProvider {
    /// - `None` when the scope names no tenants
    /// - deny-all when the entity has no tenant column but tenants were requested
    /// - `tenant_col IN (...)` otherwise
    fn tenant_condition<E>(scope: &AccessScope) -> Option<Condition>
    where
        E: ScopableEntity + EntityTrait,
        E::Column: ColumnTrait + Copy;
}

/// Exact-match tenant filter: `tenant_col IN (scope.tenant_ids)`.
///
/// Tenant ids are bound as parameters and compared verbatim.
pub struct SimpleTenantFilter;

impl TenantFilterProvider for SimpleTenantFilter {
    fn tenant_condition<E>(scope: &AccessScope) -> Option<Condition>
    where
        E: ScopableEntity + EntityTrait,
        E::Column: ColumnTrait + Copy,
    {
        if scope.tenant_ids().is_empty() {
            return None;
        }

        let Some(tcol) = E::tenant_col() else {
            return Some(Condition::all().add(Expr::value(false)));
        };

        Some(Condition::all().add(tcol.is_in(scope.tenant_ids().to_vec())))
    }
}
