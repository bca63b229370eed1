use sea_orm::{
    ColumnTrait, Condition, EntityTrait,
    sea_query::{Expr, LikeExpr, SimpleExpr},
};

use crate::secure::provider::{SimpleTenantFilter, TenantFilterProvider};
use crate::secure::{AccessScope, ScopableEntity};

/// Builds the `SeaORM` condition for a scope.
///
/// 1. No tenant in scope → deny all (`false`), even when resources are named
/// 2. Tenants → `tenant_col IN (...)`; an entity without a tenant column is denied
/// 3. Resources → `resource_col IN (...)`; an entity without a resource column is denied
/// 4. Both → AND
///
/// Unrestricted entities are only filtered by explicit resource ids.
/// Columns are table-qualified so the condition stays unambiguous in joins.
pub fn build_scope_condition<E>(scope: &AccessScope) -> Condition
where
    E: ScopableEntity + EntityTrait,
    E::Column: ColumnTrait + Copy,
{
    let deny_all = || Condition::all().add(Expr::value(false));

    if scope.is_empty() {
        return deny_all();
    }

    let mut cond = Condition::all();

    if !E::IS_UNRESTRICTED
        && let Some(tenant_cond) = SimpleTenantFilter::tenant_condition::<E>(scope)
    {
        cond = cond.add(tenant_cond);
    }

    if scope.has_resources() {
        let Some(resource_col) = E::resource_col() else {
            return deny_all();
        };
        cond = cond.add(resource_col.is_in(scope.resource_ids().to_vec()));
    }

    cond
}

/// Literal substring match: `col LIKE '%text%' ESCAPE '\'`.
///
/// `%`, `_` and `\` in `text` are escaped, so user input is never a pattern.
pub fn like_contains<C>(col: C, text: &str) -> SimpleExpr
where
    C: ColumnTrait,
{
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    col.like(LikeExpr::new(pattern).escape('\\'))
}
