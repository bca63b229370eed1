//! Search filters and aggregate shapes for `transactions`.
//!
//! Filters are plain `Condition`s; the tenant predicate is added by the repository. Every
//! user-supplied value ends up as a bound parameter.

use sea_orm::sea_query::{Alias, Expr, Func, SimpleExpr};
use sea_orm::{ColumnTrait, Condition, FromQueryResult};
use tenantkit_db::secure::{Scoped, SecureSelect, like_contains};
use uuid::Uuid;

use super::entity::transaction::{Column, Entity, TransactionKind};
use crate::domain::models::TransactionQuery;

/// `WHERE` clause for a search.
#[must_use]
pub fn search_condition(q: &TransactionQuery) -> Condition {
    let mut cond = Condition::all();
    if let Some(text) = &q.description_contains {
        cond = cond.add(like_contains(Column::Description, text));
    }
    if !q.tags_any.is_empty() {
        let any = q
            .tags_any
            .iter()
            .fold(Condition::any(), |c, tag| {
                c.add(like_contains(Column::Tags, &format!(",{tag},")))
            });
        cond = cond.add(any);
    }
    if let Some(min) = q.min_amount {
        cond = cond.add(Column::AmountCents.gte(min));
    }
    if let Some(max) = q.max_amount {
        cond = cond.add(Column::AmountCents.lte(max));
    }
    if let Some(account) = q.account_id {
        cond = cond.add(Column::AccountId.eq(account));
    }
    if let Some(from) = q.from {
        cond = cond.add(Column::OccurredAt.gte(from));
    }
    if let Some(to) = q.to {
        cond = cond.add(Column::OccurredAt.lt(to));
    }
    cond
}

/// Expense transactions booked against `category_id`.
#[must_use]
pub fn expenses_in_category(category_id: Uuid) -> Condition {
    Condition::all()
        .add(Column::CategoryId.eq(category_id))
        .add(Column::Kind.eq(TransactionKind::Expense))
}

fn amount() -> Expr {
    Expr::col((Entity, Column::AmountCents))
}

fn as_bigint(expr: impl Into<SimpleExpr>) -> SimpleExpr {
    SimpleExpr::from(Func::cast_as(expr.into(), Alias::new("bigint")))
}

#[derive(Debug, FromQueryResult)]
pub struct StatsRow {
    pub n: i64,
    pub total: Option<i64>,
    pub lowest: Option<i64>,
    pub highest: Option<i64>,
}

/// `COUNT`, `SUM`, `MIN` and `MAX` of `amount_cents`.
#[must_use]
pub fn stats_shape(q: SecureSelect<Entity, Scoped>) -> SecureSelect<Entity, Scoped> {
    q.select_only()
        .column_as(Expr::col((Entity, Column::Id)).count(), "n")
        .column_as(as_bigint(Func::sum(amount())), "total")
        .column_as(as_bigint(Func::min(amount())), "lowest")
        .column_as(as_bigint(Func::max(amount())), "highest")
}

#[derive(Debug, FromQueryResult)]
pub struct CategoryTotalRow {
    pub category_id: Option<Uuid>,
    pub total: Option<i64>,
    pub n: i64,
}

/// Per-category `SUM(amount_cents)` and row count.
#[must_use]
pub fn totals_by_category_shape(q: SecureSelect<Entity, Scoped>) -> SecureSelect<Entity, Scoped> {
    q.select_only()
        .column(Column::CategoryId)
        .column_as(as_bigint(Func::sum(amount())), "total")
        .column_as(Expr::col((Entity, Column::Id)).count(), "n")
        .group_by(Column::CategoryId)
}

#[derive(Debug, FromQueryResult)]
pub struct SumRow {
    pub total: Option<i64>,
}

#[must_use]
pub fn sum_shape(q: SecureSelect<Entity, Scoped>) -> SecureSelect<Entity, Scoped> {
    q.select_only()
        .column_as(as_bigint(Func::sum(amount())), "total")
}

#[cfg(test)]
mod tests {
    use sea_orm::{DbBackend, EntityTrait, QueryFilter, QueryTrait};

    use super::*;

    fn sql(cond: Condition) -> String {
        Entity::find()
            .filter(cond)
            .build(DbBackend::Postgres)
            .to_string()
    }

    #[test]
    fn empty_query_has_no_filters() {
        let cond = search_condition(&TransactionQuery::default());
        assert!(cond.is_empty());
        assert!(sql(cond).contains("WHERE TRUE"));
    }

    #[test]
    fn tag_search_is_fenced_and_escaped() {
        let q = TransactionQuery {
            tags_any: vec!["rent".to_owned(), "50%".to_owned()],
            ..TransactionQuery::default()
        };
        let stmt = Entity::find()
            .filter(search_condition(&q))
            .build(DbBackend::Postgres);
        let values = format!("{:?}", stmt.values);
        assert!(values.contains("%,rent,%"), "{values}");
        assert!(values.contains(r"%,50\\%,%"), "{values}");
        assert!(stmt.sql.contains(" OR "));
    }

    #[test]
    fn description_text_is_a_parameter() {
        let q = TransactionQuery {
            description_contains: Some("'; DROP TABLE transactions; --".to_owned()),
            ..TransactionQuery::default()
        };
        let stmt = Entity::find()
            .filter(search_condition(&q))
            .build(DbBackend::Postgres);
        assert!(!stmt.sql.contains("DROP TABLE"));
        assert!(stmt.sql.contains("LIKE $1 ESCAPE"));
    }
}
