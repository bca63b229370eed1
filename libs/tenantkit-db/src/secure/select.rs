use sea_orm::{
    ColumnAsExpr, ColumnTrait, Condition, EntityTrait, FromQueryResult, IntoIdentity,
    IntoSimpleExpr, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Related,
};
use std::marker::PhantomData;

use crate::secure::cond::build_scope_condition;
use crate::secure::error::ScopeError;
use crate::secure::runner::DBRunner;
use crate::secure::{AccessScope, ScopableEntity};

/// Largest `LIMIT`/`OFFSET` the drivers can bind.
const MAX_BOUND: u64 = i64::MAX.unsigned_abs();

/// Typestate marker: no scope applied yet, cannot execute.
#[derive(Debug, Clone, Copy)]
pub struct Unscoped;

/// Typestate marker: scope applied, may execute.
#[derive(Debug, Clone, Copy)]
pub struct Scoped;

/// `SeaORM` `Select` that only executes after `.scope_with()`.
///
/// ```rust,ignore
/// let rows = transaction::Entity::find()
///     .secure()              // SecureSelect<E, Unscoped>
///     .scope_with(&scope)    // SecureSelect<E, Scoped>
///     .order_by(transaction::Column::OccurredAt, Order::Desc)
///     .all(&uow)
///     .await?;
/// ```
#[must_use]
#[derive(Clone, Debug)]
pub struct SecureSelect<E: EntityTrait, S> {
    pub(crate) inner: sea_orm::Select<E>,
    pub(crate) _state: PhantomData<S>,
}

/// Turns a `Select` into an unscoped [`SecureSelect`].
pub trait SecureEntityExt<E: EntityTrait>: Sized {
    fn secure(self) -> SecureSelect<E, Unscoped>;
}

impl<E> SecureEntityExt<E> for sea_orm::Select<E>
where
    E: EntityTrait,
{
    fn secure(self) -> SecureSelect<E, Unscoped> {
        SecureSelect {
            inner: self,
            _state: PhantomData,
        }
    }
}

impl<E> SecureSelect<E, Unscoped>
where
    E: ScopableEntity + EntityTrait,
    E::Column: ColumnTrait + Copy,
{
    /// Apply the scope and move to the `Scoped` state.
    pub fn scope_with(self, scope: &AccessScope) -> SecureSelect<E, Scoped> {
        let cond = build_scope_condition::<E>(scope);
        SecureSelect {
            inner: self.inner.filter(cond),
            _state: PhantomData,
        }
    }
}

impl<E> SecureSelect<E, Scoped>
where
    E: EntityTrait,
{
    /// # Errors
    /// Returns `ScopeError::Db` if the query fails.
    pub async fn all(self, runner: &impl DBRunner) -> Result<Vec<E::Model>, ScopeError> {
        Ok(with_runner!(runner, |c| self.inner.all(c).await)?)
    }

    /// # Errors
    /// Returns `ScopeError::Db` if the query fails.
    pub async fn one(self, runner: &impl DBRunner) -> Result<Option<E::Model>, ScopeError> {
        Ok(with_runner!(runner, |c| self.inner.one(c).await)?)
    }

    /// Number of rows visible in the scope.
    ///
    /// # Errors
    /// Returns `ScopeError::Db` if the query fails.
    pub async fn count(self, runner: &impl DBRunner) -> Result<u64, ScopeError>
    where
        E::Model: FromQueryResult + Send + Sync,
    {
        Ok(with_runner!(runner, |c| self.inner.count(c).await)?)
    }

    /// Execute a projection (`select_only` + `column_as` + `group_by`) into a custom row type.
    ///
    /// # Errors
    /// Returns `ScopeError::Db` if the query fails or a row does not decode into `M`.
    pub async fn all_as<M>(self, runner: &impl DBRunner) -> Result<Vec<M>, ScopeError>
    where
        M: FromQueryResult + Send + Sync,
    {
        Ok(with_runner!(runner, |c| self.inner.into_model::<M>().all(c).await)?)
    }

    /// Narrow to a single resource id.
    ///
    /// # Errors
    /// Returns `ScopeError::Invalid` if the entity has no resource column.
    pub fn and_id(self, id: uuid::Uuid) -> Result<Self, ScopeError>
    where
        E: ScopableEntity,
        E::Column: ColumnTrait + Copy,
    {
        let resource_col = E::resource_col().ok_or(ScopeError::Invalid(
            "Entity must have a resource_col to use and_id()",
        ))?;
        Ok(self.filter(Condition::all().add(resource_col.eq(id))))
    }

    /// Additional filter. The scope condition stays in place.
    pub fn filter(mut self, filter: Condition) -> Self {
        self.inner = QueryFilter::filter(self.inner, filter);
        self
    }

    pub fn order_by<C>(mut self, col: C, order: sea_orm::Order) -> Self
    where
        C: IntoSimpleExpr,
    {
        self.inner = QueryOrder::order_by(self.inner, col, order);
        self
    }

    /// Values above `i64::MAX` are clamped; the drivers bind `LIMIT` as a signed integer.
    pub fn limit(mut self, limit: u64) -> Self {
        self.inner = QuerySelect::limit(self.inner, limit.min(MAX_BOUND));
        self
    }

    /// Clamped like [`Self::limit`].
    pub fn offset(mut self, offset: u64) -> Self {
        self.inner = QuerySelect::offset(self.inner, offset.min(MAX_BOUND));
        self
    }

    /// Clear the default column list before adding projections.
    pub fn select_only(mut self) -> Self {
        self.inner = QuerySelect::select_only(self.inner);
        self
    }

    pub fn column<C>(mut self, col: C) -> Self
    where
        C: sea_orm::ColumnTrait,
    {
        self.inner = QuerySelect::column(self.inner, col);
        self
    }

    /// Add a projected expression under an alias, e.g. `SUM(amount_cents) AS total`.
    pub fn column_as<C, A>(mut self, expr: C, alias: A) -> Self
    where
        C: ColumnAsExpr,
        A: IntoIdentity,
    {
        self.inner = QuerySelect::column_as(self.inner, expr, alias);
        self
    }

    pub fn group_by<C>(mut self, col: C) -> Self
    where
        C: IntoSimpleExpr,
    {
        self.inner = QuerySelect::group_by(self.inner, col);
        self
    }

    /// Apply the scope of a joined entity `J` as well.
    ///
    /// Use after a join on `J` so both sides of the join are tenant-filtered.
    /// An empty scope denies all rows.
    pub fn and_scope_for<J>(mut self, scope: &AccessScope) -> Self
    where
        J: ScopableEntity + EntityTrait,
        J::Column: ColumnTrait + Copy,
    {
        self.inner = QueryFilter::filter(self.inner, build_scope_condition::<J>(scope));
        self
    }

    /// `INNER JOIN` a related entity and apply its scope in the same step.
    pub fn inner_join_scoped<J>(mut self, scope: &AccessScope) -> Self
    where
        E: Related<J>,
        J: ScopableEntity + EntityTrait,
        J::Column: ColumnTrait + Copy,
    {
        self.inner = QuerySelect::join(
            self.inner,
            sea_orm::JoinType::InnerJoin,
            <E as Related<J>>::to(),
        );
        self.and_scope_for::<J>(scope)
    }
}
