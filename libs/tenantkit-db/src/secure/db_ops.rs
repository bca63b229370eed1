//! Scoped write operations: insert, update and bulk update/delete.

use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ActiveValue, ColumnTrait, DbErr, EntityTrait,
    IdenStatic, IntoActiveModel, ModelTrait, QueryFilter, QueryTrait,
    sea_query::{Iden, SimpleExpr, ValueType},
};
use std::marker::PhantomData;

use crate::secure::cond::build_scope_condition;
use crate::secure::error::ScopeError;
use crate::secure::runner::DBRunner;
use crate::secure::{AccessScope, ScopableEntity, Scoped, SecureEntityExt, Unscoped};

/// Tenant value an active model is about to write, checked against the scope.
///
/// `Ok(())` for unrestricted entities. Everything else must carry a tenant column that is
/// set and listed in the scope.
fn check_insert_tenant<E>(am: &E::ActiveModel, scope: &AccessScope) -> Result<(), ScopeError>
where
    E: ScopableEntity + EntityTrait,
    E::Column: ColumnTrait + Copy,
    E::ActiveModel: ActiveModelTrait<Entity = E>,
{
    if E::IS_UNRESTRICTED {
        return Ok(());
    }
    let Some(tcol) = E::tenant_col() else {
        return Err(ScopeError::Denied("entity is not tenant-scoped"));
    };
    let value = match am.get(tcol) {
        ActiveValue::Set(v) | ActiveValue::Unchanged(v) => v,
        ActiveValue::NotSet => return Err(ScopeError::Denied("tenant_id must be set")),
    };
    let tenant_id = <String as ValueType>::try_from(value)
        .map_err(|_| ScopeError::Invalid("tenant column must hold a string"))?;
    validate_tenant_in_scope(&tenant_id, scope)
}

/// Insert one row after checking its tenant against the scope.
///
/// A row for another tenant is rejected, never rewritten to the current one.
///
/// # Errors
/// - `ScopeError::Denied` if the tenant column is unset or outside the scope
/// - `ScopeError::Db` if the insert fails
pub async fn secure_insert<E>(
    am: E::ActiveModel,
    scope: &AccessScope,
    runner: &impl DBRunner,
) -> Result<E::Model, ScopeError>
where
    E: ScopableEntity + EntityTrait,
    E::Column: ColumnTrait + Copy,
    E::ActiveModel: ActiveModelTrait<Entity = E> + ActiveModelBehavior + Send,
    E::Model: IntoActiveModel<E::ActiveModel>,
{
    check_insert_tenant::<E>(&am, scope)?;
    Ok(with_runner!(runner, |c| am.insert(c).await)?)
}

/// Result of [`secure_insert_many`].
#[derive(Debug, Clone)]
pub struct InsertManyOutcome<M> {
    /// Rows written, in input order.
    pub inserted: Vec<M>,
    /// Input positions skipped because their tenant was outside the scope.
    pub rejected: Vec<usize>,
}

impl<M> InsertManyOutcome<M> {
    #[must_use]
    pub fn inserted_count(&self) -> u64 {
        self.inserted.len() as u64
    }
}

/// Insert each row that passes the tenant check and skip the rest.
///
/// # Errors
/// Returns `ScopeError::Db` if an insert fails; tenant mismatches are reported in
/// [`InsertManyOutcome::rejected`] instead.
pub async fn secure_insert_many<E, I>(
    ams: I,
    scope: &AccessScope,
    runner: &impl DBRunner,
) -> Result<InsertManyOutcome<E::Model>, ScopeError>
where
    I: IntoIterator<Item = E::ActiveModel> + Send,
    I::IntoIter: Send,
    E: ScopableEntity + EntityTrait,
    E::Column: ColumnTrait + Copy,
    E::ActiveModel: ActiveModelTrait<Entity = E> + ActiveModelBehavior + Send,
    E::Model: IntoActiveModel<E::ActiveModel>,
{
    let mut out = InsertManyOutcome {
        inserted: Vec::new(),
        rejected: Vec::new(),
    };
    for (idx, am) in ams.into_iter().enumerate() {
        match check_insert_tenant::<E>(&am, scope) {
            Ok(()) => {
                let model = with_runner!(runner, |c| am.insert(c).await)?;
                out.inserted.push(model);
            }
            Err(ScopeError::Denied(_) | ScopeError::Invalid(_)) => out.rejected.push(idx),
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}

/// Update one visible row.
///
/// The row is looked up through the scope first; rows of other tenants and rows that do
/// not exist both produce `ScopeError::NotFound`. The tenant column is write-once: a `Set`
/// value that differs from the stored one is rejected, an equal one is dropped from the
/// statement. The `UPDATE` itself carries the scope condition again.
///
/// # Errors
/// - `ScopeError::NotFound` if the row is not visible
/// - `ScopeError::Denied` if the update would change the tenant
/// - `ScopeError::Invalid` if the entity has no resource column
/// - `ScopeError::Db` on database errors
pub async fn secure_update_with_scope<E>(
    mut am: E::ActiveModel,
    id: uuid::Uuid,
    scope: &AccessScope,
    runner: &impl DBRunner,
) -> Result<E::Model, ScopeError>
where
    E: ScopableEntity + EntityTrait,
    E::Column: ColumnTrait + Copy,
    E::ActiveModel: ActiveModelTrait<Entity = E> + ActiveModelBehavior + Send,
    E::Model: IntoActiveModel<E::ActiveModel> + Send + Sync,
{
    let resource_col = E::resource_col().ok_or(ScopeError::Invalid(
        "Entity must have a resource_col to update by id",
    ))?;

    let existing = E::find()
        .secure()
        .scope_with(scope)
        .and_id(id)?
        .one(runner)
        .await?
        .ok_or(ScopeError::NotFound)?;

    if !E::IS_UNRESTRICTED
        && let Some(tcol) = E::tenant_col()
    {
        if let ActiveValue::Set(v) = am.get(tcol)
            && v != existing.get(tcol)
        {
            return Err(ScopeError::Denied("tenant_id is immutable"));
        }
        am.not_set(tcol);
    }
    am.try_set(resource_col, id.into())?;

    let update = E::update(am).filter(build_scope_condition::<E>(scope));
    match with_runner!(runner, |c| update.exec(c).await) {
        Ok(model) => Ok(model),
        Err(DbErr::RecordNotUpdated | DbErr::RecordNotFound(_)) => Err(ScopeError::NotFound),
        Err(e) => Err(e.into()),
    }
}

/// Check that a tenant id is part of the scope.
///
/// # Errors
/// Returns `ScopeError::Denied` when it is not.
pub fn validate_tenant_in_scope(tenant_id: &str, scope: &AccessScope) -> Result<(), ScopeError> {
    if scope.contains_tenant(tenant_id) {
        Ok(())
    } else {
        Err(ScopeError::Denied("tenant_id not present in security scope"))
    }
}

/// `UpdateMany` that only executes after `.scope_with()`.
#[derive(Clone, Debug)]
pub struct SecureUpdateMany<E: EntityTrait, S> {
    pub(crate) inner: sea_orm::UpdateMany<E>,
    pub(crate) _state: PhantomData<S>,
}

pub trait SecureUpdateExt<E: EntityTrait>: Sized {
    fn secure(self) -> SecureUpdateMany<E, Unscoped>;
}

impl<E> SecureUpdateExt<E> for sea_orm::UpdateMany<E>
where
    E: EntityTrait,
{
    fn secure(self) -> SecureUpdateMany<E, Unscoped> {
        SecureUpdateMany {
            inner: self,
            _state: PhantomData,
        }
    }
}

fn assigns_tenant<E>(stmt: &sea_orm::sea_query::UpdateStatement) -> bool
where
    E: ScopableEntity,
    E::Column: Copy,
{
    E::tenant_col().is_some_and(|tcol| {
        stmt.get_values()
            .iter()
            .any(|(name, _)| Iden::to_string(&**name) == tcol.as_str())
    })
}

impl<E> SecureUpdateMany<E, Unscoped>
where
    E: ScopableEntity + EntityTrait,
    E::Column: ColumnTrait + Copy,
{
    /// Apply the scope.
    ///
    /// # Errors
    /// Returns `ScopeError::Denied` if the statement already assigns the tenant column.
    pub fn scope_with(self, scope: &AccessScope) -> Result<SecureUpdateMany<E, Scoped>, ScopeError> {
        if assigns_tenant::<E>(self.inner.as_query()) {
            return Err(ScopeError::Denied("tenant_id is immutable"));
        }
        let cond = build_scope_condition::<E>(scope);
        Ok(SecureUpdateMany {
            inner: self.inner.filter(cond),
            _state: PhantomData,
        })
    }
}

impl<E> SecureUpdateMany<E, Scoped>
where
    E: ScopableEntity + EntityTrait,
    E::Column: ColumnTrait + Copy,
{
    /// Assign a column.
    ///
    /// # Errors
    /// Returns `ScopeError::Denied` for the tenant column.
    pub fn col_expr(mut self, col: E::Column, expr: SimpleExpr) -> Result<Self, ScopeError> {
        if E::tenant_col().is_some_and(|tcol| tcol.as_str() == col.as_str()) {
            return Err(ScopeError::Denied("tenant_id is immutable"));
        }
        self.inner = self.inner.col_expr(col, expr);
        Ok(self)
    }

    #[must_use]
    pub fn filter(mut self, filter: sea_orm::Condition) -> Self {
        self.inner = QueryFilter::filter(self.inner, filter);
        self
    }

    /// # Errors
    /// Returns `ScopeError::Db` if the update fails.
    pub async fn exec(self, runner: &impl DBRunner) -> Result<sea_orm::UpdateResult, ScopeError> {
        Ok(with_runner!(runner, |c| self.inner.exec(c).await)?)
    }
}

/// `DeleteMany` that only executes after `.scope_with()`.
#[derive(Clone, Debug)]
pub struct SecureDeleteMany<E: EntityTrait, S> {
    pub(crate) inner: sea_orm::DeleteMany<E>,
    pub(crate) _state: PhantomData<S>,
}

pub trait SecureDeleteExt<E: EntityTrait>: Sized {
    fn secure(self) -> SecureDeleteMany<E, Unscoped>;
}

impl<E> SecureDeleteExt<E> for sea_orm::DeleteMany<E>
where
    E: EntityTrait,
{
    fn secure(self) -> SecureDeleteMany<E, Unscoped> {
        SecureDeleteMany {
            inner: self,
            _state: PhantomData,
        }
    }
}

impl<E> SecureDeleteMany<E, Unscoped>
where
    E: ScopableEntity + EntityTrait,
    E::Column: ColumnTrait + Copy,
{
    #[must_use]
    pub fn scope_with(self, scope: &AccessScope) -> SecureDeleteMany<E, Scoped> {
        let cond = build_scope_condition::<E>(scope);
        SecureDeleteMany {
            inner: self.inner.filter(cond),
            _state: PhantomData,
        }
    }
}

impl<E> SecureDeleteMany<E, Scoped>
where
    E: EntityTrait,
{
    #[must_use]
    pub fn filter(mut self, filter: sea_orm::Condition) -> Self {
        self.inner = QueryFilter::filter(self.inner, filter);
        self
    }

    /// # Errors
    /// Returns `ScopeError::Db` if the delete fails.
    pub async fn exec(self, runner: &impl DBRunner) -> Result<sea_orm::DeleteResult, ScopeError> {
        Ok(with_runner!(runner, |c| self.inner.exec(c).await)?)
    }
}
