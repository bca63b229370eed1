//! Generic tenant-scoped repository.
//!
//! Entity repositories wrap a [`TenantRepo<E>`] instead of issuing queries themselves, so a
//! new entity gets the tenant predicate by construction. Every method takes the
//! [`UnitOfWork`] and derives its scope from the unit's context.

use std::marker::PhantomData;

use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, Condition, DbErr, EntityTrait,
    FromQueryResult, IntoActiveModel, sea_query::SimpleExpr,
};
use uuid::Uuid;

use super::{
    InsertManyOutcome, ScopableEntity, ScopeError, Scoped, SecureDeleteExt, SecureEntityExt,
    SecureSelect, SecureUpdateExt, UnitOfWork, secure_insert, secure_insert_many,
    secure_update_with_scope,
};

/// Repository-level error.
///
/// `NotFound` is returned alike for rows of other tenants and for rows that do not exist.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("no tenant context")]
    ContextMissing,

    #[error("not found")]
    NotFound,

    #[error("access denied: {0}")]
    Denied(&'static str),

    #[error("invalid request: {0}")]
    Invalid(&'static str),

    #[error(transparent)]
    Db(#[from] DbErr),
}

impl From<ScopeError> for RepoError {
    fn from(e: ScopeError) -> Self {
        match e {
            ScopeError::Db(db) => Self::Db(db),
            ScopeError::Invalid(m) => Self::Invalid(m),
            ScopeError::Denied(m) => Self::Denied(m),
            ScopeError::NotFound => Self::NotFound,
        }
    }
}

/// Tenant-scoped CRUD for one entity.
pub struct TenantRepo<E> {
    _entity: PhantomData<fn() -> E>,
}

impl<E> Default for TenantRepo<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for TenantRepo<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for TenantRepo<E> {}

impl<E> std::fmt::Debug for TenantRepo<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantRepo")
            .field("entity", &std::any::type_name::<E>())
            .finish()
    }
}

impl<E> TenantRepo<E> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _entity: PhantomData,
        }
    }
}

fn ensure_context(uow: &UnitOfWork) -> Result<(), RepoError> {
    if uow.context_store().is_empty() {
        return Err(RepoError::ContextMissing);
    }
    Ok(())
}

impl<E> TenantRepo<E>
where
    E: ScopableEntity + EntityTrait,
    E::Column: ColumnTrait + Copy,
    E::ActiveModel: ActiveModelTrait<Entity = E> + ActiveModelBehavior + Send,
    E::Model: IntoActiveModel<E::ActiveModel> + FromQueryResult + Send + Sync,
{
    /// Scoped select for custom queries (ordering, joins, projections).
    pub fn select(&self, uow: &UnitOfWork) -> SecureSelect<E, Scoped> {
        E::find().secure().scope_with(&uow.scope())
    }

    fn resource_col() -> Result<E::Column, RepoError> {
        E::resource_col().ok_or(RepoError::Invalid("entity has no resource column"))
    }

    /// # Errors
    /// Returns `RepoError::Db` on database errors.
    pub async fn find_by_id(&self, uow: &UnitOfWork, id: Uuid) -> Result<Option<E::Model>, RepoError> {
        Ok(self.select(uow).and_id(id)?.one(uow).await?)
    }

    /// Like [`Self::find_by_id`] but a missing row is `RepoError::NotFound`.
    ///
    /// # Errors
    /// Returns `RepoError::NotFound` if the row is not visible.
    pub async fn get(&self, uow: &UnitOfWork, id: Uuid) -> Result<E::Model, RepoError> {
        self.find_by_id(uow, id).await?.ok_or(RepoError::NotFound)
    }

    /// # Errors
    /// Returns `RepoError::Db` on database errors.
    pub async fn find_many(
        &self,
        uow: &UnitOfWork,
        filter: Condition,
    ) -> Result<Vec<E::Model>, RepoError> {
        Ok(self.select(uow).filter(filter).all(uow).await?)
    }

    /// # Errors
    /// Returns `RepoError::Db` on database errors.
    pub async fn count(&self, uow: &UnitOfWork, filter: Condition) -> Result<u64, RepoError> {
        Ok(self.select(uow).filter(filter).count(uow).await?)
    }

    /// Whether `id` names a row visible in the current tenant.
    ///
    /// Used to check foreign keys before a write.
    ///
    /// # Errors
    /// Returns `RepoError::Db` on database errors.
    pub async fn exists_in_tenant(&self, uow: &UnitOfWork, id: Uuid) -> Result<bool, RepoError> {
        Ok(self.select(uow).and_id(id)?.count(uow).await? > 0)
    }

    /// Projection or aggregate over the tenant's rows.
    ///
    /// `shape` adds `select_only`/`column_as`/`group_by`; the scope is already in the
    /// `WHERE` clause, so the aggregate only ranges over the current tenant.
    ///
    /// # Errors
    /// Returns `RepoError::Db` on database errors.
    pub async fn aggregate<M, F>(
        &self,
        uow: &UnitOfWork,
        filter: Condition,
        shape: F,
    ) -> Result<Vec<M>, RepoError>
    where
        M: FromQueryResult + Send + Sync,
        F: FnOnce(SecureSelect<E, Scoped>) -> SecureSelect<E, Scoped>,
    {
        Ok(shape(self.select(uow).filter(filter)).all_as::<M>(uow).await?)
    }

    /// # Errors
    /// - `RepoError::ContextMissing` with an empty context
    /// - `RepoError::Denied` if the row's tenant differs from the context
    pub async fn create(&self, uow: &UnitOfWork, am: E::ActiveModel) -> Result<E::Model, RepoError> {
        ensure_context(uow)?;
        Ok(secure_insert::<E>(am, &uow.scope(), uow).await?)
    }

    /// Insert the rows belonging to the current tenant and report the rest.
    ///
    /// # Errors
    /// - `RepoError::ContextMissing` with an empty context
    /// - `RepoError::Db` on database errors
    pub async fn create_many(
        &self,
        uow: &UnitOfWork,
        ams: Vec<E::ActiveModel>,
    ) -> Result<InsertManyOutcome<E::Model>, RepoError> {
        ensure_context(uow)?;
        Ok(secure_insert_many::<E, _>(ams, &uow.scope(), uow).await?)
    }

    /// # Errors
    /// - `RepoError::ContextMissing` with an empty context
    /// - `RepoError::NotFound` if the row is not visible
    /// - `RepoError::Denied` if the update changes the tenant
    pub async fn update(
        &self,
        uow: &UnitOfWork,
        id: Uuid,
        am: E::ActiveModel,
    ) -> Result<E::Model, RepoError> {
        ensure_context(uow)?;
        Ok(secure_update_with_scope::<E>(am, id, &uow.scope(), uow).await?)
    }

    /// Apply `assignments` to the visible subset of `ids`; returns the affected count.
    ///
    /// # Errors
    /// - `RepoError::ContextMissing` with an empty context
    /// - `RepoError::Denied` if an assignment targets the tenant column
    pub async fn update_many(
        &self,
        uow: &UnitOfWork,
        ids: &[Uuid],
        assignments: Vec<(E::Column, SimpleExpr)>,
    ) -> Result<u64, RepoError> {
        ensure_context(uow)?;
        if ids.is_empty() || assignments.is_empty() {
            return Ok(0);
        }
        let rcol = Self::resource_col()?;
        let mut stmt = E::update_many()
            .secure()
            .scope_with(&uow.scope())?
            .filter(Condition::all().add(rcol.is_in(ids.to_vec())));
        for (col, expr) in assignments {
            stmt = stmt.col_expr(col, expr)?;
        }
        Ok(stmt.exec(uow).await?.rows_affected)
    }

    /// # Errors
    /// - `RepoError::ContextMissing` with an empty context
    /// - `RepoError::NotFound` if the row is not visible
    pub async fn delete(&self, uow: &UnitOfWork, id: Uuid) -> Result<(), RepoError> {
        match self.delete_many(uow, &[id]).await? {
            0 => Err(RepoError::NotFound),
            _ => Ok(()),
        }
    }

    /// Delete the visible subset of `ids`; returns the affected count.
    ///
    /// # Errors
    /// - `RepoError::ContextMissing` with an empty context
    pub async fn delete_many(&self, uow: &UnitOfWork, ids: &[Uuid]) -> Result<u64, RepoError> {
        ensure_context(uow)?;
        if ids.is_empty() {
            return Ok(0);
        }
        let rcol = Self::resource_col()?;
        self.delete_where(uow, Condition::all().add(rcol.is_in(ids.to_vec())))
            .await
    }

    /// Delete every visible row matching `filter`; used by cascades.
    ///
    /// # Errors
    /// - `RepoError::ContextMissing` with an empty context
    pub async fn delete_where(&self, uow: &UnitOfWork, filter: Condition) -> Result<u64, RepoError> {
        ensure_context(uow)?;
        let res = E::delete_many()
            .secure()
            .scope_with(&uow.scope())
            .filter(filter)
            .exec(uow)
            .await?;
        Ok(res.rows_affected)
    }
}
