//! Binds one tenant context to one transaction.

use std::sync::Arc;

use sea_orm::{
    ConnectionTrait, DatabaseTransaction, DbBackend, Statement, TransactionTrait,
};
use tenantkit_security::{AccessScope, TenantContextStore};
use uuid::Uuid;

use super::TENANT_SETTING;
use crate::DbError;

/// How a unit of work finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Commit,
    Rollback,
}

/// Clears the store when the owning root unit goes away, on every exit path.
struct ClearGuard {
    store: Option<Arc<TenantContextStore>>,
}

impl Drop for ClearGuard {
    fn drop(&mut self) {
        if let Some(store) = self.store.take() {
            store.clear_context();
        }
    }
}

/// A transaction plus the tenant context it runs under.
///
/// Created by [`super::Db::begin_unit_of_work`]. Every repository call takes `&UnitOfWork`
/// and derives its [`AccessScope`] from [`UnitOfWork::scope`], never from caller input.
///
/// Dropping a unit without calling [`UnitOfWork::end`] rolls the transaction back and clears
/// the context; this is what happens on cancellation or an early `?` return.
pub struct UnitOfWork {
    txn: DatabaseTransaction,
    store: Arc<TenantContextStore>,
    subject_id: Uuid,
    nested: bool,
    clear_on_end: ClearGuard,
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("tenant_id", &self.store.get_context())
            .field("subject_id", &self.subject_id)
            .field("nested", &self.nested)
            .finish_non_exhaustive()
    }
}

impl UnitOfWork {
    pub(crate) fn root(
        txn: DatabaseTransaction,
        store: Arc<TenantContextStore>,
        subject_id: Uuid,
    ) -> Self {
        Self {
            txn,
            clear_on_end: ClearGuard {
                store: Some(Arc::clone(&store)),
            },
            store,
            subject_id,
            nested: false,
        }
    }

    pub(crate) fn txn(&self) -> &DatabaseTransaction {
        &self.txn
    }

    /// Current tenant id (empty when no tenant is bound).
    #[must_use]
    pub fn tenant_id(&self) -> String {
        self.store.get_context()
    }

    /// Acting user.
    #[must_use]
    pub fn subject_id(&self) -> Uuid {
        self.subject_id
    }

    /// The store this unit reads its tenant from.
    #[must_use]
    pub fn context_store(&self) -> &TenantContextStore {
        &self.store
    }

    /// Shared handle to the store, e.g. for a job that reports the tenant after the unit ends.
    #[must_use]
    pub fn context_handle(&self) -> Arc<TenantContextStore> {
        Arc::clone(&self.store)
    }

    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.nested
    }

    /// Scope for the current context. Empty context gives the deny-all scope.
    #[must_use]
    pub fn scope(&self) -> AccessScope {
        AccessScope::for_tenant(&self.store.get_context())
    }

    /// Replace the tenant context for the rest of this unit.
    ///
    /// The store and the `PostgreSQL` session setting are both overwritten; nothing from the
    /// previous tenant remains visible afterwards.
    ///
    /// # Errors
    /// Returns an error if the session setting cannot be applied.
    pub async fn switch_tenant(&self, tenant_id: &str) -> Result<(), DbError> {
        if self.txn.get_database_backend() == DbBackend::Postgres {
            self.txn
                .execute(Statement::from_sql_and_values(
                    DbBackend::Postgres,
                    "SELECT set_config($1, $2, true)",
                    [TENANT_SETTING.into(), tenant_id.into()],
                ))
                .await?;
        }
        self.store.set_context(tenant_id);
        tracing::trace!(tenant_id = %tenant_id, "tenant context set");
        Ok(())
    }

    /// Open a nested unit (`SAVEPOINT`) sharing this unit's context.
    ///
    /// Ending or dropping the nested unit never clears the shared context, and rolling it
    /// back leaves the parent transaction usable.
    ///
    /// # Errors
    /// Returns an error if the savepoint cannot be created.
    pub async fn savepoint(&self) -> Result<UnitOfWork, DbError> {
        let txn = self.txn.begin().await?;
        Ok(Self {
            txn,
            store: Arc::clone(&self.store),
            subject_id: self.subject_id,
            nested: true,
            clear_on_end: ClearGuard { store: None },
        })
    }

    /// `endUnitOfWork`: commit or roll back, then clear the context.
    ///
    /// The context is cleared even when the commit fails.
    ///
    /// # Errors
    /// Returns the commit or rollback error.
    pub async fn end(self, outcome: Outcome) -> Result<(), DbError> {
        let Self {
            txn,
            nested,
            clear_on_end,
            ..
        } = self;

        let res = match outcome {
            Outcome::Commit => txn.commit().await,
            Outcome::Rollback => txn.rollback().await,
        };
        drop(clear_on_end);

        tracing::debug!(?outcome, nested, ok = res.is_ok(), "unit of work ended");
        res.map_err(DbError::from)
    }

    /// # Errors
    /// Returns the commit error. The context is cleared either way.
    pub async fn commit(self) -> Result<(), DbError> {
        self.end(Outcome::Commit).await
    }

    /// # Errors
    /// Returns the rollback error. The context is cleared either way.
    pub async fn rollback(self) -> Result<(), DbError> {
        self.end(Outcome::Rollback).await
    }
}
