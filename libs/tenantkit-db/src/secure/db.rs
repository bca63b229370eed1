//! Secure database entrypoint.
//!
//! - [`Db`]: cloneable handle held by the application root.
//! - [`DbConn`]: non-transactional runner borrowed from `Db`, for startup checks and
//!   unscoped maintenance.
//! - [`UnitOfWork`]: transactional runner bound to one tenant context.
//!
//! `Db::conn()` fails while a unit of work opened by [`Db::with_unit_of_work`] is running on
//! the same task, so code inside a unit of work cannot write around its transaction.

use std::{cell::Cell, future::Future, pin::Pin, sync::Arc};

use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, TransactionTrait};
use tenantkit_security::{SecurityContext, TenantContextStore};

use super::unit_of_work::{Outcome, UnitOfWork};
use crate::{DbEngine, DbError, DbHandle};

tokio::task_local! {
    static IN_TX: Cell<bool>;
}

fn is_in_transaction() -> bool {
    IN_TX.try_with(Cell::get).unwrap_or(false)
}

async fn with_tx_guard<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    IN_TX.scope(Cell::new(true), f).await
}

/// Database handle.
///
/// Services must not store it; they take `&UnitOfWork` (or `&impl DBRunner`) per call.
#[derive(Clone)]
pub struct Db {
    handle: Arc<DbHandle>,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("engine", &self.handle.engine())
            .finish_non_exhaustive()
    }
}

impl Db {
    #[must_use]
    pub(crate) fn new(handle: DbHandle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Privileged connection for migrations and policy checks inside this crate.
    pub(crate) fn sea_internal(&self) -> &DatabaseConnection {
        self.handle.sea_internal_ref()
    }

    /// Non-transactional runner.
    ///
    /// # Errors
    /// Returns `DbError::ConnRequestedInsideTx` inside [`Db::with_unit_of_work`].
    pub fn conn(&self) -> Result<DbConn<'_>, DbError> {
        if is_in_transaction() {
            return Err(DbError::ConnRequestedInsideTx);
        }
        Ok(DbConn {
            conn: self.handle.sea_internal_ref(),
        })
    }

    /// Start a unit of work for the caller's verified tenant.
    ///
    /// Opens a transaction on its own pooled connection and binds a fresh
    /// [`TenantContextStore`] to it. On `PostgreSQL` the tenant is also written to the
    /// transaction-local [`super::TENANT_SETTING`] read by the row-level security policies.
    ///
    /// The context is cleared when the unit ends, whatever the outcome. A unit that is
    /// dropped without [`UnitOfWork::end`] rolls back.
    ///
    /// # Errors
    /// Returns an error if the transaction cannot be opened or the setting cannot be applied.
    pub async fn begin_unit_of_work(&self, ctx: &SecurityContext) -> Result<UnitOfWork, DbError> {
        let txn = self.handle.sea_internal_ref().begin().await?;
        let store = Arc::new(TenantContextStore::new());
        let uow = UnitOfWork::root(txn, store, ctx.subject_id());
        uow.switch_tenant(ctx.tenant_id()).await?;
        tracing::debug!(
            tenant_id = %ctx.tenant_id(),
            subject_id = %ctx.subject_id(),
            "unit of work started"
        );
        Ok(uow)
    }

    /// Run `f` inside a unit of work.
    ///
    /// Commits on `Ok`, rolls back on `Err`, and clears the context on both paths.
    /// Begin and commit failures are mapped into `E`.
    ///
    /// # Errors
    /// Returns the closure's error, or a mapped `DbError` from begin/commit.
    pub async fn with_unit_of_work<F, T, E>(&self, ctx: &SecurityContext, f: F) -> Result<T, E>
    where
        E: From<DbError> + Send + 'static,
        F: for<'a> FnOnce(&'a UnitOfWork) -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>
            + Send,
        T: Send + 'static,
    {
        let uow = self.begin_unit_of_work(ctx).await.map_err(E::from)?;

        let res = with_tx_guard(f(&uow)).await;

        match res {
            Ok(v) => {
                uow.end(Outcome::Commit).await.map_err(E::from)?;
                Ok(v)
            }
            Err(e) => {
                if let Err(rb) = uow.end(Outcome::Rollback).await {
                    tracing::warn!(error = %rb, "rollback after failed unit of work");
                }
                Err(e)
            }
        }
    }

    #[must_use]
    pub fn engine(&self) -> DbEngine {
        self.handle.engine()
    }

    /// Engine name for logs.
    #[must_use]
    pub fn db_engine(&self) -> &'static str {
        match self.handle.sea_internal_ref().get_database_backend() {
            DbBackend::Postgres => "postgres",
            DbBackend::MySql => "mysql",
            DbBackend::Sqlite => "sqlite",
        }
    }

    /// DSN with the password masked.
    #[must_use]
    pub fn dsn_redacted(&self) -> String {
        self.handle.dsn_redacted()
    }

    /// Close the pool. Later units of work fail to begin.
    pub async fn close(&self) {
        self.handle.close().await;
    }
}

/// Non-transactional runner. Only [`Db::conn`] creates it.
pub struct DbConn<'a> {
    pub(crate) conn: &'a DatabaseConnection,
}

impl std::fmt::Debug for DbConn<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConn").finish_non_exhaustive()
    }
}
