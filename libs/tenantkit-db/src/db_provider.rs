//! Service-facing database entrypoint with domain error mapping.
//!
//! Services keep a `DBProvider<DomainError>` and open units of work through it; they never
//! hold a raw connection. Infrastructure errors are converted with `E: From<DbError>`.
//!
//! ```rust,ignore
//! let account = self.db
//!     .unit_of_work(&ctx, |uow| Box::pin(async move {
//!         accounts.create(uow, new_account).await
//!     }))
//!     .await?;
//! ```

use std::{future::Future, marker::PhantomData, pin::Pin};

use tenantkit_security::SecurityContext;

use crate::secure::{DbConn, UnitOfWork};
use crate::{Db, DbError};

pub struct DBProvider<E> {
    db: Db,
    _error: PhantomData<fn() -> E>,
}

impl<E> Clone for DBProvider<E> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            _error: PhantomData,
        }
    }
}

impl<E> std::fmt::Debug for DBProvider<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DBProvider").field("db", &self.db).finish()
    }
}

impl<E> DBProvider<E>
where
    E: From<DbError> + Send + 'static,
{
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self {
            db,
            _error: PhantomData,
        }
    }

    /// Non-transactional runner.
    ///
    /// # Errors
    /// Fails inside a unit of work.
    pub fn conn(&self) -> Result<DbConn<'_>, E> {
        self.db.conn().map_err(E::from)
    }

    /// Open a unit of work the caller ends explicitly.
    ///
    /// # Errors
    /// Returns the mapped `DbError` if the transaction cannot be opened.
    pub async fn begin(&self, ctx: &SecurityContext) -> Result<UnitOfWork, E> {
        self.db.begin_unit_of_work(ctx).await.map_err(E::from)
    }

    /// Run `f` in a unit of work: commit on `Ok`, roll back on `Err`, clear the context always.
    ///
    /// # Errors
    /// Returns the closure's error or a mapped begin/commit failure.
    pub async fn unit_of_work<T, F>(&self, ctx: &SecurityContext, f: F) -> Result<T, E>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a UnitOfWork) -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>
            + Send,
    {
        self.db.with_unit_of_work(ctx, f).await
    }

    #[must_use]
    pub fn db(&self) -> &Db {
        &self.db
    }
}
