//! Sealed executor capability.
//!
//! Repositories and services receive `&impl DBRunner` and never see a raw `SeaORM`
//! connection or transaction. Only [`DbConn`] and [`UnitOfWork`] implement it.

use super::db::DbConn;
use super::unit_of_work::UnitOfWork;

mod sealed {
    pub trait Sealed {}
}

/// Crate-only view of the executor behind a runner.
pub enum SeaOrmRunner<'a> {
    Conn(&'a sea_orm::DatabaseConnection),
    Tx(&'a sea_orm::DatabaseTransaction),
}

/// Crate-only bridge to `SeaORM` executors.
pub trait DBRunnerInternal: sealed::Sealed + Send + Sync {
    fn as_seaorm(&self) -> SeaOrmRunner<'_>;
}

/// Executor capability accepted by the secure query wrappers.
///
/// Has no methods and cannot be implemented outside `tenantkit-db`.
#[doc(hidden)]
pub trait DBRunner: DBRunnerInternal {}

impl sealed::Sealed for DbConn<'_> {}
impl DBRunnerInternal for DbConn<'_> {
    fn as_seaorm(&self) -> SeaOrmRunner<'_> {
        SeaOrmRunner::Conn(self.conn)
    }
}
impl DBRunner for DbConn<'_> {}

impl sealed::Sealed for UnitOfWork {}
impl DBRunnerInternal for UnitOfWork {
    fn as_seaorm(&self) -> SeaOrmRunner<'_> {
        SeaOrmRunner::Tx(self.txn())
    }
}
impl DBRunner for UnitOfWork {}
