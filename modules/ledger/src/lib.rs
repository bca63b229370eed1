//! Multi-tenant ledger.
//!
//! Tenants, users, accounts, categories, transactions, budgets, cards and an append-only
//! audit trail. Every read and write goes through the tenant-scoped repositories of
//! `tenantkit-db`, inside a unit of work bound to the caller's tenant.
//!
//! ```rust,no_run
//! use ledger::{Ledger, ServiceConfig};
//! use tenantkit_db::{ConnectOpts, connect_db};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let db = connect_db("sqlite://data/ledger.db", ConnectOpts::default()).await?;
//! Ledger.migrate(&db).await?;
//! Ledger.verify_policies(&db).await?;
//! let service = Ledger.service(db, ServiceConfig::default());
//! # let _ = service;
//! # Ok(())
//! # }
//! ```

pub mod domain;
pub mod infra;
mod module;

pub use domain::audit::{AuditAction, AuditError, AuditEvent, AuditSink};
pub use domain::error::{ConstraintKind, DomainError};
pub use domain::models;
pub use domain::service::{LedgerService, ServiceConfig};
pub use infra::storage::audit_sea_sink::DbAuditSink;
pub use infra::storage::migrations::{MODULE_NAME, TENANT_SCOPED_TABLES};
pub use module::Ledger;
