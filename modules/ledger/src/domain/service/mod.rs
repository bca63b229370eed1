//! Ledger services.
//!
//! Every public operation takes the caller's verified [`SecurityContext`], opens one unit of
//! work for it and runs all reads and writes through the tenant-scoped repositories in
//! [`crate::infra::storage::repos`]. Nothing here accepts a tenant id as a filter.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use sea_orm::Condition;
use serde::{Deserialize, Serialize};
use tenantkit_db::{DBProvider, Db, UnitOfWork};
use tenantkit_security::SecurityContext;

use super::audit::{AuditEvent, AuditSink};
use super::error::{ConstraintKind, DomainError};
use crate::infra::storage::audit_sea_sink::DbAuditSink;
use crate::infra::storage::repos::TENANTS;

mod accounts;
mod audit_log;
mod budgets;
mod cards;
mod categories;
mod tenants;
mod transactions;
mod users;

/// Limits applied by the services. Read from the `ledger` section of the server config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub max_name_length: usize,
    pub default_page_size: u64,
    pub max_page_size: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_name_length: 200,
            default_page_size: 50,
            max_page_size: 500,
        }
    }
}

type UnitFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, DomainError>> + Send + 'a>>;

/// Entry point for every ledger operation. Cheap to clone.
#[derive(Clone)]
pub struct LedgerService {
    db: DBProvider<DomainError>,
    audit: Arc<dyn AuditSink>,
    audit_failures: Arc<AtomicU64>,
    config: Arc<ServiceConfig>,
}

impl std::fmt::Debug for LedgerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerService")
            .field("db", &self.db)
            .field("audit_failures", &self.audit_failures())
            .finish_non_exhaustive()
    }
}

impl LedgerService {
    /// Service writing its audit trail to the `audit_logs` table.
    #[must_use]
    pub fn new(db: Db, config: ServiceConfig) -> Self {
        Self::with_audit_sink(db, Arc::new(DbAuditSink), config)
    }

    #[must_use]
    pub fn with_audit_sink(db: Db, audit: Arc<dyn AuditSink>, config: ServiceConfig) -> Self {
        Self {
            db: DBProvider::new(db),
            audit,
            audit_failures: Arc::new(AtomicU64::new(0)),
            config: Arc::new(config),
        }
    }

    /// Audit writes that failed since startup.
    #[must_use]
    pub fn audit_failures(&self) -> u64 {
        self.audit_failures.load(Ordering::Relaxed)
    }

    /// Run `f` in a unit of work bound to `ctx`, with a clone of the service moved in.
    async fn in_unit<T, F>(&self, ctx: &SecurityContext, f: F) -> Result<T, DomainError>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(Self, &'a UnitOfWork) -> UnitFuture<'a, T> + Send,
    {
        let svc = self.clone();
        self.db.unit_of_work(ctx, move |uow| f(svc, uow)).await
    }

    /// Record an audit event. A failure is reported and counted but does not fail the caller.
    async fn audit(&self, uow: &UnitOfWork, event: AuditEvent) {
        let action = event.action.as_str();
        let entity_type = event.entity_type;
        if let Err(e) = self.audit.record(uow, event).await {
            let failures = self.audit_failures.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::error!(
                target: "ledger::audit",
                error = %e,
                action,
                entity_type,
                failures,
                "audit write failed"
            );
        }
    }

    fn validate_name(&self, field: &str, value: &str) -> Result<(), DomainError> {
        if value.trim().is_empty() {
            return Err(DomainError::validation(field, "must not be empty"));
        }
        if value.chars().count() > self.config.max_name_length {
            return Err(DomainError::validation(
                field,
                format!("exceeds maximum length of {}", self.config.max_name_length),
            ));
        }
        Ok(())
    }

    fn page_size(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.config.default_page_size)
            .clamp(1, self.config.max_page_size)
    }
}

/// Tenant a write in `uow` may target.
///
/// An empty context is `ContextMissing`. A payload naming another tenant is rejected before
/// any of its references are looked at. A context naming a tenant that was never onboarded,
/// or was offboarded, is `UnknownTenant`.
async fn write_tenant(uow: &UnitOfWork, requested: Option<&str>) -> Result<String, DomainError> {
    let current = uow.tenant_id();
    if current.is_empty() {
        return Err(DomainError::ContextMissing);
    }
    if requested.is_some_and(|t| t != current) {
        return Err(DomainError::constraint(ConstraintKind::TenantMismatch));
    }
    if TENANTS.count(uow, Condition::all()).await? == 0 {
        return Err(DomainError::UnknownTenant);
    }
    Ok(current)
}
