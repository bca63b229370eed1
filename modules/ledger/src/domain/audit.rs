//! Audit trail contract.
//!
//! Services call an [`AuditSink`] after every sensitive mutation, inside the same unit of
//! work. The sink sees the unit's tenant and acting user; callers never pass them in.

use async_trait::async_trait;
use serde_json::Value;
use tenantkit_db::{DbError, UnitOfWork, secure::RepoError};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    BulkActivate,
}

impl AuditAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::BulkActivate => "bulk_activate",
        }
    }
}

/// One audited action.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub entity_type: &'static str,
    pub entity_id: Option<Uuid>,
    pub details: Value,
}

impl AuditEvent {
    #[must_use]
    pub fn new(action: AuditAction, entity_type: &'static str, entity_id: Option<Uuid>) -> Self {
        Self {
            action,
            entity_type,
            entity_id,
            details: Value::Null,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit write rejected: {0}")]
    Repo(#[from] RepoError),

    #[error("audit savepoint failed: {0}")]
    Db(#[from] DbError),
}

/// Append-only sink for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record `event` for the tenant and user bound to `uow`.
    ///
    /// # Errors
    /// Returns `AuditError` if the event could not be stored. The caller's unit of work stays
    /// usable either way.
    async fn record(&self, uow: &UnitOfWork, event: AuditEvent) -> Result<(), AuditError>;
}
