use tenantkit_db::DbError;
use tenantkit_db::secure::{RepoError, ScopeError};
use thiserror::Error;

use crate::domain::audit::AuditError;

/// Which storage rule a rejected write broke. Carries no storage message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    /// Row tenant differs from the unit's tenant, or a write tried to move a row.
    TenantMismatch,
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Unique => "unique",
            Self::ForeignKey => "foreign key",
            Self::TenantMismatch => "tenant check",
        })
    }
}

/// Caller-facing errors of the ledger.
///
/// `NotFound` is returned alike for rows of other tenants and for rows that never existed.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("{field} does not reference a record of this tenant")]
    CrossTenantReference { field: &'static str },

    #[error("no tenant context")]
    ContextMissing,

    /// The context names a tenant with no `tenants` row.
    #[error("unknown tenant")]
    UnknownTenant,

    #[error("constraint violated: {kind}")]
    ConstraintViolation { kind: ConstraintKind },

    #[error("Validation failed: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Database error: {message}")]
    Database { message: String },
}

impl DomainError {
    #[must_use]
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    #[must_use]
    pub fn cross_tenant(field: &'static str) -> Self {
        Self::CrossTenantReference { field }
    }

    #[must_use]
    pub fn constraint(kind: ConstraintKind) -> Self {
        Self::ConstraintViolation { kind }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Map a repository error for an operation on a single `entity`.
    pub fn from_repo(entity: &'static str) -> impl FnOnce(RepoError) -> Self {
        move |e| match e {
            RepoError::NotFound => Self::not_found(entity),
            other => other.into(),
        }
    }
}

impl From<RepoError> for DomainError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::ContextMissing => Self::ContextMissing,
            RepoError::NotFound => Self::not_found("record"),
            RepoError::Denied(_) => Self::constraint(ConstraintKind::TenantMismatch),
            RepoError::Invalid(reason) => {
                tracing::error!(reason, "invalid repository request");
                Self::database("internal error")
            }
            RepoError::Db(db) => crate::infra::storage::db::db_err(&db),
        }
    }
}

impl From<ScopeError> for DomainError {
    fn from(e: ScopeError) -> Self {
        RepoError::from(e).into()
    }
}

impl From<DbError> for DomainError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Sea(db) => crate::infra::storage::db::db_err(&db),
            other => {
                tracing::error!(error = %other, "database unavailable");
                Self::database("database unavailable")
            }
        }
    }
}

impl From<AuditError> for DomainError {
    fn from(e: AuditError) -> Self {
        tracing::error!(error = %e, "audit sink error");
        Self::database("audit unavailable")
    }
}
