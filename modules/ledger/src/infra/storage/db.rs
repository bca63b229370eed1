//! Database error conversion.

use sea_orm::{DbErr, SqlErr};

use crate::domain::error::{ConstraintKind, DomainError};

/// Convert a storage error into a `DomainError` without leaking its text.
///
/// Constraint violations keep only their kind; everything else becomes a generic database
/// error and the original is logged.
pub fn db_err(e: &DbErr) -> DomainError {
    match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            DomainError::constraint(ConstraintKind::Unique)
        }
        Some(SqlErr::ForeignKeyConstraintViolation(_)) => {
            DomainError::constraint(ConstraintKind::ForeignKey)
        }
        _ if is_policy_violation(e) => DomainError::constraint(ConstraintKind::TenantMismatch),
        _ => {
            tracing::error!(error = %e, "database error");
            DomainError::database("database error")
        }
    }
}

/// `PostgreSQL` rejects rows failing a `WITH CHECK` policy with this message.
fn is_policy_violation(e: &DbErr) -> bool {
    e.to_string().contains("violates row-level security policy")
}
