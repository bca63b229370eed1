use async_trait::async_trait;
use chrono::Utc;
use sea_orm::Set;
use tenantkit_db::UnitOfWork;
use uuid::Uuid;

use super::entity::audit_log;
use super::repos::AUDIT_LOGS;
use crate::domain::audit::{AuditError, AuditEvent, AuditSink};

/// Writes audit events to `audit_logs` in a savepoint of the caller's unit of work.
///
/// A failed write rolls back only the savepoint, so the primary operation can still commit.
#[derive(Debug, Default, Clone, Copy)]
pub struct DbAuditSink;

#[async_trait]
impl AuditSink for DbAuditSink {
    async fn record(&self, uow: &UnitOfWork, event: AuditEvent) -> Result<(), AuditError> {
        let nested = uow.savepoint().await?;
        let row = audit_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(uow.tenant_id()),
            user_id: Set(uow.subject_id()),
            action: Set(event.action.as_str().to_owned()),
            entity_type: Set(event.entity_type.to_owned()),
            entity_id: Set(event.entity_id),
            details: Set(event.details),
            created_at: Set(Utc::now()),
        };
        match AUDIT_LOGS.create(&nested, row).await {
            Ok(_) => {
                nested.commit().await?;
                Ok(())
            }
            Err(e) => {
                if let Err(rb) = nested.rollback().await {
                    tracing::warn!(error = %rb, "audit savepoint rollback failed");
                }
                Err(e.into())
            }
        }
    }
}
