use sea_orm::Order;
use tenantkit_security::SecurityContext;
use tracing::instrument;

use super::LedgerService;
use crate::domain::error::DomainError;
use crate::domain::models::AuditEntry;
use crate::infra::storage::entity::audit_log;
use crate::infra::storage::repos::AUDIT_LOGS;

impl LedgerService {
    /// Most recent audit entries of the caller's tenant.
    ///
    /// # Errors
    /// Returns `DomainError::Database` on storage failures.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id()))]
    pub async fn list_audit_log(
        &self,
        ctx: &SecurityContext,
        limit: Option<u64>,
    ) -> Result<Vec<AuditEntry>, DomainError> {
        let limit = self.page_size(limit);
        self.in_unit(ctx, move |_, uow| {
            Box::pin(async move {
                Ok(AUDIT_LOGS
                    .select(uow)
                    .order_by(audit_log::Column::CreatedAt, Order::Desc)
                    .order_by(audit_log::Column::Id, Order::Asc)
                    .limit(limit)
                    .all(uow)
                    .await?)
            })
        })
        .await
    }
}
