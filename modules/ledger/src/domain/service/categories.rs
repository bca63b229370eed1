use chrono::Utc;
use sea_orm::{Order, Set};
use tenantkit_security::SecurityContext;
use tracing::instrument;
use uuid::Uuid;

use super::{LedgerService, write_tenant};
use crate::domain::audit::{AuditAction, AuditEvent};
use crate::domain::error::DomainError;
use crate::domain::models::{Category, NewCategory};
use crate::infra::storage::entity::category;
use crate::infra::storage::repos::CATEGORIES;

impl LedgerService {
    /// # Errors
    /// - `DomainError::ContextMissing` with an empty context
    /// - `DomainError::ConstraintViolation` if the name is already used in this tenant
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id()))]
    pub async fn create_category(
        &self,
        ctx: &SecurityContext,
        new: NewCategory,
    ) -> Result<Category, DomainError> {
        self.validate_name("name", &new.name)?;
        self.in_unit(ctx, move |svc, uow| {
            Box::pin(async move {
                let tenant_id = write_tenant(uow, None).await?;
                let category = CATEGORIES
                    .create(
                        uow,
                        category::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            tenant_id: Set(tenant_id),
                            name: Set(new.name),
                            created_at: Set(Utc::now()),
                        },
                    )
                    .await?;
                svc.audit(
                    uow,
                    AuditEvent::new(AuditAction::Create, "category", Some(category.id)),
                )
                .await;
                Ok(category)
            })
        })
        .await
    }

    /// # Errors
    /// Returns `DomainError::Database` on storage failures.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id()))]
    pub async fn list_categories(&self, ctx: &SecurityContext) -> Result<Vec<Category>, DomainError> {
        self.in_unit(ctx, |_, uow| {
            Box::pin(async move {
                Ok(CATEGORIES
                    .select(uow)
                    .order_by(category::Column::Name, Order::Asc)
                    .all(uow)
                    .await?)
            })
        })
        .await
    }
}
