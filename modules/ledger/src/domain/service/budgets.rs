use chrono::Utc;
use sea_orm::{Order, Set};
use serde_json::json;
use tenantkit_security::SecurityContext;
use tracing::instrument;
use uuid::Uuid;

use super::{LedgerService, write_tenant};
use crate::domain::audit::{AuditAction, AuditEvent};
use crate::domain::error::DomainError;
use crate::domain::models::{Budget, BudgetStatus, NewBudget};
use crate::infra::storage::entity::budget;
use crate::infra::storage::repos::{BUDGETS, CATEGORIES, TRANSACTIONS};
use crate::infra::storage::transactions_query::{SumRow, expenses_in_category, sum_shape};

impl LedgerService {
    /// # Errors
    /// - `DomainError::ContextMissing` with an empty context
    /// - `DomainError::CrossTenantReference` if the category is not this tenant's
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id()))]
    pub async fn create_budget(
        &self,
        ctx: &SecurityContext,
        new: NewBudget,
    ) -> Result<Budget, DomainError> {
        self.validate_name("name", &new.name)?;
        if new.limit_cents <= 0 {
            return Err(DomainError::validation("limit_cents", "must be positive"));
        }
        self.in_unit(ctx, move |svc, uow| {
            Box::pin(async move {
                let tenant_id = write_tenant(uow, None).await?;
                if !CATEGORIES.exists_in_tenant(uow, new.category_id).await? {
                    return Err(DomainError::cross_tenant("category_id"));
                }
                let budget = BUDGETS
                    .create(
                        uow,
                        budget::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            tenant_id: Set(tenant_id),
                            category_id: Set(new.category_id),
                            name: Set(new.name),
                            limit_cents: Set(new.limit_cents),
                            created_at: Set(Utc::now()),
                        },
                    )
                    .await?;
                svc.audit(
                    uow,
                    AuditEvent::new(AuditAction::Create, "budget", Some(budget.id))
                        .with_details(json!({ "limit_cents": budget.limit_cents })),
                )
                .await;
                Ok(budget)
            })
        })
        .await
    }

    /// # Errors
    /// Returns `DomainError::Database` on storage failures.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id()))]
    pub async fn list_budgets(&self, ctx: &SecurityContext) -> Result<Vec<Budget>, DomainError> {
        self.in_unit(ctx, |_, uow| {
            Box::pin(async move {
                Ok(BUDGETS
                    .select(uow)
                    .order_by(budget::Column::Name, Order::Asc)
                    .all(uow)
                    .await?)
            })
        })
        .await
    }

    /// Limit against the expenses booked in the budget's category.
    ///
    /// # Errors
    /// `DomainError::NotFound` if the budget is not visible.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id(), budget_id = %id))]
    pub async fn budget_status(
        &self,
        ctx: &SecurityContext,
        id: Uuid,
    ) -> Result<BudgetStatus, DomainError> {
        self.in_unit(ctx, move |_, uow| {
            Box::pin(async move {
                let budget = BUDGETS
                    .get(uow, id)
                    .await
                    .map_err(DomainError::from_repo("budget"))?;
                let spent = TRANSACTIONS
                    .aggregate::<SumRow, _>(uow, expenses_in_category(budget.category_id), sum_shape)
                    .await?
                    .into_iter()
                    .next()
                    .and_then(|r| r.total)
                    .unwrap_or(0);
                Ok(BudgetStatus {
                    budget_id: budget.id,
                    limit_cents: budget.limit_cents,
                    spent_cents: spent,
                    remaining_cents: budget.limit_cents.saturating_sub(spent),
                    over_limit: spent > budget.limit_cents,
                })
            })
        })
        .await
    }
}
