use chrono::Utc;
use sea_orm::{Condition, Set};
use serde_json::json;
use tenantkit_security::SecurityContext;
use tracing::instrument;
use uuid::Uuid;

use super::LedgerService;
use crate::domain::audit::{AuditAction, AuditEvent};
use crate::domain::error::DomainError;
use crate::domain::models::{NewTenant, NewUser, Onboarded, Tenant, TenantStatus};
use crate::infra::storage::entity::{tenant, user};
use crate::infra::storage::repos::{
    ACCOUNTS, AUDIT_LOGS, BUDGETS, CARDS, CATEGORIES, TENANTS, TRANSACTIONS, USERS,
};

impl LedgerService {
    /// Create a tenant and its first user in one unit of work bound to the new tenant.
    ///
    /// `ctx` identifies the acting user; its tenant is ignored.
    ///
    /// # Errors
    /// - `DomainError::Validation` for an empty slug, owner email or display name
    /// - `DomainError::ConstraintViolation` if the slug or domain is taken
    #[instrument(skip_all, fields(slug = %new.slug))]
    pub async fn onboard_tenant(
        &self,
        ctx: &SecurityContext,
        new: NewTenant,
        owner: NewUser,
    ) -> Result<Onboarded, DomainError> {
        self.validate_name("slug", &new.slug)?;
        self.validate_user(&owner)?;
        let tenant_id = new.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        if tenant_id.is_empty() {
            return Err(DomainError::validation("id", "must not be empty"));
        }
        let tenant_ctx = ctx.for_tenant(tenant_id.clone());

        let onboarded = self
            .in_unit(&tenant_ctx, move |svc, uow| {
                Box::pin(async move {
                    let now = Utc::now();
                    let tenant = TENANTS
                        .create(
                            uow,
                            tenant::ActiveModel {
                                id: Set(tenant_id),
                                slug: Set(new.slug),
                                domain: Set(new.domain),
                                plan: Set(new.plan),
                                status: Set(TenantStatus::Active),
                                settings: Set(new.settings),
                                created_at: Set(now),
                            },
                        )
                        .await?;
                    let owner = USERS
                        .create(
                            uow,
                            user::ActiveModel {
                                id: Set(Uuid::new_v4()),
                                tenant_id: Set(tenant.id.clone()),
                                email: Set(owner.email),
                                display_name: Set(owner.display_name),
                                created_at: Set(now),
                            },
                        )
                        .await?;
                    svc.audit(
                        uow,
                        AuditEvent::new(AuditAction::Create, "tenant", None).with_details(json!({
                            "slug": tenant.slug,
                            "plan": tenant.plan,
                            "owner_id": owner.id,
                        })),
                    )
                    .await;
                    Ok(Onboarded { tenant, owner })
                })
            })
            .await?;

        tracing::info!(tenant_id = %onboarded.tenant.id, "tenant onboarded");
        Ok(onboarded)
    }

    /// The caller's own tenant row.
    ///
    /// # Errors
    /// `DomainError::NotFound` if the context names no existing tenant.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id()))]
    pub async fn current_tenant(&self, ctx: &SecurityContext) -> Result<Tenant, DomainError> {
        self.in_unit(ctx, |_, uow| {
            Box::pin(async move {
                TENANTS
                    .find_many(uow, Condition::all())
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| DomainError::not_found("tenant"))
            })
        })
        .await
    }

    /// Delete the caller's tenant and everything it owns, children first.
    ///
    /// Returns the number of rows removed. The audit trail goes with the tenant, so the
    /// offboarding itself is only reported through the log.
    ///
    /// # Errors
    /// - `DomainError::ContextMissing` with an empty context
    /// - `DomainError::NotFound` if the tenant row is not visible; nothing is deleted then
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id()))]
    pub async fn offboard_tenant(&self, ctx: &SecurityContext) -> Result<u64, DomainError> {
        let removed = self
            .in_unit(ctx, |_, uow| {
                Box::pin(async move {
                    let all = Condition::all;
                    let mut removed = 0;
                    removed += AUDIT_LOGS.delete_where(uow, all()).await?;
                    removed += TRANSACTIONS.delete_where(uow, all()).await?;
                    removed += CARDS.delete_where(uow, all()).await?;
                    removed += BUDGETS.delete_where(uow, all()).await?;
                    removed += CATEGORIES.delete_where(uow, all()).await?;
                    removed += ACCOUNTS.delete_where(uow, all()).await?;
                    removed += USERS.delete_where(uow, all()).await?;
                    match TENANTS.delete_where(uow, all()).await? {
                        0 => Err(DomainError::not_found("tenant")),
                        n => Ok(removed + n),
                    }
                })
            })
            .await?;

        tracing::info!(
            target: "ledger::audit",
            tenant_id = %ctx.tenant_id(),
            subject_id = %ctx.subject_id(),
            removed,
            "tenant offboarded"
        );
        Ok(removed)
    }
}
