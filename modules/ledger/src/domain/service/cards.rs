use std::collections::HashSet;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveEnum, ColumnTrait, Condition, Order, Set};
use serde_json::json;
use tenantkit_security::SecurityContext;
use tracing::instrument;
use uuid::Uuid;

use super::{LedgerService, write_tenant};
use crate::domain::audit::{AuditAction, AuditEvent};
use crate::domain::error::DomainError;
use crate::domain::models::{
    ActivationOutcome, BulkActivation, Card, CardActivation, CardStatus, NewCard,
};
use crate::infra::storage::entity::card;
use crate::infra::storage::repos::{ACCOUNTS, CARDS};

fn validate_last4(last4: &str) -> Result<(), DomainError> {
    if last4.len() == 4 && last4.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(DomainError::validation("last4", "must be four digits"))
    }
}

impl LedgerService {
    /// Issue an inactive card on an account.
    ///
    /// # Errors
    /// - `DomainError::ContextMissing` with an empty context
    /// - `DomainError::CrossTenantReference` if the account is not this tenant's
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id()))]
    pub async fn issue_card(&self, ctx: &SecurityContext, new: NewCard) -> Result<Card, DomainError> {
        self.validate_name("holder_name", &new.holder_name)?;
        validate_last4(&new.last4)?;
        self.in_unit(ctx, move |svc, uow| {
            Box::pin(async move {
                let tenant_id = write_tenant(uow, None).await?;
                if !ACCOUNTS.exists_in_tenant(uow, new.account_id).await? {
                    return Err(DomainError::cross_tenant("account_id"));
                }
                let card = CARDS
                    .create(
                        uow,
                        card::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            tenant_id: Set(tenant_id),
                            account_id: Set(new.account_id),
                            holder_name: Set(new.holder_name),
                            last4: Set(new.last4),
                            status: Set(CardStatus::Inactive),
                            created_at: Set(Utc::now()),
                        },
                    )
                    .await?;
                svc.audit(
                    uow,
                    AuditEvent::new(AuditAction::Create, "card", Some(card.id))
                        .with_details(json!({ "account_id": card.account_id })),
                )
                .await;
                Ok(card)
            })
        })
        .await
    }

    /// # Errors
    /// `DomainError::NotFound` if the card is not visible.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id(), card_id = %id))]
    pub async fn get_card(&self, ctx: &SecurityContext, id: Uuid) -> Result<Card, DomainError> {
        self.in_unit(ctx, move |_, uow| {
            Box::pin(async move {
                CARDS
                    .get(uow, id)
                    .await
                    .map_err(DomainError::from_repo("card"))
            })
        })
        .await
    }

    /// # Errors
    /// Returns `DomainError::Database` on storage failures.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id()))]
    pub async fn list_cards(&self, ctx: &SecurityContext) -> Result<Vec<Card>, DomainError> {
        self.in_unit(ctx, |_, uow| {
            Box::pin(async move {
                Ok(CARDS
                    .select(uow)
                    .order_by(card::Column::CreatedAt, Order::Asc)
                    .all(uow)
                    .await?)
            })
        })
        .await
    }

    /// Activate every listed card this tenant owns.
    ///
    /// Cards of other tenants and unknown ids are skipped and reported as `NotFound`, in the
    /// same way, without failing the batch.
    ///
    /// # Errors
    /// `DomainError::ContextMissing` with an empty context.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id(), requested = ids.len()))]
    pub async fn bulk_activate_cards(
        &self,
        ctx: &SecurityContext,
        ids: Vec<Uuid>,
    ) -> Result<BulkActivation, DomainError> {
        self.in_unit(ctx, move |svc, uow| {
            Box::pin(async move {
                write_tenant(uow, None).await?;
                let visible: HashSet<Uuid> = CARDS
                    .find_many(uow, Condition::all().add(card::Column::Id.is_in(ids.clone())))
                    .await?
                    .into_iter()
                    .map(|c| c.id)
                    .collect();
                let activated = CARDS
                    .update_many(
                        uow,
                        &ids,
                        vec![(
                            card::Column::Status,
                            Expr::value(CardStatus::Active.to_value()),
                        )],
                    )
                    .await?;

                let results = ids
                    .iter()
                    .map(|id| CardActivation {
                        id: *id,
                        outcome: if visible.contains(id) {
                            ActivationOutcome::Activated
                        } else {
                            ActivationOutcome::NotFound
                        },
                    })
                    .collect();
                svc.audit(
                    uow,
                    AuditEvent::new(AuditAction::BulkActivate, "card", None)
                        .with_details(json!({ "requested": ids.len(), "activated": activated })),
                )
                .await;
                Ok(BulkActivation { activated, results })
            })
        })
        .await
    }
}
