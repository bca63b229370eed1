use chrono::Utc;
use sea_orm::{ColumnTrait, Condition, Order, Set};
use serde_json::json;
use tenantkit_security::SecurityContext;
use tracing::instrument;
use uuid::Uuid;

use super::{LedgerService, write_tenant};
use crate::domain::audit::{AuditAction, AuditEvent};
use crate::domain::error::DomainError;
use crate::domain::models::{Account, NewAccount};
use crate::infra::storage::entity::{account, card, transaction};
use crate::infra::storage::repos::{ACCOUNTS, CARDS, TRANSACTIONS, USERS};

fn validate_currency(code: &str) -> Result<(), DomainError> {
    if code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(DomainError::validation(
            "currency",
            "must be a three-letter ISO 4217 code",
        ))
    }
}

impl LedgerService {
    /// # Errors
    /// - `DomainError::ContextMissing` with an empty context
    /// - `DomainError::CrossTenantReference` if `user_id` is not a user of this tenant
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id()))]
    pub async fn create_account(
        &self,
        ctx: &SecurityContext,
        new: NewAccount,
    ) -> Result<Account, DomainError> {
        self.validate_name("name", &new.name)?;
        validate_currency(&new.currency)?;
        self.in_unit(ctx, move |svc, uow| {
            Box::pin(async move {
                let tenant_id = write_tenant(uow, None).await?;
                if !USERS.exists_in_tenant(uow, new.user_id).await? {
                    return Err(DomainError::cross_tenant("user_id"));
                }
                let account = ACCOUNTS
                    .create(
                        uow,
                        account::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            tenant_id: Set(tenant_id),
                            user_id: Set(new.user_id),
                            name: Set(new.name),
                            kind: Set(new.kind),
                            currency: Set(new.currency),
                            created_at: Set(Utc::now()),
                        },
                    )
                    .await?;
                svc.audit(
                    uow,
                    AuditEvent::new(AuditAction::Create, "account", Some(account.id))
                        .with_details(json!({ "kind": account.kind, "currency": account.currency })),
                )
                .await;
                Ok(account)
            })
        })
        .await
    }

    /// # Errors
    /// `DomainError::NotFound` if the account is not visible.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id(), account_id = %id))]
    pub async fn get_account(&self, ctx: &SecurityContext, id: Uuid) -> Result<Account, DomainError> {
        self.in_unit(ctx, move |_, uow| {
            Box::pin(async move {
                ACCOUNTS
                    .get(uow, id)
                    .await
                    .map_err(DomainError::from_repo("account"))
            })
        })
        .await
    }

    /// Accounts of the tenant, optionally only those of one user.
    ///
    /// # Errors
    /// Returns `DomainError::Database` on storage failures.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id()))]
    pub async fn list_accounts(
        &self,
        ctx: &SecurityContext,
        user_id: Option<Uuid>,
    ) -> Result<Vec<Account>, DomainError> {
        self.in_unit(ctx, move |_, uow| {
            Box::pin(async move {
                let mut filter = Condition::all();
                if let Some(user_id) = user_id {
                    filter = filter.add(account::Column::UserId.eq(user_id));
                }
                Ok(ACCOUNTS
                    .select(uow)
                    .filter(filter)
                    .order_by(account::Column::CreatedAt, Order::Asc)
                    .all(uow)
                    .await?)
            })
        })
        .await
    }

    /// # Errors
    /// `DomainError::NotFound` if the account is not visible.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id(), account_id = %id))]
    pub async fn rename_account(
        &self,
        ctx: &SecurityContext,
        id: Uuid,
        name: String,
    ) -> Result<Account, DomainError> {
        self.validate_name("name", &name)?;
        self.in_unit(ctx, move |svc, uow| {
            Box::pin(async move {
                let account = ACCOUNTS
                    .update(
                        uow,
                        id,
                        account::ActiveModel {
                            name: Set(name),
                            ..account::ActiveModel::default()
                        },
                    )
                    .await
                    .map_err(DomainError::from_repo("account"))?;
                svc.audit(
                    uow,
                    AuditEvent::new(AuditAction::Update, "account", Some(id))
                        .with_details(json!({ "name": account.name })),
                )
                .await;
                Ok(account)
            })
        })
        .await
    }

    /// Delete an account with its cards and transactions.
    ///
    /// # Errors
    /// `DomainError::NotFound` if the account is not visible; nothing is deleted then.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id(), account_id = %id))]
    pub async fn delete_account(&self, ctx: &SecurityContext, id: Uuid) -> Result<(), DomainError> {
        self.in_unit(ctx, move |svc, uow| {
            Box::pin(async move {
                write_tenant(uow, None).await?;
                if !ACCOUNTS.exists_in_tenant(uow, id).await? {
                    return Err(DomainError::not_found("account"));
                }
                let cards = CARDS
                    .delete_where(uow, Condition::all().add(card::Column::AccountId.eq(id)))
                    .await?;
                let transactions = TRANSACTIONS
                    .delete_where(
                        uow,
                        Condition::all().add(transaction::Column::AccountId.eq(id)),
                    )
                    .await?;
                ACCOUNTS
                    .delete(uow, id)
                    .await
                    .map_err(DomainError::from_repo("account"))?;
                svc.audit(
                    uow,
                    AuditEvent::new(AuditAction::Delete, "account", Some(id))
                        .with_details(json!({ "cards": cards, "transactions": transactions })),
                )
                .await;
                Ok(())
            })
        })
        .await
    }
}
