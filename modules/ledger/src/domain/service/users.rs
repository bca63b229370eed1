use chrono::Utc;
use sea_orm::{ColumnTrait, Condition, Order, Set};
use serde_json::json;
use tenantkit_security::SecurityContext;
use tracing::instrument;
use uuid::Uuid;

use super::{LedgerService, write_tenant};
use crate::domain::audit::{AuditAction, AuditEvent};
use crate::domain::error::DomainError;
use crate::domain::models::{NewUser, User};
use crate::infra::storage::entity::{account, card, transaction, user};
use crate::infra::storage::repos::{ACCOUNTS, CARDS, TRANSACTIONS, USERS};

impl LedgerService {
    pub(super) fn validate_user(&self, new: &NewUser) -> Result<(), DomainError> {
        self.validate_name("email", &new.email)?;
        if !new.email.contains('@') {
            return Err(DomainError::validation("email", "must be an email address"));
        }
        self.validate_name("display_name", &new.display_name)
    }

    /// # Errors
    /// - `DomainError::ContextMissing` with an empty context
    /// - `DomainError::ConstraintViolation` if the email is already used in this tenant
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id()))]
    pub async fn create_user(&self, ctx: &SecurityContext, new: NewUser) -> Result<User, DomainError> {
        self.validate_user(&new)?;
        self.in_unit(ctx, move |svc, uow| {
            Box::pin(async move {
                let tenant_id = write_tenant(uow, None).await?;
                let user = USERS
                    .create(
                        uow,
                        user::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            tenant_id: Set(tenant_id),
                            email: Set(new.email),
                            display_name: Set(new.display_name),
                            created_at: Set(Utc::now()),
                        },
                    )
                    .await?;
                svc.audit(
                    uow,
                    AuditEvent::new(AuditAction::Create, "user", Some(user.id))
                        .with_details(json!({ "email": user.email })),
                )
                .await;
                Ok(user)
            })
        })
        .await
    }

    /// # Errors
    /// `DomainError::NotFound` if the user is not visible.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id(), user_id = %id))]
    pub async fn get_user(&self, ctx: &SecurityContext, id: Uuid) -> Result<User, DomainError> {
        self.in_unit(ctx, move |_, uow| {
            Box::pin(async move {
                USERS
                    .get(uow, id)
                    .await
                    .map_err(DomainError::from_repo("user"))
            })
        })
        .await
    }

    /// # Errors
    /// Returns `DomainError::Database` on storage failures.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id()))]
    pub async fn list_users(&self, ctx: &SecurityContext) -> Result<Vec<User>, DomainError> {
        self.in_unit(ctx, |_, uow| {
            Box::pin(async move {
                Ok(USERS
                    .select(uow)
                    .order_by(user::Column::Email, Order::Asc)
                    .all(uow)
                    .await?)
            })
        })
        .await
    }

    /// Delete a user with their accounts and everything booked on those accounts.
    ///
    /// Audit entries written by the user are kept.
    ///
    /// # Errors
    /// `DomainError::NotFound` if the user is not visible; nothing is deleted then.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id(), user_id = %id))]
    pub async fn delete_user(&self, ctx: &SecurityContext, id: Uuid) -> Result<(), DomainError> {
        self.in_unit(ctx, move |svc, uow| {
            Box::pin(async move {
                write_tenant(uow, None).await?;
                if !USERS.exists_in_tenant(uow, id).await? {
                    return Err(DomainError::not_found("user"));
                }
                let account_ids: Vec<Uuid> = ACCOUNTS
                    .find_many(uow, Condition::all().add(account::Column::UserId.eq(id)))
                    .await?
                    .into_iter()
                    .map(|a| a.id)
                    .collect();

                let cards = CARDS
                    .delete_where(
                        uow,
                        Condition::all().add(card::Column::AccountId.is_in(account_ids.clone())),
                    )
                    .await?;
                let transactions = TRANSACTIONS
                    .delete_where(
                        uow,
                        Condition::all()
                            .add(transaction::Column::AccountId.is_in(account_ids.clone())),
                    )
                    .await?;
                let accounts = ACCOUNTS.delete_many(uow, &account_ids).await?;
                USERS
                    .delete(uow, id)
                    .await
                    .map_err(DomainError::from_repo("user"))?;

                svc.audit(
                    uow,
                    AuditEvent::new(AuditAction::Delete, "user", Some(id)).with_details(json!({
                        "accounts": accounts,
                        "cards": cards,
                        "transactions": transactions,
                    })),
                )
                .await;
                Ok(())
            })
        })
        .await
    }
}
