use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{ColumnTrait, Condition, Order, Set};
use serde_json::json;
use tenantkit_security::SecurityContext;
use tracing::instrument;
use uuid::Uuid;

use super::{LedgerService, write_tenant};
use crate::domain::audit::{AuditAction, AuditEvent};
use crate::domain::error::DomainError;
use crate::domain::models::{
    CategoryTotal, NewTransaction, Transaction, TransactionPatch, TransactionQuery,
    TransactionStats,
};
use crate::infra::storage::entity::{category, transaction};
use crate::infra::storage::repos::{ACCOUNTS, CATEGORIES, TRANSACTIONS};
use crate::infra::storage::transactions_query::{
    CategoryTotalRow, StatsRow, search_condition, stats_shape, totals_by_category_shape,
};

fn validate_amount(amount_cents: i64) -> Result<(), DomainError> {
    if amount_cents <= 0 {
        return Err(DomainError::validation("amount_cents", "must be positive"));
    }
    Ok(())
}

fn validate_tags(tags: &[String]) -> Result<(), DomainError> {
    for tag in tags {
        if tag.is_empty() || tag.contains(',') {
            return Err(DomainError::validation(
                "tags",
                "tags must be non-empty and must not contain ','",
            ));
        }
    }
    Ok(())
}

impl LedgerService {
    /// Book a transaction.
    ///
    /// The tenant in the payload, when given, is checked against the context before the
    /// account and category references are resolved.
    ///
    /// # Errors
    /// - `DomainError::ContextMissing` with an empty context
    /// - `DomainError::ConstraintViolation` if `tenant_id` names another tenant
    /// - `DomainError::CrossTenantReference` if the account or category is not this tenant's
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id()))]
    pub async fn create_transaction(
        &self,
        ctx: &SecurityContext,
        new: NewTransaction,
    ) -> Result<Transaction, DomainError> {
        validate_amount(new.amount_cents)?;
        validate_tags(&new.tags)?;
        self.in_unit(ctx, move |svc, uow| {
            Box::pin(async move {
                let tenant_id = write_tenant(uow, new.tenant_id.as_deref()).await?;
                if !ACCOUNTS.exists_in_tenant(uow, new.account_id).await? {
                    return Err(DomainError::cross_tenant("account_id"));
                }
                if let Some(category_id) = new.category_id
                    && !CATEGORIES.exists_in_tenant(uow, category_id).await?
                {
                    return Err(DomainError::cross_tenant("category_id"));
                }
                let now = Utc::now();
                let txn = TRANSACTIONS
                    .create(
                        uow,
                        transaction::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            tenant_id: Set(tenant_id),
                            account_id: Set(new.account_id),
                            category_id: Set(new.category_id),
                            kind: Set(new.kind),
                            amount_cents: Set(new.amount_cents),
                            description: Set(new.description),
                            tags: Set(transaction::encode_tags(&new.tags)),
                            occurred_at: Set(new.occurred_at.unwrap_or(now)),
                            created_at: Set(now),
                        },
                    )
                    .await?;
                svc.audit(
                    uow,
                    AuditEvent::new(AuditAction::Create, "transaction", Some(txn.id))
                        .with_details(json!({
                            "account_id": txn.account_id,
                            "kind": txn.kind,
                            "amount_cents": txn.amount_cents,
                        })),
                )
                .await;
                Ok(txn)
            })
        })
        .await
    }

    /// # Errors
    /// `DomainError::NotFound` if the transaction is not visible.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id(), transaction_id = %id))]
    pub async fn get_transaction(
        &self,
        ctx: &SecurityContext,
        id: Uuid,
    ) -> Result<Transaction, DomainError> {
        self.in_unit(ctx, move |_, uow| {
            Box::pin(async move {
                TRANSACTIONS
                    .get(uow, id)
                    .await
                    .map_err(DomainError::from_repo("transaction"))
            })
        })
        .await
    }

    /// Change description, amount or tags. The tenant of a transaction never changes.
    ///
    /// # Errors
    /// - `DomainError::NotFound` if the transaction is not visible
    /// - `DomainError::ConstraintViolation` if the patch names another tenant
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id(), transaction_id = %id))]
    pub async fn update_transaction(
        &self,
        ctx: &SecurityContext,
        id: Uuid,
        patch: TransactionPatch,
    ) -> Result<Transaction, DomainError> {
        if let Some(amount) = patch.amount_cents {
            validate_amount(amount)?;
        }
        if let Some(tags) = &patch.tags {
            validate_tags(tags)?;
        }
        self.in_unit(ctx, move |svc, uow| {
            Box::pin(async move {
                let mut am = transaction::ActiveModel::default();
                if let Some(description) = patch.description {
                    am.description = Set(description);
                }
                if let Some(amount) = patch.amount_cents {
                    am.amount_cents = Set(amount);
                }
                if let Some(tags) = &patch.tags {
                    am.tags = Set(transaction::encode_tags(tags));
                }
                if let Some(tenant_id) = patch.tenant_id {
                    am.tenant_id = Set(tenant_id);
                }
                let txn = TRANSACTIONS
                    .update(uow, id, am)
                    .await
                    .map_err(DomainError::from_repo("transaction"))?;
                svc.audit(
                    uow,
                    AuditEvent::new(AuditAction::Update, "transaction", Some(id))
                        .with_details(json!({ "amount_cents": txn.amount_cents })),
                )
                .await;
                Ok(txn)
            })
        })
        .await
    }

    /// # Errors
    /// `DomainError::NotFound` if the transaction is not visible.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id(), transaction_id = %id))]
    pub async fn delete_transaction(&self, ctx: &SecurityContext, id: Uuid) -> Result<(), DomainError> {
        self.in_unit(ctx, move |svc, uow| {
            Box::pin(async move {
                TRANSACTIONS
                    .delete(uow, id)
                    .await
                    .map_err(DomainError::from_repo("transaction"))?;
                svc.audit(
                    uow,
                    AuditEvent::new(AuditAction::Delete, "transaction", Some(id)),
                )
                .await;
                Ok(())
            })
        })
        .await
    }

    /// Delete the listed transactions this tenant owns and skip the rest.
    ///
    /// Returns how many rows were deleted.
    ///
    /// # Errors
    /// `DomainError::ContextMissing` with an empty context.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id(), requested = ids.len()))]
    pub async fn delete_transactions(
        &self,
        ctx: &SecurityContext,
        ids: Vec<Uuid>,
    ) -> Result<u64, DomainError> {
        self.in_unit(ctx, move |svc, uow| {
            Box::pin(async move {
                let deleted = TRANSACTIONS.delete_many(uow, &ids).await?;
                svc.audit(
                    uow,
                    AuditEvent::new(AuditAction::Delete, "transaction", None)
                        .with_details(json!({ "requested": ids.len(), "deleted": deleted })),
                )
                .await;
                Ok(deleted)
            })
        })
        .await
    }

    /// Newest first. Text filters match literally.
    ///
    /// # Errors
    /// Returns `DomainError::Database` on storage failures.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id()))]
    pub async fn search_transactions(
        &self,
        ctx: &SecurityContext,
        query: TransactionQuery,
    ) -> Result<Vec<Transaction>, DomainError> {
        let limit = self.page_size(query.limit);
        self.in_unit(ctx, move |_, uow| {
            Box::pin(async move {
                Ok(TRANSACTIONS
                    .select(uow)
                    .filter(search_condition(&query))
                    .order_by(transaction::Column::OccurredAt, Order::Desc)
                    .order_by(transaction::Column::Id, Order::Asc)
                    .limit(limit)
                    .offset(query.offset.unwrap_or(0))
                    .all(uow)
                    .await?)
            })
        })
        .await
    }

    /// Count, sum, average, minimum and maximum amount over the matching transactions.
    ///
    /// # Errors
    /// Returns `DomainError::Database` on storage failures.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id()))]
    pub async fn transaction_stats(
        &self,
        ctx: &SecurityContext,
        query: TransactionQuery,
    ) -> Result<TransactionStats, DomainError> {
        self.in_unit(ctx, move |_, uow| {
            Box::pin(async move {
                let row = TRANSACTIONS
                    .aggregate::<StatsRow, _>(uow, search_condition(&query), stats_shape)
                    .await?
                    .into_iter()
                    .next();
                let stats = match row {
                    Some(r) => TransactionStats {
                        count: r.n,
                        sum_cents: r.total.unwrap_or(0),
                        avg_cents: r.total.and_then(|t| t.checked_div(r.n)),
                        min_cents: r.lowest,
                        max_cents: r.highest,
                    },
                    None => TransactionStats {
                        count: 0,
                        sum_cents: 0,
                        avg_cents: None,
                        min_cents: None,
                        max_cents: None,
                    },
                };
                Ok(stats)
            })
        })
        .await
    }

    /// Totals per category, largest first. Uncategorised transactions form one group.
    ///
    /// # Errors
    /// Returns `DomainError::Database` on storage failures.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id()))]
    pub async fn totals_by_category(
        &self,
        ctx: &SecurityContext,
    ) -> Result<Vec<CategoryTotal>, DomainError> {
        self.in_unit(ctx, |_, uow| {
            Box::pin(async move {
                let rows = TRANSACTIONS
                    .aggregate::<CategoryTotalRow, _>(
                        uow,
                        Condition::all(),
                        totals_by_category_shape,
                    )
                    .await?;
                let ids: Vec<Uuid> = rows.iter().filter_map(|r| r.category_id).collect();
                let names: HashMap<Uuid, String> = CATEGORIES
                    .find_many(uow, Condition::all().add(category::Column::Id.is_in(ids)))
                    .await?
                    .into_iter()
                    .map(|c| (c.id, c.name))
                    .collect();

                let mut totals: Vec<CategoryTotal> = rows
                    .into_iter()
                    .map(|r| CategoryTotal {
                        category_name: r.category_id.and_then(|id| names.get(&id).cloned()),
                        category_id: r.category_id,
                        total_cents: r.total.unwrap_or(0),
                        count: r.n,
                    })
                    .collect();
                totals.sort_by(|a, b| {
                    b.total_cents
                        .cmp(&a.total_cents)
                        .then_with(|| a.category_name.cmp(&b.category_name))
                });
                Ok(totals)
            })
        })
        .await
    }
}
