//! Inputs and read models of the ledger services.
//!
//! Stored rows are returned as the entity models themselves; the types here are the write
//! payloads and the computed views.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

pub use crate::infra::storage::entity::account::{AccountKind, Model as Account};
pub use crate::infra::storage::entity::audit_log::Model as AuditEntry;
pub use crate::infra::storage::entity::budget::Model as Budget;
pub use crate::infra::storage::entity::card::{CardStatus, Model as Card};
pub use crate::infra::storage::entity::category::Model as Category;
pub use crate::infra::storage::entity::tenant::{Model as Tenant, Plan, TenantStatus};
pub use crate::infra::storage::entity::transaction::{Model as Transaction, TransactionKind};
pub use crate::infra::storage::entity::user::Model as User;

#[derive(Debug, Clone)]
pub struct NewTenant {
    /// Defaults to a fresh UUID string.
    pub id: Option<String>,
    pub slug: String,
    pub domain: Option<String>,
    pub plan: Plan,
    pub settings: Value,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub display_name: String,
}

/// Result of onboarding: the tenant row and its first user.
#[derive(Debug, Clone, Serialize)]
pub struct Onboarded {
    pub tenant: Tenant,
    pub owner: User,
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub user_id: Uuid,
    pub name: String,
    pub kind: AccountKind,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    /// When set, must equal the caller's tenant.
    pub tenant_id: Option<String>,
    pub account_id: Uuid,
    pub category_id: Option<Uuid>,
    pub kind: TransactionKind,
    pub amount_cents: i64,
    pub description: String,
    pub tags: Vec<String>,
    /// Defaults to now.
    pub occurred_at: Option<DateTime<Utc>>,
}

/// Partial update of a transaction. `tenant_id`, when present, must be the current tenant.
#[derive(Debug, Clone, Default)]
pub struct TransactionPatch {
    pub description: Option<String>,
    pub amount_cents: Option<i64>,
    pub tags: Option<Vec<String>>,
    pub tenant_id: Option<String>,
}

/// Search filters. Every value is bound as a parameter; text filters match literally.
#[derive(Debug, Clone, Default)]
pub struct TransactionQuery {
    pub description_contains: Option<String>,
    /// Matches transactions carrying at least one of these tags.
    pub tags_any: Vec<String>,
    pub min_amount: Option<i64>,
    pub max_amount: Option<i64>,
    pub account_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionStats {
    pub count: i64,
    pub sum_cents: i64,
    pub avg_cents: Option<i64>,
    pub min_cents: Option<i64>,
    pub max_cents: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTotal {
    /// `None` for uncategorised transactions.
    pub category_id: Option<Uuid>,
    pub category_name: Option<String>,
    pub total_cents: i64,
    pub count: i64,
}

#[derive(Debug, Clone)]
pub struct NewBudget {
    pub category_id: Uuid,
    pub name: String,
    pub limit_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetStatus {
    pub budget_id: Uuid,
    pub limit_cents: i64,
    pub spent_cents: i64,
    pub remaining_cents: i64,
    pub over_limit: bool,
}

#[derive(Debug, Clone)]
pub struct NewCard {
    pub account_id: Uuid,
    pub holder_name: String,
    pub last4: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationOutcome {
    Activated,
    /// Missing, or owned by another tenant.
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardActivation {
    pub id: Uuid,
    pub outcome: ActivationOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkActivation {
    pub activated: u64,
    pub results: Vec<CardActivation>,
}

impl BulkActivation {
    #[must_use]
    pub fn failed_ids(&self) -> Vec<Uuid> {
        self.results
            .iter()
            .filter(|r| r.outcome == ActivationOutcome::NotFound)
            .map(|r| r.id)
            .collect()
    }
}
