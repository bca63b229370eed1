//! Tenant-scoped repositories. Services reach the tables only through these.

use tenantkit_db::secure::TenantRepo;

use super::entity::{account, audit_log, budget, card, category, tenant, transaction, user};

pub const TENANTS: TenantRepo<tenant::Entity> = TenantRepo::new();
pub const USERS: TenantRepo<user::Entity> = TenantRepo::new();
pub const ACCOUNTS: TenantRepo<account::Entity> = TenantRepo::new();
pub const CATEGORIES: TenantRepo<category::Entity> = TenantRepo::new();
pub const TRANSACTIONS: TenantRepo<transaction::Entity> = TenantRepo::new();
pub const BUDGETS: TenantRepo<budget::Entity> = TenantRepo::new();
pub const CARDS: TenantRepo<card::Entity> = TenantRepo::new();
pub const AUDIT_LOGS: TenantRepo<audit_log::Entity> = TenantRepo::new();
