use sea_orm_migration::MigrationTrait;

mod initial_001;
mod tenant_policies_002;

/// Name under which the ledger's migration history is recorded.
pub const MODULE_NAME: &str = "ledger";

/// Every tenant-scoped table with the column its policy compares against.
pub const TENANT_SCOPED: &[(&str, &str)] = &[
    ("tenants", "id"),
    ("users", "tenant_id"),
    ("accounts", "tenant_id"),
    ("categories", "tenant_id"),
    ("transactions", "tenant_id"),
    ("budgets", "tenant_id"),
    ("cards", "tenant_id"),
    ("audit_logs", "tenant_id"),
];

/// Tables that must report an active policy before the process serves traffic.
pub const TENANT_SCOPED_TABLES: &[&str] = &[
    "tenants",
    "users",
    "accounts",
    "categories",
    "transactions",
    "budgets",
    "cards",
    "audit_logs",
];

#[must_use]
pub fn migrations() -> Vec<Box<dyn MigrationTrait>> {
    vec![
        Box::new(initial_001::Migration),
        Box::new(tenant_policies_002::Migration),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_list_matches_verification_list() {
        let tables: Vec<&str> = TENANT_SCOPED.iter().map(|(t, _)| *t).collect();
        assert_eq!(tables, TENANT_SCOPED_TABLES);
    }
}
