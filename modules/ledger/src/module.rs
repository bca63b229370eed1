use tenantkit_db::Db;
use tenantkit_db::migration_runner::{MigrationResult, run_migrations_for_module};
use tenantkit_db::secure::policy::{PolicyError, PolicyReport, verify_policies};
use tracing::{info, warn};

use crate::domain::service::{LedgerService, ServiceConfig};
use crate::infra::storage::migrations::{self, MODULE_NAME, TENANT_SCOPED_TABLES};

/// Lifecycle of the ledger: schema, policy check, service construction.
///
/// The binary calls these in order; a failed policy check stops startup.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ledger;

impl Ledger {
    /// Apply pending ledger migrations.
    ///
    /// Must run with a role allowed to change the schema and install policies.
    ///
    /// # Errors
    /// Returns an error if a migration fails.
    pub async fn migrate(self, db: &Db) -> anyhow::Result<MigrationResult> {
        info!("Running ledger database migrations");
        let result = run_migrations_for_module(db, MODULE_NAME, migrations::migrations()).await?;
        info!(
            applied = result.applied,
            skipped = result.skipped,
            "Ledger database migrations completed"
        );
        Ok(result)
    }

    /// Check that every tenant-scoped ledger table has an active isolation policy.
    ///
    /// # Errors
    /// `PolicyError::Inactive` names the unprotected tables.
    pub async fn verify_policies(self, db: &Db) -> Result<PolicyReport, PolicyError> {
        match verify_policies(db, TENANT_SCOPED_TABLES).await {
            Ok(report) => {
                info!(
                    backend = report.backend,
                    tables = report.tables.len(),
                    "ledger tables protected"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "tenant policy verification failed");
                Err(e)
            }
        }
    }

    #[must_use]
    pub fn service(self, db: Db, config: ServiceConfig) -> LedgerService {
        LedgerService::new(db, config)
    }
}
